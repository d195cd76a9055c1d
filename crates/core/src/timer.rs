/// Raised by [`TimerService::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    /// Remaining time reached zero. Raised once per countdown.
    Expired,
}

/// Countdown bookkeeping driven by one-second ticks.
///
/// Remaining time is signed so an overrun stays visible after expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerService {
    initial: i64,
    remaining: i64,
    running: bool,
    expired: bool,
}

impl TimerService {
    #[must_use]
    pub fn new(seconds: i64) -> Self {
        Self {
            initial: seconds,
            remaining: seconds,
            running: false,
            expired: false,
        }
    }

    #[must_use]
    pub fn from_minutes(minutes: u32) -> Self {
        Self::new(i64::from(minutes) * 60)
    }

    /// A stopped countdown of `initial` seconds that already ran for `elapsed`.
    ///
    /// A countdown resumed past its deadline still raises `Expired` on the next tick.
    #[must_use]
    pub fn resumed(initial: i64, elapsed: i64) -> Self {
        Self {
            initial,
            remaining: initial - elapsed.max(0),
            running: false,
            expired: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Restart the countdown from `seconds`, stopped and un-expired.
    pub fn reset(&mut self, seconds: i64) {
        *self = Self::new(seconds);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Remaining seconds clamped at zero, for display.
    #[must_use]
    pub fn display_remaining(&self) -> u64 {
        u64::try_from(self.remaining.max(0)).unwrap_or(0)
    }

    /// Seconds counted down since the last reset, including overrun.
    #[must_use]
    pub fn elapsed(&self) -> u32 {
        u32::try_from((self.initial - self.remaining).max(0)).unwrap_or(u32::MAX)
    }

    pub fn tick(&mut self) -> Option<TimerSignal> {
        if !self.running {
            return None;
        }
        self.remaining -= 1;
        if self.remaining <= 0 && !self.expired {
            self.expired = true;
            return Some(TimerSignal::Expired);
        }
        None
    }

    /// `mm:ss`, with a leading `-` while overrunning.
    #[must_use]
    pub fn format(&self) -> String {
        let sign = if self.remaining < 0 { "-" } else { "" };
        let abs = self.remaining.unsigned_abs();
        format!("{sign}{:02}:{:02}", abs / 60, abs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_exactly_once_on_fifth_tick() {
        let mut timer = TimerService::new(5);
        timer.start();
        for _ in 0..4 {
            assert_eq!(timer.tick(), None);
        }
        assert_eq!(timer.tick(), Some(TimerSignal::Expired));
        assert_eq!(timer.remaining(), 0);
        assert_eq!(timer.tick(), None);
        assert_eq!(timer.tick(), None);
        assert_eq!(timer.remaining(), -2);
    }

    #[test]
    fn stopped_timer_does_not_move() {
        let mut timer = TimerService::new(3);
        assert_eq!(timer.tick(), None);
        assert_eq!(timer.remaining(), 3);

        timer.start();
        timer.start();
        timer.tick();
        timer.stop();
        timer.stop();
        timer.tick();
        assert_eq!(timer.remaining(), 2);
        assert_eq!(timer.elapsed(), 1);
    }

    #[test]
    fn formats_overrun_with_sign_and_clamps_display() {
        let mut timer = TimerService::new(65);
        assert_eq!(timer.format(), "01:05");

        timer.reset(1);
        timer.start();
        timer.tick();
        timer.tick();
        timer.tick();
        assert_eq!(timer.format(), "-00:02");
        assert_eq!(timer.display_remaining(), 0);
    }

    #[test]
    fn reset_clears_expiry() {
        let mut timer = TimerService::new(1);
        timer.start();
        assert_eq!(timer.tick(), Some(TimerSignal::Expired));
        timer.reset(1);
        assert!(!timer.is_expired());
        timer.start();
        assert_eq!(timer.tick(), Some(TimerSignal::Expired));
    }

    #[test]
    fn resumed_past_deadline_expires_on_next_tick() {
        let mut timer = TimerService::resumed(60, 75);
        assert_eq!(timer.format(), "-00:15");
        timer.start();
        assert_eq!(timer.tick(), Some(TimerSignal::Expired));
        assert_eq!(timer.elapsed(), 76);
    }

    #[test]
    fn from_minutes_counts_seconds() {
        assert_eq!(TimerService::from_minutes(90).format(), "90:00");
    }
}
