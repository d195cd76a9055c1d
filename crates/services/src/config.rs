use std::env;
use std::time::Duration;

/// Upper bound on one collaborator request, connect through body.
pub const DEFAULT_AI_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection details for the chat-completions backed collaborators.
#[derive(Clone, Debug)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Whole-request timeout. A stalled endpoint fails the step instead of
    /// holding the session lock.
    pub timeout: Duration,
}

impl AiConfig {
    /// Reads `INTERVIEW_AI_*`; `None` when no API key is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("INTERVIEW_AI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url = env::var("INTERVIEW_AI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let model = env::var("INTERVIEW_AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
        let timeout = env_secs("INTERVIEW_AI_TIMEOUT_SECS").unwrap_or(DEFAULT_AI_TIMEOUT);
        Some(Self {
            base_url,
            api_key,
            model,
            timeout,
        })
    }
}

/// Knobs for the session loop and its background drivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Minimum spacing between telemetry pushes for one session.
    pub telemetry_interval: Duration,
    /// Run the completion pipeline when the session timer expires.
    pub auto_submit_on_expiry: bool,
    /// Synthesize placeholder telemetry when no sensor reports in.
    pub simulate_telemetry: bool,
    /// Period of the countdown driver. One second in production.
    pub timer_tick: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            telemetry_interval: Duration::from_secs(5),
            auto_submit_on_expiry: true,
            simulate_telemetry: false,
            timer_tick: Duration::from_secs(1),
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by `INTERVIEW_*` variables; unparsable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(interval) = env_secs("INTERVIEW_TELEMETRY_INTERVAL_SECS") {
            config.telemetry_interval = interval;
        }
        if let Some(flag) = env_flag("INTERVIEW_AUTO_SUBMIT_ON_EXPIRY") {
            config.auto_submit_on_expiry = flag;
        }
        if let Some(flag) = env_flag("INTERVIEW_SIMULATE_TELEMETRY") {
            config.simulate_telemetry = flag;
        }
        config
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    parse_secs(&env::var(name).ok()?)
}

fn parse_secs(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn env_flag(name: &str) -> Option<bool> {
    parse_flag(&env::var(name).ok()?)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_submit_on_expiry_without_simulation() {
        let config = ServiceConfig::default();
        assert!(config.auto_submit_on_expiry);
        assert!(!config.simulate_telemetry);
        assert_eq!(config.telemetry_interval, Duration::from_secs(5));
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag(" ON "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn durations_must_be_positive_whole_seconds() {
        assert_eq!(parse_secs(" 45 "), Some(Duration::from_secs(45)));
        assert_eq!(parse_secs("0"), None);
        assert_eq!(parse_secs("1.5"), None);
    }
}
