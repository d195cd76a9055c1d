use thiserror::Error;

use crate::indexer::IndexError;
use crate::progress::ProgressCalculator;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NavigationError {
    #[error("round {blocking_round} must be completed first")]
    RoundLocked { blocking_round: usize },

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Decides whether a client may jump to a round. Never mutates.
#[derive(Debug, Clone, Copy)]
pub struct NavigationGuard<'a> {
    progress: ProgressCalculator<'a>,
}

impl<'a> NavigationGuard<'a> {
    #[must_use]
    pub fn new(progress: ProgressCalculator<'a>) -> Self {
        Self { progress }
    }

    /// # Errors
    ///
    /// Returns `NavigationError::RoundLocked` with the first incomplete round that
    /// blocks `target`, or `NavigationError::Index` if `target` does not exist.
    pub fn can_navigate_to(&self, target: usize) -> Result<(), NavigationError> {
        let rounds = self.progress.round_count();
        if target >= rounds {
            return Err(IndexError::RoundOutOfRange {
                round: target,
                rounds,
            }
            .into());
        }

        let session = self.progress.session();
        let current = session.current_round();
        if target == current || target <= session.furthest_round() {
            return Ok(());
        }

        if target == current + 1 {
            return if self.progress.is_round_complete(current)? {
                Ok(())
            } else {
                Err(NavigationError::RoundLocked {
                    blocking_round: current,
                })
            };
        }

        for round in 0..target {
            if !self.progress.is_round_complete(round)? {
                return Err(NavigationError::RoundLocked {
                    blocking_round: round,
                });
            }
        }
        Ok(())
    }
}
