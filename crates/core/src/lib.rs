#![forbid(unsafe_code)]

pub mod indexer;
pub mod model;
pub mod navigation;
pub mod progress;
pub mod time;
pub mod timer;

pub use indexer::{AnswerIndexer, IndexError};
pub use navigation::{NavigationError, NavigationGuard};
pub use progress::{ProgressCalculator, ProgressSnapshot, RoundProgress};
pub use time::Clock;
pub use timer::{TimerService, TimerSignal};
