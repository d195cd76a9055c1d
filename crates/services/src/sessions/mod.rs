mod active;
mod completion;
mod drivers;
mod registry;
mod submission;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::{CompletionError, SessionServiceError, SubmissionError};
pub use active::{ActiveSession, SessionView, TimerView};
pub use completion::CompletionPipeline;
pub use drivers::BackgroundTask;
pub use registry::{SessionRegistry, SessionSlot};
pub use submission::{AnswerEntry, SubmissionCoordinator};
pub use workflow::{SessionLoopService, SubmitOutcome};
