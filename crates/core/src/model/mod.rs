mod ids;
mod question;
mod round;
mod session;
mod telemetry;

pub use ids::{OwnerId, ParseIdError, SessionId};
pub use question::{Question, QuestionError, QuestionEvaluation, is_filled};
pub use round::{ParseCategoryError, Round, RoundCategory, RoundDraft};
pub use session::{CompletionStage, Session, SessionMode, SessionModelError};
pub use telemetry::{BehavioralMetrics, TelemetrySample};
