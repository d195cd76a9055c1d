#![forbid(unsafe_code)]

pub mod app_services;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod sessions;
pub mod telemetry;

pub use interview_core::Clock;

pub use app_services::AppServices;
pub use collaborators::{
    AiClient, AnswerEvaluator, QuestionGenerator, StartRequest, SummaryWriter,
    TemplateCollaborators,
};
pub use config::{AiConfig, ServiceConfig};
pub use error::{
    AppServicesError, CollaboratorError, CompletionError, SessionServiceError, SubmissionError,
};
pub use sessions::{
    ActiveSession, AnswerEntry, CompletionPipeline, SessionLoopService, SessionRegistry,
    SessionView, SubmissionCoordinator, SubmitOutcome,
};
pub use telemetry::{
    PushOutcome, RepositorySink, SampleSource, SimulatedSource, TelemetryCapability,
    TelemetryCollector, TelemetrySink,
};
