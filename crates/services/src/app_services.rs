use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::collaborators::{
    AiClient, AnswerEvaluator, QuestionGenerator, SummaryWriter, TemplateCollaborators,
};
use crate::config::{AiConfig, ServiceConfig};
use crate::error::AppServicesError;
use crate::sessions::SessionLoopService;

/// Assembles app-facing services over a storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    session_loop: Arc<SessionLoopService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::with_storage(
            storage,
            clock,
            ServiceConfig::from_env(),
            AiConfig::from_env(),
        ))
    }

    /// Build services over an in-memory store with offline collaborators.
    #[must_use]
    pub fn in_memory(clock: Clock, config: ServiceConfig) -> Self {
        Self::with_storage(Storage::in_memory(), clock, config, None)
    }

    /// Wire the session loop. Without an AI config the template collaborators are used.
    #[must_use]
    pub fn with_storage(
        storage: Storage,
        clock: Clock,
        config: ServiceConfig,
        ai: Option<AiConfig>,
    ) -> Self {
        let (generator, evaluator, summarizer) = collaborators(ai);
        let session_loop = Arc::new(SessionLoopService::new(
            clock,
            config,
            Arc::clone(&storage.sessions),
            generator,
            evaluator,
            summarizer,
        ));
        Self {
            storage,
            session_loop,
        }
    }

    #[must_use]
    pub fn session_loop(&self) -> Arc<SessionLoopService> {
        Arc::clone(&self.session_loop)
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

type Collaborators = (
    Arc<dyn QuestionGenerator>,
    Arc<dyn AnswerEvaluator>,
    Arc<dyn SummaryWriter>,
);

fn collaborators(ai: Option<AiConfig>) -> Collaborators {
    if let Some(config) = ai {
        let model = config.model.clone();
        let timeout = config.timeout;
        match AiClient::new(Some(config)) {
            Ok(client) => {
                tracing::info!(%model, ?timeout, "using AI collaborators");
                let client = Arc::new(client);
                let generator: Arc<dyn QuestionGenerator> = client.clone();
                let evaluator: Arc<dyn AnswerEvaluator> = client.clone();
                let summarizer: Arc<dyn SummaryWriter> = client;
                return (generator, evaluator, summarizer);
            }
            Err(err) => {
                tracing::warn!(error = %err, "AI client unavailable; using template collaborators");
            }
        }
    } else {
        tracing::info!("no AI key configured; using template collaborators");
    }

    let templates = Arc::new(TemplateCollaborators::new());
    let generator: Arc<dyn QuestionGenerator> = templates.clone();
    let evaluator: Arc<dyn AnswerEvaluator> = templates.clone();
    let summarizer: Arc<dyn SummaryWriter> = templates;
    (generator, evaluator, summarizer)
}
