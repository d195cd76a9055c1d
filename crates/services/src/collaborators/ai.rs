use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use interview_core::model::{
    QuestionEvaluation, RoundCategory, RoundDraft, Session, SessionMode,
};

use super::{
    AnswerEvaluator, QuestionGenerator, StartRequest, SummaryWriter, exam_question_count,
};
use crate::config::{AiConfig, DEFAULT_AI_TIMEOUT};
use crate::error::CollaboratorError;

/// Round length used when the model leaves `durationMinutes` out or at zero.
const DEFAULT_MINUTES_PER_QUESTION: u32 = 3;

const SYSTEM_PROMPT: &str = "You are an experienced technical interviewer and examiner. \
Reply with exactly what is asked for and nothing else.";

/// Chat-completions client backing all three collaborators.
#[derive(Clone)]
pub struct AiClient {
    client: Client,
    config: Option<AiConfig>,
}

impl AiClient {
    /// # Errors
    ///
    /// Same as [`Self::new`].
    pub fn from_env() -> Result<Self, CollaboratorError> {
        Self::new(AiConfig::from_env())
    }

    /// Build a client whose requests give up after the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Http` if the HTTP client cannot be built.
    pub fn new(config: Option<AiConfig>) -> Result<Self, CollaboratorError> {
        let timeout = config.as_ref().map_or(DEFAULT_AI_TIMEOUT, |c| c.timeout);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Send one prompt and return the trimmed reply.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` when the client is disabled, the request fails,
    /// or the response is empty.
    pub async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let config = self.config.as_ref().ok_or(CollaboratorError::Disabled)?;

        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollaboratorError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(CollaboratorError::EmptyResponse)?;

        Ok(content)
    }

    async fn complete_json<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, CollaboratorError> {
        let reply = self.complete(prompt).await?;
        parse_json_reply(&reply)
    }
}

#[async_trait]
impl QuestionGenerator for AiClient {
    async fn generate(&self, request: &StartRequest) -> Result<Vec<RoundDraft>, CollaboratorError> {
        let reply: GeneratedRounds = self.complete_json(&generation_prompt(request)).await?;
        let drafts: Vec<RoundDraft> = reply
            .rounds
            .into_iter()
            .map(GeneratedRound::into_draft)
            .filter(|draft| !draft.questions.is_empty())
            .collect();
        if drafts.is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        tracing::debug!(rounds = drafts.len(), "generated rounds");
        Ok(drafts)
    }
}

#[async_trait]
impl AnswerEvaluator for AiClient {
    async fn evaluate(
        &self,
        session: &Session,
    ) -> Result<Vec<Vec<QuestionEvaluation>>, CollaboratorError> {
        let reply: ScoredRounds = self.complete_json(&evaluation_prompt(session)).await?;
        Ok(reply
            .rounds
            .into_iter()
            .map(|round| round.into_iter().map(ScoredQuestion::into_evaluation).collect())
            .collect())
    }
}

#[async_trait]
impl SummaryWriter for AiClient {
    async fn summarize(&self, session: &Session) -> Result<String, CollaboratorError> {
        self.complete(&summary_prompt(session)).await
    }
}

//
// ─── PROMPTS ───────────────────────────────────────────────────────────────────
//

fn generation_prompt(request: &StartRequest) -> String {
    let brief = match &request.mode {
        SessionMode::Exam { exam_type } => format!(
            "Write a {exam_type} exam with exactly {} questions in a single round \
             with category \"aptitude\".",
            exam_question_count(request)
        ),
        SessionMode::Interview {
            company,
            role,
            experience,
        } => format!(
            "Plan a mock interview for a {role} position at {company} for a candidate \
             with {experience} of experience. Use 3 to 5 rounds with 2 to 4 questions each."
        ),
    };
    format!(
        "{brief}\nReturn JSON of the form {{\"rounds\": [{{\"name\": string, \"category\": \
         one of technical|behavioral|coding|system_design|aptitude|general, \
         \"durationMinutes\": number, \"description\": string, \"questions\": [string]}}]}}."
    )
}

fn evaluation_prompt(session: &Session) -> String {
    let mut prompt = String::from(
        "Score each answer from 0 to 100 and give one or two sentences of feedback. \
         Set isCorrect only for questions with an objectively right answer.\n",
    );
    for round in session.rounds_view() {
        let _ = writeln!(prompt, "\nRound {} ({}):", round.index(), round.category());
        for (question_index, question) in round.questions().iter().enumerate() {
            let _ = writeln!(
                prompt,
                "Q{question_index}: {}\nA{question_index}: {}",
                question.prompt(),
                question.answer().unwrap_or("(no answer)")
            );
        }
    }
    prompt.push_str(
        "\nReturn JSON of the form {\"rounds\": [[{\"score\": number, \"feedback\": string, \
         \"isCorrect\": boolean or null}]]} with one inner list per round in the same order.",
    );
    prompt
}

fn summary_prompt(session: &Session) -> String {
    let mut prompt = String::from(
        "Write a short paragraph summarizing the candidate's performance, naming one \
         strength and one area to improve.\n",
    );
    for round in session.rounds_view() {
        let _ = writeln!(prompt, "\nRound {}:", round.name());
        for question in round.questions() {
            let _ = writeln!(
                prompt,
                "- {} | score: {} | feedback: {}",
                question.prompt(),
                question
                    .score()
                    .map_or_else(|| "n/a".to_string(), |score| format!("{score:.0}")),
                question.feedback().unwrap_or("none")
            );
        }
    }
    if let Some(metrics) = session.metrics() {
        let _ = writeln!(
            prompt,
            "\nOn camera the candidate's face was visible {:.0}% of the time; dominant \
             expression: {}.",
            metrics.face_presence_ratio * 100.0,
            metrics.dominant_emotion.as_deref().unwrap_or("unknown")
        );
    }
    prompt
}

/// Models often wrap JSON in a fenced block; take the outermost object.
fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T, CollaboratorError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => return Err(CollaboratorError::Malformed("no JSON object in reply".into())),
    };
    serde_json::from_str(body).map_err(|err| CollaboratorError::Malformed(err.to_string()))
}

//
// ─── WIRE TYPES ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct GeneratedRounds {
    rounds: Vec<GeneratedRound>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedRound {
    name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    duration_minutes: u32,
    #[serde(default)]
    description: String,
    questions: Vec<String>,
}

impl GeneratedRound {
    fn into_draft(self) -> RoundDraft {
        let questions: Vec<String> = self
            .questions
            .into_iter()
            .filter(|q| !q.trim().is_empty())
            .collect();
        let duration_minutes = match self.duration_minutes {
            0 => u32::try_from(questions.len())
                .unwrap_or(u32::MAX)
                .saturating_mul(DEFAULT_MINUTES_PER_QUESTION),
            minutes => minutes,
        };
        RoundDraft {
            name: self.name,
            category: self.category.parse().unwrap_or(RoundCategory::General),
            duration_minutes,
            description: self.description,
            questions,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScoredRounds {
    rounds: Vec<Vec<ScoredQuestion>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoredQuestion {
    score: Option<f32>,
    feedback: Option<String>,
    is_correct: Option<bool>,
}

impl ScoredQuestion {
    fn into_evaluation(self) -> QuestionEvaluation {
        QuestionEvaluation {
            score: self
                .score
                .filter(|score| score.is_finite())
                .map(|score| score.clamp(0.0, 100.0)),
            feedback: self.feedback,
            is_correct: self.is_correct,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::model::OwnerId;

    #[tokio::test]
    async fn disabled_client_refuses_requests() {
        let client = AiClient::new(None).unwrap();
        assert!(!client.enabled());
        assert!(matches!(
            client.complete("hello").await,
            Err(CollaboratorError::Disabled)
        ));
    }

    #[test]
    fn parses_fenced_round_json() {
        let reply = "```json\n{\"rounds\": [{\"name\": \"Design\", \"category\": \"System Design\", \
                     \"durationMinutes\": 20, \"questions\": [\"Design a cache\", \"  \"]}]}\n```";
        let parsed: GeneratedRounds = parse_json_reply(reply).unwrap();
        let draft = parsed.rounds.into_iter().next().unwrap().into_draft();
        assert_eq!(draft.category, RoundCategory::SystemDesign);
        assert_eq!(draft.questions, vec!["Design a cache".to_string()]);
    }

    #[test]
    fn untimed_rounds_get_a_per_question_default() {
        let reply = r#"{"rounds": [
            {"name": "Warmup", "questions": ["Tell me about yourself", "Why us?"]},
            {"name": "Deep dive", "durationMinutes": 0, "questions": ["Walk through a design"]},
            {"name": "Coding", "durationMinutes": 25, "questions": ["Reverse a list"]}
        ]}"#;
        let parsed: GeneratedRounds = parse_json_reply(reply).unwrap();
        let minutes: Vec<u32> = parsed
            .rounds
            .into_iter()
            .map(|round| round.into_draft().duration_minutes)
            .collect();
        assert_eq!(
            minutes,
            vec![2 * DEFAULT_MINUTES_PER_QUESTION, DEFAULT_MINUTES_PER_QUESTION, 25]
        );
    }

    #[tokio::test]
    async fn stalled_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = AiClient::new(Some(AiConfig {
            base_url: format!("http://{addr}/v1"),
            api_key: "test-key".into(),
            model: "test-model".into(),
            timeout: Duration::from_millis(200),
        }))
        .unwrap();
        let started = std::time::Instant::now();
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(&err, CollaboratorError::Http(inner) if inner.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }

    #[test]
    fn clamps_out_of_range_scores() {
        let parsed: ScoredRounds =
            parse_json_reply(r#"{"rounds": [[{"score": 140, "feedback": "Great"}]]}"#).unwrap();
        let eval = parsed.rounds.into_iter().flatten().next().unwrap().into_evaluation();
        assert_eq!(eval.score, Some(100.0));
        assert_eq!(eval.is_correct, None);
    }

    #[test]
    fn rejects_replies_without_json() {
        let err = parse_json_reply::<ScoredRounds>("I cannot do that.").unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed(_)));
    }

    #[test]
    fn exam_prompt_carries_requested_count() {
        let request = StartRequest {
            owner: OwnerId::anonymous(),
            mode: SessionMode::Exam {
                exam_type: "Rust".into(),
            },
            question_count: Some(7),
        };
        assert!(generation_prompt(&request).contains("exactly 7 questions"));
    }
}
