use std::fmt::Write as _;

use async_trait::async_trait;

use interview_core::model::{
    Question, QuestionEvaluation, RoundCategory, RoundDraft, Session, SessionMode, is_filled,
};

use super::{
    AnswerEvaluator, QuestionGenerator, StartRequest, SummaryWriter, exam_question_count,
};
use crate::error::CollaboratorError;

const EXAM_MINUTES_PER_QUESTION: u32 = 2;

const EXAM_TEMPLATES: &[&str] = &[
    "Define the core idea behind {topic} in your own words.",
    "Give a worked example that applies {topic}.",
    "What is a common mistake people make with {topic}, and how do you avoid it?",
    "Compare two approaches within {topic} and say when you would pick each.",
    "Explain a limitation of {topic}.",
];

/// Deterministic offline collaborators.
///
/// Questions come from fixed templates, scores from answer length, and the
/// summary from the scores. Useful for local runs and tests.
#[derive(Clone, Debug, Default)]
pub struct TemplateCollaborators;

impl TemplateCollaborators {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QuestionGenerator for TemplateCollaborators {
    async fn generate(&self, request: &StartRequest) -> Result<Vec<RoundDraft>, CollaboratorError> {
        Ok(match &request.mode {
            SessionMode::Exam { exam_type } => exam_rounds(exam_type, exam_question_count(request)),
            SessionMode::Interview {
                company,
                role,
                experience,
            } => interview_rounds(company, role, experience),
        })
    }
}

#[async_trait]
impl AnswerEvaluator for TemplateCollaborators {
    async fn evaluate(
        &self,
        session: &Session,
    ) -> Result<Vec<Vec<QuestionEvaluation>>, CollaboratorError> {
        let exam = session.mode().is_exam();
        Ok(session
            .rounds_view()
            .iter()
            .map(|round| {
                round
                    .questions()
                    .iter()
                    .map(|q| score_answer(q.answer(), exam))
                    .collect()
            })
            .collect())
    }
}

#[async_trait]
impl SummaryWriter for TemplateCollaborators {
    #[allow(clippy::cast_precision_loss)]
    async fn summarize(&self, session: &Session) -> Result<String, CollaboratorError> {
        let questions = session.rounds_view().iter().flat_map(|r| r.questions());
        let total = questions.clone().count();
        let answered = questions.clone().filter(|q| q.has_answer()).count();
        let scores: Vec<f32> = questions.filter_map(|q| q.score()).collect();

        let mut summary = format!("Answered {answered} of {total} questions.");
        if !scores.is_empty() {
            let mean = scores.iter().sum::<f32>() / scores.len() as f32;
            let _ = write!(summary, " Average score {mean:.0}/100.");
        }

        let best = session
            .rounds_view()
            .iter()
            .filter_map(|round| round_mean(round.questions()).map(|mean| (round.name(), mean)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((name, _)) = best {
            let _ = write!(summary, " Strongest round: {name}.");
        }

        if let Some(metrics) = session.metrics() {
            if metrics.sample_count > 0 {
                let _ = write!(
                    summary,
                    " Face visible in {:.0}% of camera samples.",
                    metrics.face_presence_ratio * 100.0
                );
            }
        }
        Ok(summary)
    }
}

#[allow(clippy::cast_precision_loss)]
fn round_mean(questions: &[Question]) -> Option<f32> {
    let scores: Vec<f32> = questions.iter().filter_map(|q| q.score()).collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f32>() / scores.len() as f32)
    }
}

#[allow(clippy::cast_precision_loss)]
fn score_answer(answer: Option<&str>, exam: bool) -> QuestionEvaluation {
    if !is_filled(answer) {
        return QuestionEvaluation {
            score: Some(0.0),
            feedback: Some("No answer was given.".into()),
            is_correct: exam.then_some(false),
        };
    }
    let words = answer.map_or(0, |a| a.split_whitespace().count());
    let score = (words as f32 * 5.0).min(100.0);
    let feedback = match words {
        0..=5 => "Very brief. Expand on your reasoning.",
        6..=19 => "A reasonable start. Add a concrete example.",
        _ => "Thorough answer with supporting detail.",
    };
    QuestionEvaluation {
        score: Some(score),
        feedback: Some(feedback.into()),
        is_correct: exam.then_some(score >= 50.0),
    }
}

fn exam_rounds(exam_type: &str, count: u32) -> Vec<RoundDraft> {
    let topic = if exam_type.trim().is_empty() {
        "the subject"
    } else {
        exam_type.trim()
    };
    let questions = (0..count as usize)
        .map(|n| {
            let template = EXAM_TEMPLATES[n % EXAM_TEMPLATES.len()];
            let text = template.replace("{topic}", topic);
            let pass = n / EXAM_TEMPLATES.len();
            if pass == 0 {
                text
            } else {
                format!("{text} (part {})", pass + 1)
            }
        })
        .collect();
    vec![RoundDraft {
        name: exam_type.to_owned(),
        category: RoundCategory::Aptitude,
        duration_minutes: count * EXAM_MINUTES_PER_QUESTION,
        description: format!("{count} questions on {topic}."),
        questions,
    }]
}

fn interview_rounds(company: &str, role: &str, experience: &str) -> Vec<RoundDraft> {
    vec![
        RoundDraft {
            name: "Technical fundamentals".into(),
            category: RoundCategory::Technical,
            duration_minutes: 15,
            description: format!("Core knowledge expected of a {role}."),
            questions: vec![
                format!("Which technologies have you relied on most as a {role}, and why?"),
                "Walk through how you would debug a production incident.".into(),
            ],
        },
        RoundDraft {
            name: "Problem solving".into(),
            category: RoundCategory::Coding,
            duration_minutes: 20,
            description: "Reasoning through a small design or coding task.".into(),
            questions: vec![
                "How would you detect a cycle in a linked list?".into(),
                "Design a rate limiter for a public API.".into(),
            ],
        },
        RoundDraft {
            name: "Behavioral".into(),
            category: RoundCategory::Behavioral,
            duration_minutes: 10,
            description: format!("Fit with the team at {company}."),
            questions: vec![
                format!("What in your {experience} of experience prepared you for {company}?"),
                "Tell us about a disagreement with a teammate and how it ended.".into(),
            ],
        },
    ]
}
