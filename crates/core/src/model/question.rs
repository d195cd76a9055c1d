use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("score must be a finite number between 0 and 100")]
    InvalidScore,
}

/// A single prompt plus the candidate's answer and post-evaluation metadata.
///
/// Answer fields are written by the submission path; score, feedback and
/// correctness only by evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    prompt: String,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    is_correct: Option<bool>,
    #[serde(default)]
    answered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    elapsed_seconds: Option<u32>,
}

/// Per-question outcome returned by the scoring collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEvaluation {
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub is_correct: Option<bool>,
}

impl QuestionEvaluation {
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidScore` if the score is NaN or outside `0..=100`.
    pub fn validate(&self) -> Result<(), QuestionError> {
        match self.score {
            Some(score) if !score.is_finite() || !(0.0..=100.0).contains(&score) => {
                Err(QuestionError::InvalidScore)
            }
            _ => Ok(()),
        }
    }
}

impl Question {
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyPrompt` if the prompt is blank.
    pub fn new(prompt: impl Into<String>) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        Ok(Self {
            prompt,
            answer: None,
            score: None,
            feedback: None,
            is_correct: None,
            answered_at: None,
            elapsed_seconds: None,
        })
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    #[must_use]
    pub fn score(&self) -> Option<f32> {
        self.score
    }

    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    #[must_use]
    pub fn is_correct(&self) -> Option<bool> {
        self.is_correct
    }

    #[must_use]
    pub fn answered_at(&self) -> Option<DateTime<Utc>> {
        self.answered_at
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> Option<u32> {
        self.elapsed_seconds
    }

    /// True when the confirmed answer has visible content.
    #[must_use]
    pub fn has_answer(&self) -> bool {
        is_filled(self.answer.as_deref())
    }

    pub(crate) fn record_answer(
        &mut self,
        text: String,
        answered_at: DateTime<Utc>,
        elapsed_seconds: Option<u32>,
    ) {
        if text.trim().is_empty() {
            self.answer = None;
            self.answered_at = None;
            self.elapsed_seconds = None;
            return;
        }
        self.answer = Some(text);
        self.answered_at = Some(answered_at);
        self.elapsed_seconds = elapsed_seconds;
    }

    pub(crate) fn apply_evaluation(&mut self, evaluation: QuestionEvaluation) {
        self.score = evaluation.score;
        self.feedback = evaluation.feedback;
        self.is_correct = evaluation.is_correct;
    }
}

/// Slot content counts as answered only when it has non-whitespace text.
#[must_use]
pub fn is_filled(answer: Option<&str>) -> bool {
    answer.is_some_and(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn blank_prompt_is_rejected() {
        assert_eq!(Question::new("   ").unwrap_err(), QuestionError::EmptyPrompt);
    }

    #[test]
    fn recording_whitespace_clears_the_answer() {
        let mut q = Question::new("Explain ownership").unwrap();
        q.record_answer("Moves and borrows".into(), fixed_now(), Some(30));
        assert!(q.has_answer());
        assert_eq!(q.elapsed_seconds(), Some(30));

        q.record_answer("   ".into(), fixed_now(), Some(31));
        assert!(!q.has_answer());
        assert_eq!(q.answer(), None);
        assert_eq!(q.answered_at(), None);
    }

    #[test]
    fn evaluation_score_bounds() {
        let ok = QuestionEvaluation {
            score: Some(80.0),
            ..QuestionEvaluation::default()
        };
        assert!(ok.validate().is_ok());

        let bad = QuestionEvaluation {
            score: Some(f32::NAN),
            ..QuestionEvaluation::default()
        };
        assert_eq!(bad.validate(), Err(QuestionError::InvalidScore));
    }
}
