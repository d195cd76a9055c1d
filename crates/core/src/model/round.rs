use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::question::{Question, QuestionError};

/// Fixed set of round categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundCategory {
    Technical,
    Behavioral,
    Coding,
    SystemDesign,
    Aptitude,
    #[default]
    General,
}

impl RoundCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RoundCategory::Technical => "technical",
            RoundCategory::Behavioral => "behavioral",
            RoundCategory::Coding => "coding",
            RoundCategory::SystemDesign => "system_design",
            RoundCategory::Aptitude => "aptitude",
            RoundCategory::General => "general",
        }
    }
}

impl fmt::Display for RoundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCategoryError(pub String);

impl fmt::Display for ParseCategoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown round category: {}", self.0)
    }
}

impl std::error::Error for ParseCategoryError {}

impl FromStr for RoundCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "technical" => Ok(Self::Technical),
            "behavioral" | "behavioural" => Ok(Self::Behavioral),
            "coding" => Ok(Self::Coding),
            "system_design" => Ok(Self::SystemDesign),
            "aptitude" => Ok(Self::Aptitude),
            "general" => Ok(Self::General),
            _ => Err(ParseCategoryError(s.to_owned())),
        }
    }
}

/// Round content as produced by the question-generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundDraft {
    pub name: String,
    #[serde(default)]
    pub category: RoundCategory,
    pub duration_minutes: u32,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<String>,
}

/// A named, timed group of questions. Question count is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    index: usize,
    name: String,
    category: RoundCategory,
    duration_minutes: u32,
    description: String,
    questions: Vec<Question>,
}

impl Round {
    pub(crate) fn from_draft(index: usize, draft: RoundDraft) -> Result<Self, QuestionError> {
        let questions = draft
            .questions
            .into_iter()
            .map(Question::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            index,
            name: draft.name,
            category: draft.category,
            duration_minutes: draft.duration_minutes,
            description: draft.description,
            questions,
        })
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn category(&self) -> RoundCategory {
        self.category
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub(crate) fn question_mut(&mut self, question: usize) -> Option<&mut Question> {
        self.questions.get_mut(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_loose_spellings() {
        assert_eq!("System Design".parse::<RoundCategory>().unwrap(), RoundCategory::SystemDesign);
        assert_eq!("behavioural".parse::<RoundCategory>().unwrap(), RoundCategory::Behavioral);
        assert!("karaoke".parse::<RoundCategory>().is_err());
    }

    #[test]
    fn draft_with_blank_question_fails() {
        let draft = RoundDraft {
            name: "Warmup".into(),
            category: RoundCategory::General,
            duration_minutes: 5,
            description: String::new(),
            questions: vec!["Tell me about yourself".into(), " ".into()],
        };
        assert_eq!(Round::from_draft(0, draft).unwrap_err(), QuestionError::EmptyPrompt);
    }
}
