use serde::Serialize;

use crate::indexer::{AnswerIndexer, IndexError};
use crate::model::{Session, is_filled};

/// Per-round answered counts, as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundProgress {
    pub index: usize,
    pub name: String,
    pub answered: usize,
    pub total: usize,
    pub is_complete: bool,
}

/// Aggregated view of session progress, useful for clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub overall_percent: f64,
    pub answered: usize,
    pub total: usize,
    pub current_round: usize,
    pub furthest_round: usize,
    pub rounds: Vec<RoundProgress>,
}

/// Derives completion figures from live slot contents. Nothing is cached.
#[derive(Debug, Clone, Copy)]
pub struct ProgressCalculator<'a> {
    session: &'a Session,
    indexer: &'a AnswerIndexer,
}

impl<'a> ProgressCalculator<'a> {
    #[must_use]
    pub fn new(session: &'a Session, indexer: &'a AnswerIndexer) -> Self {
        Self { session, indexer }
    }

    #[must_use]
    pub fn session(&self) -> &'a Session {
        self.session
    }

    #[must_use]
    pub fn round_count(&self) -> usize {
        self.indexer.round_count()
    }

    #[must_use]
    pub fn total_slots(&self) -> usize {
        self.indexer.total_slots()
    }

    fn slot_filled(&self, slot: usize) -> bool {
        self.session
            .effective_answer(self.indexer, slot)
            .is_ok_and(is_filled)
    }

    /// Number of answered slots in `round`.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::RoundOutOfRange` for an unknown round.
    pub fn round_answered(&self, round: usize) -> Result<usize, IndexError> {
        let range = self.indexer.round_range(round)?;
        Ok(range.filter(|slot| self.slot_filled(*slot)).count())
    }

    /// True iff every slot in `round` holds a non-empty answer.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::RoundOutOfRange` for an unknown round.
    pub fn is_round_complete(&self, round: usize) -> Result<bool, IndexError> {
        let mut range = self.indexer.round_range(round)?;
        Ok(range.all(|slot| self.slot_filled(slot)))
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        (0..self.total_slots())
            .filter(|slot| self.slot_filled(*slot))
            .count()
    }

    /// Percentage of answered slots, `0.0..=100.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overall_progress(&self) -> f64 {
        let total = self.total_slots();
        if total == 0 {
            return 0.0;
        }
        (self.answered_count() as f64 * 100.0) / total as f64
    }

    /// Effective answers of the active round, in question order.
    #[must_use]
    pub fn current_round_answers(&self) -> Vec<Option<&'a str>> {
        let Ok(range) = self.indexer.round_range(self.session.current_round()) else {
            return Vec::new();
        };
        range
            .map(|slot| {
                self.session
                    .effective_answer(self.indexer, slot)
                    .ok()
                    .flatten()
            })
            .collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let rounds = self
            .session
            .rounds_view()
            .iter()
            .map(|round| {
                let answered = self.round_answered(round.index()).unwrap_or(0);
                RoundProgress {
                    index: round.index(),
                    name: round.name().to_owned(),
                    answered,
                    total: round.question_count(),
                    is_complete: answered == round.question_count(),
                }
            })
            .collect();

        ProgressSnapshot {
            overall_percent: self.overall_progress(),
            answered: self.answered_count(),
            total: self.total_slots(),
            current_round: self.session.current_round(),
            furthest_round: self.session.furthest_round(),
            rounds,
        }
    }
}
