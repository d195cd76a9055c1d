use std::ops::Range;

use thiserror::Error;

use crate::model::Round;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IndexError {
    #[error("round {round} is out of range (session has {rounds} rounds)")]
    RoundOutOfRange { round: usize, rounds: usize },

    #[error("question {question} is out of range for round {round} ({len} questions)")]
    QuestionOutOfRange {
        round: usize,
        question: usize,
        len: usize,
    },

    #[error("slot {slot} is out of range (session has {total} slots)")]
    SlotOutOfRange { slot: usize, total: usize },
}

/// Maps `(round, question)` coordinates onto flat answer slots and back.
///
/// Built once per loaded session from the per-round question counts. Round sizes
/// never change after creation, so the prefix sums stay valid for the session's
/// lifetime. Every other component goes through this type instead of computing
/// offsets itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerIndexer {
    // offsets[r] is the first slot of round r; offsets[len] is the slot total.
    offsets: Vec<usize>,
}

impl AnswerIndexer {
    #[must_use]
    pub fn from_sizes(sizes: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        let mut acc = 0;
        offsets.push(acc);
        for size in sizes {
            acc += size;
            offsets.push(acc);
        }
        Self { offsets }
    }

    #[must_use]
    pub fn from_rounds(rounds: &[Round]) -> Self {
        let sizes: Vec<usize> = rounds.iter().map(Round::question_count).collect();
        Self::from_sizes(&sizes)
    }

    #[must_use]
    pub fn round_count(&self) -> usize {
        self.offsets.len() - 1
    }

    #[must_use]
    pub fn total_slots(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Number of questions in `round`.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::RoundOutOfRange` for an unknown round.
    pub fn round_len(&self, round: usize) -> Result<usize, IndexError> {
        let range = self.round_range(round)?;
        Ok(range.len())
    }

    /// Contiguous slot range owned by `round`.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::RoundOutOfRange` for an unknown round.
    pub fn round_range(&self, round: usize) -> Result<Range<usize>, IndexError> {
        if round >= self.round_count() {
            return Err(IndexError::RoundOutOfRange {
                round,
                rounds: self.round_count(),
            });
        }
        Ok(self.offsets[round]..self.offsets[round + 1])
    }

    /// Absolute slot for `(round, question)`.
    ///
    /// # Errors
    ///
    /// Returns `IndexError` if either coordinate is outside the addressed round.
    pub fn absolute_index(&self, round: usize, question: usize) -> Result<usize, IndexError> {
        let range = self.round_range(round)?;
        if question >= range.len() {
            return Err(IndexError::QuestionOutOfRange {
                round,
                question,
                len: range.len(),
            });
        }
        Ok(range.start + question)
    }

    /// Inverse of [`AnswerIndexer::absolute_index`].
    ///
    /// # Errors
    ///
    /// Returns `IndexError::SlotOutOfRange` if `slot` is past the last slot.
    pub fn coordinates(&self, slot: usize) -> Result<(usize, usize), IndexError> {
        let total = self.total_slots();
        if slot >= total {
            return Err(IndexError::SlotOutOfRange { slot, total });
        }
        // First offset strictly greater than `slot` closes the owning round.
        // Empty rounds share an offset with their neighbour and are skipped.
        let round = self.offsets.partition_point(|&start| start <= slot) - 1;
        Ok((round, slot - self.offsets[round]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_heterogeneous_rounds() {
        let indexer = AnswerIndexer::from_sizes(&[2, 3, 1]);
        assert_eq!(indexer.total_slots(), 6);
        assert_eq!(indexer.absolute_index(0, 0).unwrap(), 0);
        assert_eq!(indexer.absolute_index(0, 1).unwrap(), 1);
        assert_eq!(indexer.absolute_index(1, 0).unwrap(), 2);
        assert_eq!(indexer.absolute_index(1, 2).unwrap(), 4);
        assert_eq!(indexer.absolute_index(2, 0).unwrap(), 5);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let indexer = AnswerIndexer::from_sizes(&[2, 3]);
        assert_eq!(
            indexer.absolute_index(0, 2),
            Err(IndexError::QuestionOutOfRange {
                round: 0,
                question: 2,
                len: 2
            })
        );
        assert_eq!(
            indexer.absolute_index(2, 0),
            Err(IndexError::RoundOutOfRange { round: 2, rounds: 2 })
        );
        assert_eq!(
            indexer.coordinates(5),
            Err(IndexError::SlotOutOfRange { slot: 5, total: 5 })
        );
    }

    #[test]
    fn absolute_index_is_injective_and_invertible() {
        let configs: &[&[usize]] = &[&[1], &[5], &[2, 3], &[3, 1, 4, 1, 5], &[1, 1, 1, 1]];
        for sizes in configs {
            let indexer = AnswerIndexer::from_sizes(sizes);
            let mut seen = std::collections::HashSet::new();
            for (round, &len) in sizes.iter().enumerate() {
                for question in 0..len {
                    let slot = indexer.absolute_index(round, question).unwrap();
                    assert!(seen.insert(slot), "slot {slot} produced twice for {sizes:?}");
                    assert_eq!(indexer.coordinates(slot).unwrap(), (round, question));
                }
            }
            assert_eq!(seen.len(), indexer.total_slots());
        }
    }

    #[test]
    fn round_range_is_contiguous() {
        let indexer = AnswerIndexer::from_sizes(&[2, 3]);
        assert_eq!(indexer.round_range(0).unwrap(), 0..2);
        assert_eq!(indexer.round_range(1).unwrap(), 2..5);
        assert_eq!(indexer.round_len(1).unwrap(), 3);
    }
}
