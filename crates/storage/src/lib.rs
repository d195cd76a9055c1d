#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{AnswerRecord, InMemoryRepository, SessionRepository, Storage, StorageError};
