#![forbid(unsafe_code)]

pub mod error;
pub mod http;

pub use error::ApiError;
pub use http::{AppState, router};
