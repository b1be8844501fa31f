//!
//! src/errors.rs
//!
//! Defines enums and methods of error conversion
//! for errors the aggregation pipeline uses
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("empty result: {0}")]
    EmptyResult(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("pipeline cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self { PipelineError::Fetch(e.to_string()) }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self { PipelineError::Parse(e.to_string()) }
}
