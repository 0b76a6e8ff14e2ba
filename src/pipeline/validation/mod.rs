pub mod types;
pub mod context;
pub mod lookup;
pub mod mapping;
pub mod prompt;
pub mod llm;
pub mod parser;
pub mod mock;
pub mod orchestrator;

pub use types::*;
pub use context::*;
pub use lookup::*;
pub use mapping::*;
pub use prompt::*;
pub use llm::*;
pub use parser::*;
pub use mock::*;
pub use orchestrator::*;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum ValidationError {
    /// Any failure reaching or understanding the LLM provider.
    #[error("Validation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("LLM response violates the result schema: {0}")]
    SchemaViolation(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Code database error: {0}")]
    CodeDatabase(String),

    #[error("Dictation too short for validation (< 10 characters)")]
    InputTooShort,
}

impl From<DatabaseError> for ValidationError {
    fn from(err: DatabaseError) -> Self {
        ValidationError::CodeDatabase(err.to_string())
    }
}

impl From<rusqlite::Error> for ValidationError {
    fn from(err: rusqlite::Error) -> Self {
        ValidationError::CodeDatabase(err.to_string())
    }
}
