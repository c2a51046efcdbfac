//! Error types for the nl2sql-assistant library.
//!
//! This module provides custom error types using `thiserror` for better error handling
//! and more specific error messages throughout the application.

use thiserror::Error;

use crate::provider::CompletionError;

/// Errors that can occur in the nl2sql-assistant application.
#[derive(Error, Debug)]
pub enum AssistantError {
    /// A schema document could not be parsed into a well-formed table
    #[error("Malformed schema document '{document}': {reason}")]
    MalformedSchema {
        /// Name of the offending document (file name or table name)
        document: String,
        /// What was wrong with it
        reason: String,
    },

    /// The question was empty or whitespace only
    #[error("Question cannot be empty")]
    EmptyQuestion,

    /// The question failed validation for another reason
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    /// Table lookup miss
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The fixed prompt frame alone does not fit the character budget
    #[error("Prompt frame needs {required} characters but the budget is {budget}")]
    PromptBudgetExceeded {
        /// Characters needed without any schema context
        required: usize,
        /// Configured budget
        budget: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Completion or embedding service failure
    #[error("Completion service error: {0}")]
    Completion(#[from] CompletionError),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization errors
    #[error("Binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

impl AssistantError {
    pub(crate) fn malformed(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSchema {
            document: document.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a question validation failure the user can fix.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyQuestion | Self::InvalidQuestion(_))
    }
}

/// Convenience type alias for Result with AssistantError
pub type Result<T> = std::result::Result<T, AssistantError>;

impl From<anyhow::Error> for AssistantError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<sled::Error> for AssistantError {
    fn from(err: sled::Error) -> Self {
        Self::Cache(err.to_string())
    }
}
