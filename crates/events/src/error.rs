use herald_core::error::CoreError;

use crate::delivery::email::EmailError;

/// Errors raised by the async notification runtime.
#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A collaborator (object resolution, user directory) failed in a way
    /// that may succeed on a later attempt.
    #[error("Transient dependency failure in {context}: {message}")]
    Transient { context: String, message: String },
}

impl EventsError {
    pub fn transient(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transient {
            context: context.into(),
            message: message.to_string(),
        }
    }
}
