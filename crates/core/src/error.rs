use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A notification type declaration is missing a required field or
    /// references something that does not exist. Fatal at registry build.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown notification type: {0}")]
    UnknownType(String),

    #[error("Notification type already registered: {0}")]
    DuplicateKey(String),

    /// A lookup that must be unique matched more than one row. Only raised
    /// in strict mode; otherwise logged by the caller.
    #[error("Inconsistency: {0}")]
    Inconsistency(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),
}
