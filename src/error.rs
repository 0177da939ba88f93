use thiserror::Error;

use crate::character::Pool;

// Enum for handling every error the application surfaces to a caller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError), // Rejected user input, nothing was changed.

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError), // A pool could not pay for an ability.

    #[error("Storage error: {0}")]
    Store(#[from] StoreError), // Failures from the persistence gateway, passed through as-is.

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Command(#[from] CommandError), // A shell line that could not be understood.

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Logger error: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("No character selected")]
    NoCharacterSelected,
}

pub type Result<T> = std::result::Result<T, AppError>;

// Local validation failures. Shown to the user as a message, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    BlankField { field: &'static str },

    #[error("The maximum of {0} is derived and cannot be edited")]
    ReadOnlyMaximum(Pool),

    #[error("No {collection} entry at index {index}")]
    IndexOutOfRange {
        collection: &'static str,
        index: usize,
    },

    #[error("Unknown entry {id} in {collection}")]
    UnknownEntry { collection: &'static str, id: i64 },
}

impl ValidationError {
    pub fn blank(field: &'static str) -> Self {
        ValidationError::BlankField { field }
    }
}

// Distinct reasons an ability cannot be paid for. The sheet is untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Invalid ability type: {0}")]
    InvalidAbilityType(String),

    #[error("This ability has no cost defined")]
    NoCostDefined,

    #[error("Insufficient resource! You have {available} {pool}, but need {required}")]
    InsufficientResource {
        pool: Pool,
        available: i64,
        required: i64,
    },
}

// Errors raised by a document store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document {id} not found in {path}")]
    NotFound { path: String, id: String },

    #[error("Invalid collection path: {0}")]
    InvalidPath(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Store IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Please fill in username and password")]
    MissingCredentials,

    #[error("Credentials rejected")]
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}
