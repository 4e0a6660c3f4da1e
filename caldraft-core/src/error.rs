//! Error types for the caldraft pipeline.

use thiserror::Error;

/// Errors that can occur while turning an item into a calendar event.
#[derive(Error, Debug)]
pub enum DraftError {
    #[error("Backend '{0}' returned no response")]
    BackendNoResponse(String),

    #[error("Backend '{0}' ran out of resources and no replacement was available")]
    BackendResourceExhausted(String),

    #[error("Could not recover a structure from the backend reply: {0}")]
    MalformedStructure(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("Invalid manual input: {0}")]
    InvalidManualInput(String),

    #[error("Publication rejected: {0}")]
    PublicationRejected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Interaction error: {0}")]
    Interaction(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider '{0}' not found in PATH")]
    ProviderNotInstalled(String),

    #[error("Provider request timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("ICS generation error: {0}")]
    Ics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DraftError {
    fn from(e: serde_json::Error) -> Self {
        DraftError::Serialization(e.to_string())
    }
}

/// Result type alias for caldraft operations.
pub type DraftResult<T> = Result<T, DraftError>;
