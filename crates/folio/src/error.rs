//! Error types for the catalog, client configuration, and generation calls.

use std::time::Duration;

/// Shown to the user when the service answered but not in the expected shape.
pub const MALFORMED_RESPONSE_MESSAGE: &str = "Failed to generate summary.";

/// Shown to the user when the request itself failed.
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Error generating summary.";

/// Problems with the set of entities supplied at session start.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("entity key cannot be empty")]
    EmptyKey,

    #[error("entity '{0}' has an empty title")]
    EmptyTitle(String),

    #[error("entity '{0}' has no detail lines")]
    NoDetails(String),

    #[error("duplicate entity key: {0}")]
    DuplicateKey(String),

    #[error("unknown entity: {0}")]
    UnknownKey(String),

    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invalid text generation client settings.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing API key (set GEMINI_API_KEY or pass --api-key)")]
    MissingApiKey,

    #[error("model name cannot be empty")]
    EmptyModel,

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Which user-facing bucket a generation failure falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Malformed,
}

impl FailureKind {
    /// Fixed message safe to show an end user.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Transport => TRANSPORT_FAILURE_MESSAGE,
            Self::Malformed => MALFORMED_RESPONSE_MESSAGE,
        }
    }
}

/// Failure of a single outbound generation call.
///
/// The `Display` output is diagnostic detail for logs only.
#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned HTTP {status}: {body}")]
    ServiceStatus { status: u16, body: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("generation task panicked")]
    Panicked,

    #[error("no tokio runtime to run the request on")]
    NoRuntime,
}

impl GenerateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerateError::Malformed(_) => FailureKind::Malformed,
            GenerateError::Transport(_)
            | GenerateError::ServiceStatus { .. }
            | GenerateError::Timeout(_)
            | GenerateError::Panicked
            | GenerateError::NoRuntime => FailureKind::Transport,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}
