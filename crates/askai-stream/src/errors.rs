/// Failures raised while opening or reading a response stream.
///
/// These never escape `ChatSurface::send`; they are recovered into an apology
/// message and reported through `AssemblyOutcome::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Request rejected, network failure, or non-success status.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status_code: Option<u16>,
    },
    /// The response carried no readable body.
    #[error("response stream unavailable: {message}")]
    StreamUnavailable { message: String },
}

impl StreamError {
    /// Creates a transport-level error without a status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: None,
        }
    }

    /// Creates a transport-level error for a non-success HTTP status.
    pub fn status(status_code: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Creates an error for a response without a readable body.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StreamUnavailable {
            message: message.into(),
        }
    }

    /// Returns the HTTP status code when the failure came from one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transport { status_code, .. } => *status_code,
            Self::StreamUnavailable { .. } => None,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message, .. } | Self::StreamUnavailable { message } => message,
        }
    }
}

/// The completed buffer could not be read as `{"response", "sources"}`.
#[derive(Debug, thiserror::Error)]
pub enum FinalParseError {
    /// No `{ ... }` span was found in the buffer.
    #[error("no JSON object found in response body")]
    NoObject,
    /// The object span did not deserialize.
    #[error("invalid response JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error type for the public chat API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (blank query, nothing to retry, bad session id).
    #[error("validation error: {0}")]
    Validation(String),
    /// Transport failure, for callers that opt out of in-transcript recovery
    /// with `AssemblyOutcome::into_result`.
    #[error(transparent)]
    Stream(#[from] StreamError),
}
