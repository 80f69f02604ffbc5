use thiserror::Error;

/// Failure reported by the books API transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("request failed: {0}")]
    Transport(String),

    /// A 2xx response whose body could not be decoded into the expected record.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Human-readable detail, the server's `detail` field for status errors.
    pub fn detail(&self) -> &str {
        match self {
            ApiError::Status { detail, .. } => detail,
            ApiError::Transport(msg) | ApiError::Malformed(msg) => msg,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ApiError::Malformed(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Malformed(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Malformed(err.to_string())
    }
}

/// The chapter catalog could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to fetch chapters: {0}")]
pub struct FetchError(#[from] pub ApiError);

/// Persisting the draft failed. The draft is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to save changes: {0}")]
pub struct SaveError(#[from] pub ApiError);

impl SaveError {
    pub fn detail(&self) -> &str {
        self.0.detail()
    }
}

/// Regeneration failed, or was requested before the draft was saved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("failed to process book: {0}")]
    Api(#[from] ApiError),

    #[error("draft has unsaved changes; save before processing")]
    Unsaved,
}

impl ProcessError {
    pub fn detail(&self) -> &str {
        match self {
            ProcessError::Api(err) => err.detail(),
            ProcessError::Unsaved => "unsaved changes",
        }
    }
}
