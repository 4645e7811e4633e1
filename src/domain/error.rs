use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("parse error in {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("scan error: {0}")]
    Scan(String),

    #[error("embedding error: {0}")]
    Embed(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("merge error: {0}")]
    Merge(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn scan(msg: impl Into<String>) -> Self {
        Self::Scan(msg.into())
    }

    pub fn embed(msg: impl Into<String>) -> Self {
        Self::Embed(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn merge(msg: impl Into<String>) -> Self {
        Self::Merge(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for the class of errors the orchestrator treats as fatal rather
    /// than per-file/per-chunk recoverable (spec ERROR HANDLING DESIGN):
    /// config/dimension mismatches, an unwalkable scan root, embed/store
    /// batch failures, and merge conflicts all abort the run rather than
    /// being folded into a per-run diagnostic collection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Scan(_)
                | Self::Embed(_)
                | Self::Store(_)
                | Self::Merge(_)
                | Self::Io(_)
                | Self::Internal(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}
