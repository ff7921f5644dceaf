use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported embed model: `{0}`")]
    UnsupportedProvider(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index state corrupt or incomplete: {0}")]
    CorruptIndex(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl Error {
    /// Errors that mean the persisted corpus can't be trusted as-is.
    pub fn is_corruption(&self) -> bool { matches!(self, Error::CorruptIndex(_)) }

    /// Errors caused by the request itself rather than by the engine.
    pub fn is_rejected_request(&self) -> bool {
        matches!(self, Error::InvalidConfig(_) | Error::UnsupportedProvider(_))
    }

    /// Recover an engine error that crossed an `anyhow` collaborator seam.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(other) => Error::External(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
