use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A hyperparameter or option is out of range or incompatible with another one.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A registry lookup (architecture, dataset, recipe) has no entry.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("dataset {name} not found at {path}")]
    DatasetNotFound { name: String, path: String },

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("failed to parse data: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
