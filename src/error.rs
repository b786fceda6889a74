use zarrs::storage::StorageError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed datatype '{descriptor}': {reason}")]
    MalformedDatatype { descriptor: String, reason: String },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("field '{0}' not found")]
    FieldNotFound(String),
    #[error("'{0}' already exists")]
    PathExists(String),
    #[error("'{0}' is not appendable")]
    NotAppendable(String),
    #[error("inconsistent append to '{path}': {reason}")]
    AppendInconsistent { path: String, reason: String },
    #[error("backend error at '{path}': {source}")]
    Backend {
        path: String,
        #[source]
        source: StorageError,
    },
    #[error("'{0}' was not completely written")]
    Incomplete(String),
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("cannot decode waveforms: {0}")]
    Decode(String),
    #[error("invalid name '{0}'")]
    InvalidName(String),
    #[error("{0}")]
    General(String),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn wrap(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }

    pub(crate) fn malformed(descriptor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDatatype {
            descriptor: descriptor.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn backend(path: impl Into<String>, source: StorageError) -> Self {
        Self::Backend {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn append_inconsistent(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AppendInconsistent {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
