/// Error type for model ingestion.
///
/// Every failure (malformed structure, bad numeric token, insane counts,
/// empty buffers, stream I/O) surfaces as `InvalidModel`.
use std::io;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("invalid model: {0}")]
    InvalidModel(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ModelError::InvalidModel(reason.into())
    }
}

impl From<io::Error> for ModelError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => ModelError::invalid("unexpected end of data"),
            io::ErrorKind::InvalidData => ModelError::invalid(format!("unreadable text: {e}")),
            _ => ModelError::invalid(format!("read failed: {e}")),
        }
    }
}
