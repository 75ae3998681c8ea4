use thiserror::Error;

#[derive(Debug, Error)]
pub enum IlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed module description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, IlError>;
