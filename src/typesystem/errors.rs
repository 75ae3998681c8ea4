use thiserror::Error;

/// Failure kinds of the type-system algebra. All of these are local to one
/// entity; callers catch them per-method or per-type and degrade.
#[derive(Debug, Clone, Error)]
pub enum TypeSystemError {
    #[error("Bad image format: {0}")]
    BadImageFormat(String),
    #[error("Could not load type '{name}' from module '{module}'")]
    TypeLoad { module: String, name: String },
    #[error("Missing method '{name}' on type '{owner}'")]
    MissingMethod { owner: String, name: String },
    #[error("Missing field '{name}' on type '{owner}'")]
    MissingField { owner: String, name: String },
    #[error("Invalid program: {0}")]
    InvalidProgram(String),
}

pub type Result<T> = std::result::Result<T, TypeSystemError>;
