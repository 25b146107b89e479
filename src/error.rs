use thiserror::Error;

pub type GitLiteResult<T, E = GitLiteError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum GitLiteError {
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
