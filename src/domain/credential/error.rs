use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum CredentialServiceError {
    #[error("dependency error: {0}")]
    Dependency(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("credential not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<AppError> for CredentialServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::BadRequest(msg) => CredentialServiceError::Invalid(msg),
            AppError::NotFound(_) => CredentialServiceError::NotFound,
            AppError::Conflict(msg) => CredentialServiceError::Conflict(msg),
            _ => CredentialServiceError::Dependency(err.to_string()),
        }
    }
}

impl From<CredentialServiceError> for AppError {
    fn from(err: CredentialServiceError) -> Self {
        match err {
            CredentialServiceError::Invalid(msg) => AppError::BadRequest(msg),
            CredentialServiceError::NotFound => AppError::NotFound("Credential not found".to_string()),
            CredentialServiceError::Conflict(msg) => AppError::Conflict(msg),
            CredentialServiceError::Dependency(msg) => AppError::ExternalService(msg),
            CredentialServiceError::Other(e) => AppError::Internal(e.to_string()),
        }
    }
}

/// Raised by the pool when no credential can ever serve a request
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error(
        "All credentials failed: {total} registered, {unusable} invalid, suspended, out of credits or inactive, {excluded} rejected for this chunk"
    )]
    Exhausted {
        total: usize,
        unusable: usize,
        excluded: usize,
    },
}
