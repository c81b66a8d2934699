use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum JobServiceError {
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("text too large: {0}")]
    TooLarge(String),
    #[error("job not found")]
    NotFound,
    #[error("artifact not found")]
    ArtifactNotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<AppError> for JobServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::BadRequest(msg) => JobServiceError::Invalid(msg),
            AppError::PayloadTooLarge(msg) => JobServiceError::TooLarge(msg),
            AppError::NotFound(_) => JobServiceError::NotFound,
            AppError::Conflict(msg) => JobServiceError::Conflict(msg),
            _ => JobServiceError::Other(anyhow::anyhow!(err.to_string())),
        }
    }
}

impl From<JobServiceError> for AppError {
    fn from(err: JobServiceError) -> Self {
        match err {
            JobServiceError::Invalid(msg) => AppError::BadRequest(msg),
            JobServiceError::TooLarge(msg) => AppError::PayloadTooLarge(msg),
            JobServiceError::NotFound => AppError::NotFound("Job not found".to_string()),
            JobServiceError::ArtifactNotFound => {
                AppError::NotFound("Artifact not found or revoked".to_string())
            }
            JobServiceError::Conflict(msg) => AppError::Conflict(msg),
            JobServiceError::Other(e) => AppError::Internal(e.to_string()),
        }
    }
}
