use crate::domain::credential::PoolError;
use std::time::Duration;

/// Terminal failure of one chunk. Anything recoverable is handled inside the
/// retry loop and never reaches the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChunkError {
    /// No credential can ever serve this chunk
    #[error("{reason}")]
    CredentialsExhausted { index: usize, reason: PoolError },

    /// Credentials exist but stayed locked or cooling down for the whole budget
    #[error("All credentials temporarily busy: chunk {index} waited {waited:?} for a free credential")]
    CredentialsBusy { index: usize, waited: Duration },

    #[error("Chunk {index} failed after {attempts} attempts: {last_error}")]
    AttemptsExhausted {
        index: usize,
        attempts: u32,
        last_error: String,
    },

    #[error("Chunk {index} exceeded its {limit:?} time budget after {attempts} attempts: {last_error}")]
    DeadlineExceeded {
        index: usize,
        attempts: u32,
        limit: Duration,
        last_error: String,
    },

    #[error("Job cancelled")]
    Cancelled { index: usize },
}

impl ChunkError {
    pub fn index(&self) -> usize {
        match self {
            ChunkError::CredentialsExhausted { index, .. }
            | ChunkError::CredentialsBusy { index, .. }
            | ChunkError::AttemptsExhausted { index, .. }
            | ChunkError::DeadlineExceeded { index, .. }
            | ChunkError::Cancelled { index } => *index,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChunkError::Cancelled { .. })
    }
}
