use super::error::CredentialServiceError;
use super::model::{
    CreateCredentialRequest, CredentialResponse, CredentialStatus, UpdateCredentialRequest,
};
use super::pool::CredentialPool;
use crate::infrastructure::repositories::{ProviderError, SynthesisRequest, TtsRepository};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

const MAX_LABEL_LENGTH: usize = 100;
const VALIDATION_TEXT: &str = "Hello.";

pub struct CredentialService {
    pool: CredentialPool,
    tts_repo: Arc<dyn TtsRepository>,
}

impl CredentialService {
    pub fn new(pool: CredentialPool, tts_repo: Arc<dyn TtsRepository>) -> Self {
        Self { pool, tts_repo }
    }
}

#[async_trait]
pub trait CredentialServiceApi: Send + Sync {
    async fn list(&self) -> Result<Vec<CredentialResponse>, CredentialServiceError>;

    async fn add(
        &self,
        request: CreateCredentialRequest,
    ) -> Result<CredentialResponse, CredentialServiceError>;

    async fn update(
        &self,
        credential_id: Uuid,
        request: UpdateCredentialRequest,
    ) -> Result<CredentialResponse, CredentialServiceError>;

    /// Delete a credential. Fails with a conflict while a chunk request holds it.
    async fn remove(&self, credential_id: Uuid) -> Result<(), CredentialServiceError>;

    /// Send a short synthesis with this credential and record the resulting status
    async fn validate(&self, credential_id: Uuid)
        -> Result<CredentialResponse, CredentialServiceError>;

    /// Register `(label, secret)` pairs whose secret is not known yet. Returns how many were added.
    async fn seed(&self, credentials: &[(String, String)]) -> Result<usize, CredentialServiceError>;
}

#[async_trait]
impl CredentialServiceApi for CredentialService {
    async fn list(&self) -> Result<Vec<CredentialResponse>, CredentialServiceError> {
        Ok(self
            .pool
            .snapshot()
            .into_iter()
            .map(|(credential, in_use)| CredentialResponse::from_credential(credential, in_use))
            .collect())
    }

    async fn add(
        &self,
        request: CreateCredentialRequest,
    ) -> Result<CredentialResponse, CredentialServiceError> {
        let label = request.label.trim();
        let secret = request.secret.trim();

        if label.is_empty() {
            return Err(CredentialServiceError::Invalid(
                "Label cannot be empty".to_string(),
            ));
        }
        if label.chars().count() > MAX_LABEL_LENGTH {
            return Err(CredentialServiceError::Invalid(format!(
                "Label cannot exceed {} characters",
                MAX_LABEL_LENGTH
            )));
        }
        if secret.is_empty() {
            return Err(CredentialServiceError::Invalid(
                "Secret cannot be empty".to_string(),
            ));
        }

        let credential = self.pool.add(label, secret).await?;
        tracing::info!(credential_id = %credential.id, label = %credential.label, "Credential added");

        Ok(CredentialResponse::from_credential(credential, false))
    }

    async fn update(
        &self,
        credential_id: Uuid,
        request: UpdateCredentialRequest,
    ) -> Result<CredentialResponse, CredentialServiceError> {
        let credential = self.pool.set_active(credential_id, request.is_active).await?;
        tracing::info!(
            credential_id = %credential_id,
            is_active = request.is_active,
            "Credential updated"
        );

        let in_use = self.pool.holder_of(credential_id).is_some();
        Ok(CredentialResponse::from_credential(credential, in_use))
    }

    async fn remove(&self, credential_id: Uuid) -> Result<(), CredentialServiceError> {
        self.pool.remove(credential_id).await?;
        tracing::info!(credential_id = %credential_id, "Credential removed");
        Ok(())
    }

    async fn validate(
        &self,
        credential_id: Uuid,
    ) -> Result<CredentialResponse, CredentialServiceError> {
        let request_id = format!("validate:{}", &credential_id.simple().to_string()[..8]);
        let lease = self.pool.acquire_specific(credential_id, &request_id)?;

        let voice = self.tts_repo.voices().first().ok_or_else(|| {
            CredentialServiceError::Dependency("TTS provider offers no voices".to_string())
        })?;
        let request = SynthesisRequest {
            text: VALIDATION_TEXT.to_string(),
            voice: voice.id.to_string(),
            model: self.tts_repo.model().to_string(),
        };
        let outcome = self.tts_repo.synthesize(&request, lease.secret()).await;

        let credential = match outcome {
            Ok(_) => {
                self.pool
                    .set_status(credential_id, CredentialStatus::Valid, None)
                    .await?
            }
            Err(ProviderError::RateLimited { retry_after }) => {
                self.pool
                    .record_rate_limited(credential_id, retry_after)
                    .await;
                self.pool
                    .set_status(
                        credential_id,
                        CredentialStatus::Valid,
                        Some("Rate limited during validation".to_string()),
                    )
                    .await?
            }
            Err(ProviderError::CredentialFatal(reason)) => {
                self.pool
                    .set_status(
                        credential_id,
                        reason.status(),
                        Some(reason.message().to_string()),
                    )
                    .await?
            }
            Err(error) => {
                tracing::warn!(
                    credential_id = %credential_id,
                    error = %error,
                    "Credential validation inconclusive"
                );
                return Err(CredentialServiceError::Dependency(error.to_string()));
            }
        };
        drop(lease);

        tracing::info!(
            credential_id = %credential_id,
            label = %credential.label,
            status = %credential.status,
            "Credential validated"
        );

        Ok(CredentialResponse::from_credential(credential, false))
    }

    async fn seed(&self, credentials: &[(String, String)]) -> Result<usize, CredentialServiceError> {
        let known: Vec<String> = self
            .pool
            .snapshot()
            .into_iter()
            .map(|(credential, _)| credential.secret)
            .collect();

        let mut added = 0;
        for (label, secret) in credentials {
            if known.iter().any(|existing| existing == secret) {
                continue;
            }
            self.pool.add(label, secret).await?;
            added += 1;
        }

        if added > 0 {
            tracing::info!(added, "Seed credentials imported");
        }
        Ok(added)
    }
}
