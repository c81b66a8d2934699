use anyhow::Result;
use narration_backend::domain::credential::{
    CreateCredentialRequest, CredentialResponse, CredentialService, CredentialServiceApi,
};
use narration_backend::infrastructure::db::DbPool;
use std::sync::Arc;

pub struct TestFixtures {
    pool: Arc<DbPool>,
    credential_service: Arc<CredentialService>,
}

impl TestFixtures {
    pub fn new(pool: Arc<DbPool>, credential_service: Arc<CredentialService>) -> Self {
        Self {
            pool,
            credential_service,
        }
    }

    pub async fn create_credential(&self, label: &str, secret: &str) -> Result<CredentialResponse> {
        let credential = self
            .credential_service
            .add(CreateCredentialRequest {
                label: label.to_string(),
                secret: secret.to_string(),
            })
            .await?;
        Ok(credential)
    }

    pub async fn get_credential_count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM credentials")
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count.0)
    }

    pub async fn get_credential_status(&self, label: &str) -> Result<Option<String>> {
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM credentials WHERE label = ?")
                .bind(label)
                .fetch_optional(self.pool.as_ref())
                .await?;
        Ok(status.map(|row| row.0))
    }
}
