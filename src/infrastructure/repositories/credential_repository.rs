use crate::domain::credential::Credential;
use crate::error::AppResult;
use crate::infrastructure::db::DbPool;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence for the credential list.
///
/// Loaded once at startup and written after every mutation the pool makes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_all(&self) -> AppResult<Vec<Credential>>;

    /// Insert or update a credential by id
    async fn save(&self, credential: &Credential) -> AppResult<()>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

pub struct CredentialRepository {
    pool: Arc<DbPool>,
}

impl CredentialRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for CredentialRepository {
    async fn find_all(&self) -> AppResult<Vec<Credential>> {
        let pool = self.pool.as_ref();
        let credentials = sqlx::query_as::<_, Credential>(
            r#"
            SELECT id, label, secret, status, status_message, is_active, usage_count,
                   last_used_at, cooldown_until, created_at
            FROM credentials
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(credentials)
    }

    async fn save(&self, credential: &Credential) -> AppResult<()> {
        let pool = self.pool.as_ref();

        sqlx::query(
            r#"
            INSERT INTO credentials (
                id, label, secret, status, status_message, is_active,
                usage_count, last_used_at, cooldown_until, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id)
            DO UPDATE SET
                label = excluded.label,
                status = excluded.status,
                status_message = excluded.status_message,
                is_active = excluded.is_active,
                usage_count = excluded.usage_count,
                last_used_at = excluded.last_used_at,
                cooldown_until = excluded.cooldown_until
            "#,
        )
        .bind(credential.id)
        .bind(&credential.label)
        .bind(&credential.secret)
        .bind(credential.status)
        .bind(&credential.status_message)
        .bind(credential.is_active)
        .bind(credential.usage_count)
        .bind(credential.last_used_at)
        .bind(credential.cooldown_until)
        .bind(credential.created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let pool = self.pool.as_ref();

        sqlx::query("DELETE FROM credentials WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }
}

/// Process-local store, used when credentials need no persistence
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: Mutex<Vec<Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: Mutex::new(credentials),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_all(&self) -> AppResult<Vec<Credential>> {
        Ok(self.credentials.lock().clone())
    }

    async fn save(&self, credential: &Credential) -> AppResult<()> {
        let mut credentials = self.credentials.lock();
        match credentials.iter_mut().find(|c| c.id == credential.id) {
            Some(existing) => *existing = credential.clone(),
            None => credentials.push(credential.clone()),
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.credentials.lock().retain(|c| c.id != id);
        Ok(())
    }
}
