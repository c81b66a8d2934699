use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::domain::credential::CredentialPool;
use crate::infrastructure::db::{check_connection, DbPool};

pub struct HealthController {
    pool: Arc<DbPool>,
    credentials: CredentialPool,
}

impl HealthController {
    pub fn new(pool: Arc<DbPool>, credentials: CredentialPool) -> Self {
        Self { pool, credentials }
    }

    pub async fn health() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    pub async fn health_ready(
        State(controller): State<Arc<HealthController>>,
    ) -> impl IntoResponse {
        let usable = controller.credentials.usable_count();
        let tts = if usable > 0 { "available" } else { "no_usable_credentials" };

        match check_connection(&controller.pool).await {
            Ok(_) => (
                StatusCode::OK,
                Json(json!({
                    "status": "ready",
                    "database": "connected",
                    "tts": tts,
                    "usable_credentials": usable
                })),
            ),
            Err(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "database": "disconnected",
                    "tts": tts,
                    "usable_credentials": usable
                })),
            ),
        }
    }
}
