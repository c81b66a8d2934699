use axum::{extract::State, Json};

use crate::domain::synthesis::Voice;

/// GET /api/voices - Voice catalog of the configured provider
pub async fn list_voices(State(voices): State<&'static [Voice]>) -> Json<&'static [Voice]> {
    Json(voices)
}
