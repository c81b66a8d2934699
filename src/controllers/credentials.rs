use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::credential::{
        CreateCredentialRequest, CredentialResponse, CredentialService, CredentialServiceApi,
        UpdateCredentialRequest,
    },
    error::AppResult,
};

pub struct CredentialController {
    credential_service: Arc<CredentialService>,
}

impl CredentialController {
    pub fn new(credential_service: Arc<CredentialService>) -> Self {
        Self { credential_service }
    }

    /// GET /api/credentials - List credentials with masked secrets
    pub async fn list_credentials(
        State(controller): State<Arc<CredentialController>>,
    ) -> AppResult<Json<Vec<CredentialResponse>>> {
        let credentials = controller.credential_service.list().await?;
        Ok(Json(credentials))
    }

    /// POST /api/credentials - Register a credential
    pub async fn create_credential(
        State(controller): State<Arc<CredentialController>>,
        Json(request): Json<CreateCredentialRequest>,
    ) -> AppResult<(StatusCode, Json<CredentialResponse>)> {
        let credential = controller.credential_service.add(request).await?;
        Ok((StatusCode::CREATED, Json(credential)))
    }

    /// PATCH /api/credentials/{id} - Enable or disable a credential
    pub async fn update_credential(
        State(controller): State<Arc<CredentialController>>,
        Path(credential_id): Path<Uuid>,
        Json(request): Json<UpdateCredentialRequest>,
    ) -> AppResult<Json<CredentialResponse>> {
        let credential = controller
            .credential_service
            .update(credential_id, request)
            .await?;
        Ok(Json(credential))
    }

    /// DELETE /api/credentials/{id}
    pub async fn delete_credential(
        State(controller): State<Arc<CredentialController>>,
        Path(credential_id): Path<Uuid>,
    ) -> AppResult<StatusCode> {
        controller.credential_service.remove(credential_id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    /// POST /api/credentials/{id}/validate - Check this credential against the provider
    pub async fn validate_credential(
        State(controller): State<Arc<CredentialController>>,
        Path(credential_id): Path<Uuid>,
    ) -> AppResult<Json<CredentialResponse>> {
        let credential = controller
            .credential_service
            .validate(credential_id)
            .await?;
        Ok(Json(credential))
    }
}
