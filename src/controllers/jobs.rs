use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::job::{
        ClearCompletedResponse, CreateJobRequest, CreateJobResponse, JobResponse, JobScheduler,
        JobSchedulerApi,
    },
    error::{AppError, AppResult},
};

pub struct JobController {
    scheduler: Arc<JobScheduler>,
}

impl JobController {
    pub fn new(scheduler: Arc<JobScheduler>) -> Self {
        Self { scheduler }
    }

    /// POST /api/jobs - Queue a narration job
    pub async fn create_job(
        State(controller): State<Arc<JobController>>,
        Json(request): Json<CreateJobRequest>,
    ) -> AppResult<(StatusCode, Json<CreateJobResponse>)> {
        let id = controller.scheduler.submit(request).await?;
        Ok((StatusCode::CREATED, Json(CreateJobResponse { id })))
    }

    /// GET /api/jobs - All jobs in submission order
    pub async fn list_jobs(
        State(controller): State<Arc<JobController>>,
    ) -> AppResult<Json<Vec<JobResponse>>> {
        Ok(Json(controller.scheduler.list().await))
    }

    /// GET /api/jobs/{id}
    pub async fn get_job(
        State(controller): State<Arc<JobController>>,
        Path(job_id): Path<Uuid>,
    ) -> AppResult<Json<JobResponse>> {
        let job = controller.scheduler.get(job_id).await?;
        Ok(Json(job))
    }

    /// DELETE /api/jobs/{id}
    pub async fn delete_job(
        State(controller): State<Arc<JobController>>,
        Path(job_id): Path<Uuid>,
    ) -> AppResult<StatusCode> {
        controller.scheduler.remove(job_id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    /// POST /api/jobs/{id}/cancel
    pub async fn cancel_job(
        State(controller): State<Arc<JobController>>,
        Path(job_id): Path<Uuid>,
    ) -> AppResult<Json<JobResponse>> {
        let job = controller.scheduler.cancel(job_id).await?;
        Ok(Json(job))
    }

    /// POST /api/jobs/clear-completed - Drop finished jobs and their artifacts
    pub async fn clear_completed(
        State(controller): State<Arc<JobController>>,
    ) -> AppResult<Json<ClearCompletedResponse>> {
        let removed = controller.scheduler.clear_completed().await;
        Ok(Json(ClearCompletedResponse { removed }))
    }

    /// GET /api/artifacts/{handle} - Download the final MP3
    pub async fn download_artifact(
        State(controller): State<Arc<JobController>>,
        Path(handle): Path<Uuid>,
    ) -> AppResult<(StatusCode, HeaderMap, Body)> {
        let artifact = controller.scheduler.artifact(handle).await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(artifact.mime_type),
        );
        headers.insert(
            header::CONTENT_DISPOSITION,
            content_disposition(&artifact.filename)?,
        );

        Ok((StatusCode::OK, headers, Body::from(artifact.data)))
    }
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name
fn content_disposition(filename: &str) -> AppResult<HeaderValue> {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();

    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    );
    HeaderValue::from_str(&value)
        .map_err(|e| AppError::Internal(format!("Invalid download filename: {}", e)))
}
