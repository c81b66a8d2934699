use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::controllers::{
    credentials::CredentialController, health::HealthController, jobs::JobController, voices,
};
use crate::domain::synthesis::Voice;
use crate::infrastructure::config::Config;
use crate::infrastructure::middleware::request_id_middleware;

/// Room for JSON framing and multi-byte characters around the text limit
const BODY_LIMIT_OVERHEAD: usize = 64 * 1024;

/// Controllers wired into the router
pub struct Controllers {
    pub health: Arc<HealthController>,
    pub jobs: Arc<JobController>,
    pub credentials: Arc<CredentialController>,
    /// Catalog of the configured TTS provider
    pub voices: &'static [Voice],
}

/// Build the application router with every route and layer
pub fn build_router(config: &Config, controllers: Controllers) -> Router {
    let health_routes = Router::new()
        .route("/health", get(HealthController::health))
        .route("/health/ready", get(HealthController::health_ready))
        .with_state(controllers.health);

    let job_routes = Router::new()
        .route(
            "/api/jobs",
            get(JobController::list_jobs).post(JobController::create_job),
        )
        .route(
            "/api/jobs/clear-completed",
            post(JobController::clear_completed),
        )
        .route(
            "/api/jobs/:id",
            get(JobController::get_job).delete(JobController::delete_job),
        )
        .route("/api/jobs/:id/cancel", post(JobController::cancel_job))
        .route(
            "/api/artifacts/:handle",
            get(JobController::download_artifact),
        )
        .with_state(controllers.jobs);

    let credential_routes = Router::new()
        .route(
            "/api/credentials",
            get(CredentialController::list_credentials)
                .post(CredentialController::create_credential),
        )
        .route(
            "/api/credentials/:id",
            axum::routing::patch(CredentialController::update_credential)
                .delete(CredentialController::delete_credential),
        )
        .route(
            "/api/credentials/:id/validate",
            post(CredentialController::validate_credential),
        )
        .with_state(controllers.credentials);

    let voice_routes = Router::new()
        .route("/api/voices", get(voices::list_voices))
        .with_state(controllers.voices);

    let app = Router::new()
        .merge(voice_routes)
        .merge(health_routes)
        .merge(job_routes)
        .merge(credential_routes)
        .layer(DefaultBodyLimit::max(
            config.max_text_length.saturating_mul(4) + BODY_LIMIT_OVERHEAD,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    if config.is_development() {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the HTTP server with all routes configured
pub async fn start_http_server(
    config: Arc<Config>,
    controllers: Controllers,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(&config, controllers);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
