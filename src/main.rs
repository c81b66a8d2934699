use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use narration_backend::controllers::{
    credentials::CredentialController, health::HealthController, jobs::JobController,
};
use narration_backend::domain::credential::{CredentialPool, CredentialService, CredentialServiceApi};
use narration_backend::domain::job::{JobScheduler, SchedulerSettings};
use narration_backend::domain::synthesis::{ChunkRetryEngine, RetryPolicy};
use narration_backend::infrastructure::config::{Config, LogFormat, TtsProvider};
use narration_backend::infrastructure::db::{check_connection, create_pool, run_migrations};
use narration_backend::infrastructure::http::{start_http_server, Controllers};
use narration_backend::infrastructure::repositories::{
    ArtifactRepository, CredentialRepository, ElevenLabsTtsRepository, GeminiTtsRepository,
    TtsRepository, VoiceSettings,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        "Starting Narration Backend on {}:{}",
        config.host,
        config.port
    );

    // Create database connection pool
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    // Verify database connection
    check_connection(&pool).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database ready");

    let pool = Arc::new(pool);
    let config = Arc::new(config);

    // === DEPENDENCY INJECTION SETUP ===
    // 1. Instantiate repositories
    tracing::info!("Instantiating repositories...");
    let credential_repo = Arc::new(CredentialRepository::new(pool.clone()));
    let artifact_repo = Arc::new(ArtifactRepository::new());
    let tts_repo: Arc<dyn TtsRepository> = match config.tts_provider {
        TtsProvider::Gemini => Arc::new(GeminiTtsRepository::new(
            config.gemini_api_base.clone(),
            config.gemini_tts_model.clone(),
            config.provider_timeout(),
        )?),
        TtsProvider::ElevenLabs => Arc::new(ElevenLabsTtsRepository::new(
            config.elevenlabs_api_base.clone(),
            config.elevenlabs_model.clone(),
            VoiceSettings {
                stability: config.elevenlabs_stability,
                similarity_boost: config.elevenlabs_similarity_boost,
            },
            config.provider_timeout(),
        )?),
    };
    tracing::info!(
        provider = %config.tts_provider,
        model = tts_repo.model(),
        "TTS provider client initialized"
    );
    let voices = tts_repo.voices();

    // 2. Instantiate services
    tracing::info!("Instantiating services...");
    let credential_pool = CredentialPool::load(credential_repo, config.default_cooldown()).await?;
    let credential_service = Arc::new(CredentialService::new(
        credential_pool.clone(),
        tts_repo.clone(),
    ));
    credential_service.seed(&config.seed_credentials).await?;
    if credential_pool.usable_count() == 0 {
        tracing::warn!("No usable credentials registered. Jobs will fail until one is added.");
    }

    let engine = Arc::new(ChunkRetryEngine::new(
        credential_pool.clone(),
        tts_repo,
        RetryPolicy::from_config(&config),
        config.fragment_cache_enabled,
    ));
    let scheduler = Arc::new(JobScheduler::new(
        engine,
        artifact_repo,
        SchedulerSettings::from_config(&config),
    ));

    // 3. Instantiate controllers
    tracing::info!("Instantiating controllers...");
    let controllers = Controllers {
        health: Arc::new(HealthController::new(pool, credential_pool)),
        jobs: Arc::new(JobController::new(scheduler)),
        credentials: Arc::new(CredentialController::new(credential_service)),
        voices,
    };

    // Start HTTP server with all routes
    start_http_server(config, controllers).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "narration_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "narration_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
