use anyhow::Result;
use narration_backend::controllers::{
    credentials::CredentialController, health::HealthController, jobs::JobController,
};
use narration_backend::domain::credential::{CredentialPool, CredentialService};
use narration_backend::domain::job::{JobScheduler, SchedulerSettings};
use narration_backend::domain::synthesis::{ChunkRetryEngine, RetryPolicy};
use narration_backend::infrastructure::config::{Config, Environment, LogFormat, TtsProvider};
use narration_backend::infrastructure::db::{create_pool, run_migrations};
use narration_backend::infrastructure::http::{build_router, Controllers};
use narration_backend::infrastructure::repositories::{
    ArtifactRepository, CredentialRepository, TtsRepository,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use test_context::AsyncTestContext;
use tokio::net::TcpListener;

pub mod api_client;
pub mod fake_provider;
pub mod fixtures;

use api_client::TestClient;
use fake_provider::FakeTtsProvider;
use fixtures::TestFixtures;

/// Small enough for the too-large check to be cheap to exercise
pub const TEST_MAX_TEXT_LENGTH: usize = 5_000;

pub struct TestContext {
    pub client: TestClient,
    #[allow(dead_code)]
    pub config: Config,
    pub provider: Arc<FakeTtsProvider>,
    pub fixtures: TestFixtures,
}

impl AsyncTestContext for TestContext {
    fn setup() -> impl std::future::Future<Output = Self> + Send {
        async {
            let config = test_config();

            let TestApp {
                router,
                provider,
                fixtures,
            } = create_app(&config).await.expect("Failed to create app");

            // Start server
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind listener");
            let addr = listener.local_addr().expect("Failed to get local addr");
            let base_url = format!("http://{}", addr);

            tokio::spawn(async move {
                axum::serve(listener, router).await.unwrap();
            });

            Self {
                client: TestClient::new(&base_url),
                config,
                provider,
                fixtures,
            }
        }
    }

    fn teardown(self) -> impl std::future::Future<Output = ()> + Send {
        async {
            // The in-memory database goes away with its pool
        }
    }
}

fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0, // Will be assigned by the OS
        environment: Environment::Development,
        log_format: LogFormat::Pretty,
        tts_provider: TtsProvider::Gemini,
        gemini_api_base: "http://localhost:9999".to_string(),
        gemini_tts_model: "fake-tts".to_string(),
        elevenlabs_api_base: "http://localhost:9999".to_string(),
        elevenlabs_model: "fake-tts".to_string(),
        elevenlabs_stability: 0.75,
        elevenlabs_similarity_boost: 0.75,
        provider_timeout_secs: 5,
        max_concurrent_jobs: 2,
        chunk_word_limit: 8,
        max_text_length: TEST_MAX_TEXT_LENGTH,
        chunk_max_duration_secs: 5,
        chunk_max_attempts: 20,
        backoff_base_ms: 10,
        backoff_max_ms: 50,
        default_cooldown_secs: 30,
        fragment_cache_enabled: false, // Disable cache in tests to count provider calls
        seed_credentials: Vec::new(),
    }
}

struct TestApp {
    router: axum::Router,
    provider: Arc<FakeTtsProvider>,
    fixtures: TestFixtures,
}

async fn create_app(config: &Config) -> Result<TestApp> {
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    let pool = Arc::new(pool);

    // Instantiate repositories
    let credential_repo = Arc::new(CredentialRepository::new(pool.clone()));
    let artifact_repo = Arc::new(ArtifactRepository::new());
    let provider = Arc::new(FakeTtsProvider::default());

    // Instantiate services
    let credential_pool = CredentialPool::load(credential_repo, config.default_cooldown())
        .await?;
    let credential_service = Arc::new(CredentialService::new(
        credential_pool.clone(),
        provider.clone(),
    ));
    let policy = RetryPolicy {
        switch_pause: Duration::from_millis(10),
        ..RetryPolicy::from_config(config)
    };
    let engine = Arc::new(ChunkRetryEngine::new(
        credential_pool.clone(),
        provider.clone(),
        policy,
        config.fragment_cache_enabled,
    ));
    let scheduler = Arc::new(JobScheduler::new(
        engine,
        artifact_repo,
        SchedulerSettings::from_config(config),
    ));

    // Instantiate controllers
    let controllers = Controllers {
        health: Arc::new(HealthController::new(pool.clone(), credential_pool)),
        jobs: Arc::new(JobController::new(scheduler)),
        credentials: Arc::new(CredentialController::new(credential_service.clone())),
        voices: provider.voices(),
    };

    Ok(TestApp {
        router: build_router(config, controllers),
        provider,
        fixtures: TestFixtures::new(pool, credential_service),
    })
}

/// Poll a job until it reaches `done` or `error`
pub async fn wait_for_job(client: &TestClient, job_id: &str) -> Value {
    let path = format!("/api/jobs/{}", job_id);
    for _ in 0..200 {
        let response = client.get(&path).await.unwrap();
        let job = response.body.expect("Missing job body");
        if matches!(
            job.get("status").and_then(|s| s.as_str()),
            Some("done") | Some("error")
        ) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("Job {} did not finish in time", job_id);
}

/// Submit a job and return its id
pub async fn submit_job(client: &TestClient, text: &str, filename: Option<&str>) -> String {
    let response = client
        .post(
            "/api/jobs",
            &serde_json::json!({
                "text": text,
                "voice": "Kore",
                "filename": filename,
            }),
        )
        .await
        .unwrap();
    response.assert_status(hyper::StatusCode::CREATED);
    response
        .str_field("id")
        .expect("Missing job id")
        .to_string()
}
