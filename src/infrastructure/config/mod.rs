use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    // TTS provider
    pub tts_provider: TtsProvider,
    pub gemini_api_base: String,
    pub gemini_tts_model: String,
    pub elevenlabs_api_base: String,
    pub elevenlabs_model: String,
    pub elevenlabs_stability: f32,
    pub elevenlabs_similarity_boost: f32,
    pub provider_timeout_secs: u64,
    // Scheduling
    pub max_concurrent_jobs: usize,
    pub chunk_word_limit: usize,
    pub max_text_length: usize,
    // Retry budget
    pub chunk_max_duration_secs: u64,
    pub chunk_max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub default_cooldown_secs: u64,
    // Fragment cache
    pub fragment_cache_enabled: bool,
    // Credentials imported at startup, `label=secret` pairs
    pub seed_credentials: Vec<(String, String)>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

/// Which TTS API the credential pool holds keys for
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    Gemini,
    ElevenLabs,
}

impl TtsProvider {
    /// Words per chunk that stay inside the provider's request limits
    pub fn default_chunk_word_limit(&self) -> usize {
        match self {
            TtsProvider::Gemini => 450,
            // ~2500 characters per request
            TtsProvider::ElevenLabs => 400,
        }
    }
}

impl std::fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TtsProvider::Gemini => write!(f, "gemini"),
            TtsProvider::ElevenLabs => write!(f, "elevenlabs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let tts_provider = match env::var("TTS_PROVIDER")
            .unwrap_or_else(|_| "gemini".to_string())
            .to_lowercase()
            .as_str()
        {
            "gemini" => TtsProvider::Gemini,
            "elevenlabs" => TtsProvider::ElevenLabs,
            other => return Err(format!("Unknown TTS_PROVIDER: {}", other).into()),
        };

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://narration.db?mode=rwc".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            environment: match env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .as_str()
            {
                "production" => Environment::Production,
                _ => Environment::Development,
            },
            log_format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            tts_provider,
            gemini_api_base: env::var("GEMINI_API_BASE").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta/models".to_string()
            }),
            gemini_tts_model: env::var("GEMINI_TTS_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash-preview-tts".to_string()),
            elevenlabs_api_base: env::var("ELEVENLABS_API_BASE")
                .unwrap_or_else(|_| "https://api.elevenlabs.io/v1/text-to-speech".to_string()),
            elevenlabs_model: env::var("ELEVENLABS_MODEL")
                .unwrap_or_else(|_| "eleven_multilingual_v2".to_string()),
            elevenlabs_stability: parse_var("ELEVENLABS_STABILITY", 0.75)?,
            elevenlabs_similarity_boost: parse_var("ELEVENLABS_SIMILARITY_BOOST", 0.75)?,
            provider_timeout_secs: parse_var("PROVIDER_TIMEOUT_SECS", 120)?,
            max_concurrent_jobs: parse_var("MAX_CONCURRENT_JOBS", 2)?,
            chunk_word_limit: parse_var(
                "CHUNK_WORD_LIMIT",
                tts_provider.default_chunk_word_limit(),
            )?,
            max_text_length: parse_var("MAX_TEXT_LENGTH", 500_000)?,
            chunk_max_duration_secs: parse_var("CHUNK_MAX_DURATION_SECS", 600)?,
            chunk_max_attempts: parse_var("CHUNK_MAX_ATTEMPTS", 20)?,
            backoff_base_ms: parse_var("BACKOFF_BASE_MS", 1000)?,
            backoff_max_ms: parse_var("BACKOFF_MAX_MS", 5000)?,
            default_cooldown_secs: parse_var("DEFAULT_COOLDOWN_SECS", 60)?,
            fragment_cache_enabled: env::var("FRAGMENT_CACHE_ENABLED")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(false),
            seed_credentials: parse_seed_credentials(
                &env::var("SEED_CREDENTIALS").unwrap_or_default(),
            ),
        };

        if config.max_concurrent_jobs == 0 {
            return Err("MAX_CONCURRENT_JOBS must be at least 1".into());
        }
        for (name, value) in [
            ("ELEVENLABS_STABILITY", config.elevenlabs_stability),
            ("ELEVENLABS_SIMILARITY_BOOST", config.elevenlabs_similarity_boost),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be between 0 and 1", name).into());
            }
        }

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs(self.default_cooldown_secs)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + 'static,
{
    match env::var(name) {
        Ok(value) => Ok(value.trim().parse::<T>()?),
        Err(_) => Ok(default),
    }
}

/// Parse `label=secret` pairs separated by commas. Entries without a label get
/// a generated one.
pub fn parse_seed_credentials(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(index, entry)| match entry.split_once('=') {
            Some((label, secret)) => (label.trim().to_string(), secret.trim().to_string()),
            None => (format!("key-{}", index + 1), entry.to_string()),
        })
        .filter(|(_, secret)| !secret.is_empty())
        .collect()
}
