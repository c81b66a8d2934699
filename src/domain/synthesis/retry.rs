use super::cancellation::Cancellation;
use super::error::ChunkError;
use crate::domain::credential::{CredentialPool, FatalReason, PoolWait};
use crate::infrastructure::config::Config;
use crate::infrastructure::repositories::{
    ProviderError, SynthesisRequest, SynthesizedAudio, TtsRepository,
};
use bytes::Bytes;
use moka::future::Cache;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Attempt budget and pacing for one chunk
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Floor of the attempt ceiling, whatever the pool size
    pub min_attempts: u32,
    /// Hard cap of the attempt ceiling
    pub max_attempts: u32,
    /// Wall-clock budget per chunk, waits included
    pub max_duration: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Pause before trying another credential after a rate limit or rejection
    pub switch_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_attempts: 5,
            max_attempts: 20,
            max_duration: Duration::from_secs(10 * 60),
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(5000),
            switch_pause: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.chunk_max_attempts.max(1),
            max_duration: Duration::from_secs(config.chunk_max_duration_secs),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            ..Self::default()
        }
    }

    /// Two attempts per usable credential, within `[min_attempts, max_attempts]`
    pub fn attempt_ceiling(&self, usable_credentials: usize) -> u32 {
        let per_pool = u32::try_from(usable_credentials.saturating_mul(2)).unwrap_or(u32::MAX);
        per_pool
            .max(self.min_attempts)
            .min(self.max_attempts.max(1))
    }

    /// `base * 2^(attempt - 1)`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    Pending,
    Requesting,
    Retrying,
    Succeeded,
    Failed,
}

/// Transition reported while a chunk is processed
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    Waiting {
        cooling: usize,
        locked: usize,
        wake_in: Option<Duration>,
    },
    Requesting {
        attempt: u32,
        credential: String,
    },
    RateLimited {
        attempt: u32,
        credential: String,
        cooldown: Duration,
    },
    CredentialRejected {
        attempt: u32,
        credential: String,
        reason: FatalReason,
    },
    Failed {
        attempt: u32,
        credential: String,
        message: String,
        backoff: Duration,
    },
    Succeeded {
        attempt: u32,
        credential: Option<String>,
        duration_seconds: f64,
    },
}

impl ChunkEvent {
    pub fn state(&self) -> ChunkState {
        match self {
            ChunkEvent::Waiting { .. } => ChunkState::Pending,
            ChunkEvent::Requesting { .. } => ChunkState::Requesting,
            ChunkEvent::RateLimited { .. }
            | ChunkEvent::CredentialRejected { .. }
            | ChunkEvent::Failed { .. } => ChunkState::Retrying,
            ChunkEvent::Succeeded { .. } => ChunkState::Succeeded,
        }
    }
}

pub trait ChunkObserver: Send + Sync {
    fn on_event(&self, chunk_index: usize, event: &ChunkEvent);
}

/// Observer that ignores every event
pub struct NoopObserver;

impl ChunkObserver for NoopObserver {
    fn on_event(&self, _chunk_index: usize, _event: &ChunkEvent) {}
}

/// One chunk's synthesized audio
#[derive(Debug, Clone)]
pub struct ChunkFragment {
    pub index: usize,
    pub audio: Bytes,
    pub mime_type: String,
    pub duration_seconds: f64,
    pub size_bytes: usize,
}

impl ChunkFragment {
    fn from_audio(index: usize, audio: SynthesizedAudio) -> Self {
        Self {
            index,
            size_bytes: audio.data.len(),
            audio: audio.data,
            mime_type: audio.mime_type,
            duration_seconds: audio.duration_seconds,
        }
    }
}

pub struct ChunkRequest<'a> {
    pub job_id: Uuid,
    pub index: usize,
    pub text: &'a str,
    pub voice: &'a str,
}

impl ChunkRequest<'_> {
    /// Lock holder label, diagnostic only
    pub fn request_id(&self) -> String {
        let job = self.job_id.simple().to_string();
        format!("{}:chunk{}", &job[..8], self.index)
    }
}

type FragmentKey = (String, String, String);

/// Accumulated outcome of the attempts made so far for one chunk
struct RetryState {
    attempt: u32,
    failed_credentials: HashSet<Uuid>,
    rate_limited: u32,
    last_error: Option<String>,
    started: Instant,
}

impl RetryState {
    fn new() -> Self {
        Self {
            attempt: 0,
            failed_credentials: HashSet::new(),
            rate_limited: 0,
            last_error: None,
            started: Instant::now(),
        }
    }

    fn last_error(&self) -> String {
        self.last_error
            .clone()
            .unwrap_or_else(|| "no attempt completed".to_string())
    }
}

/// Drives one chunk to a fragment across credentials, retries and cooldowns
pub struct ChunkRetryEngine {
    pool: CredentialPool,
    provider: Arc<dyn TtsRepository>,
    policy: RetryPolicy,
    cache: Option<Cache<FragmentKey, SynthesizedAudio>>,
}

impl ChunkRetryEngine {
    pub fn new(
        pool: CredentialPool,
        provider: Arc<dyn TtsRepository>,
        policy: RetryPolicy,
        cache_enabled: bool,
    ) -> Self {
        let cache = if cache_enabled {
            Some(
                Cache::builder()
                    .max_capacity(500)
                    .time_to_idle(Duration::from_secs(30 * 60))
                    .build(),
            )
        } else {
            None
        };

        Self {
            pool,
            provider,
            policy,
            cache,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn provider(&self) -> &Arc<dyn TtsRepository> {
        &self.provider
    }

    pub async fn process(
        &self,
        request: ChunkRequest<'_>,
        observer: &dyn ChunkObserver,
        cancel: &Cancellation,
    ) -> Result<ChunkFragment, ChunkError> {
        let index = request.index;
        let request_id = request.request_id();
        let cache_key: FragmentKey = (
            request.voice.to_string(),
            self.provider.model().to_string(),
            request.text.to_string(),
        );

        if let Some(cache) = &self.cache {
            if let Some(audio) = cache.get(&cache_key).await {
                tracing::debug!(request_id = %request_id, "Fragment cache hit");
                observer.on_event(
                    index,
                    &ChunkEvent::Succeeded {
                        attempt: 0,
                        credential: None,
                        duration_seconds: audio.duration_seconds,
                    },
                );
                return Ok(ChunkFragment::from_audio(index, audio));
            }
        }

        let synthesis = SynthesisRequest {
            text: request.text.to_string(),
            voice: request.voice.to_string(),
            model: self.provider.model().to_string(),
        };
        let ceiling = self.policy.attempt_ceiling(self.pool.usable_count());
        let mut state = RetryState::new();
        let deadline = state.started + self.policy.max_duration;

        loop {
            if cancel.is_cancelled() {
                return Err(ChunkError::Cancelled { index });
            }
            if state.attempt >= ceiling {
                return Err(self.fail(
                    &request_id,
                    &state,
                    ChunkError::AttemptsExhausted {
                        index,
                        attempts: state.attempt,
                        last_error: state.last_error(),
                    },
                ));
            }
            if Instant::now() >= deadline {
                return Err(self.deadline_exceeded(&request_id, index, &state));
            }

            let acquire = self.pool.acquire_observed(
                &request_id,
                &state.failed_credentials,
                |wait: PoolWait| {
                    tracing::debug!(
                        request_id = %request_id,
                        cooling = wait.cooling,
                        locked = wait.locked,
                        wake_in_ms = wait.wake_in.map(|d| d.as_millis() as u64),
                        "Waiting for a free credential"
                    );
                    observer.on_event(
                        index,
                        &ChunkEvent::Waiting {
                            cooling: wait.cooling,
                            locked: wait.locked,
                            wake_in: wait.wake_in,
                        },
                    );
                },
            );

            let lease = tokio::select! {
                result = acquire => match result {
                    Ok(lease) => lease,
                    Err(reason) => {
                        return Err(self.fail(
                            &request_id,
                            &state,
                            ChunkError::CredentialsExhausted { index, reason },
                        ));
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(self.fail(
                        &request_id,
                        &state,
                        ChunkError::CredentialsBusy {
                            index,
                            waited: state.started.elapsed(),
                        },
                    ));
                }
                _ = cancel.cancelled() => return Err(ChunkError::Cancelled { index }),
            };

            state.attempt += 1;
            let credential_id = lease.credential_id();
            let credential = lease.label().to_string();

            tracing::debug!(
                request_id = %request_id,
                credential = %credential,
                attempt = state.attempt,
                ceiling,
                "Requesting chunk audio"
            );
            observer.on_event(
                index,
                &ChunkEvent::Requesting {
                    attempt: state.attempt,
                    credential: credential.clone(),
                },
            );

            let outcome = tokio::select! {
                outcome = self.provider.synthesize(&synthesis, lease.secret()) => outcome,
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(self.deadline_exceeded(&request_id, index, &state));
                }
                _ = cancel.cancelled() => return Err(ChunkError::Cancelled { index }),
            };

            let pause = match outcome {
                Ok(audio) if !audio.data.is_empty() => {
                    self.pool.record_success(credential_id).await;
                    drop(lease);

                    tracing::info!(
                        request_id = %request_id,
                        credential = %credential,
                        attempt = state.attempt,
                        duration_seconds = audio.duration_seconds,
                        size_bytes = audio.data.len(),
                        "Chunk synthesized"
                    );
                    observer.on_event(
                        index,
                        &ChunkEvent::Succeeded {
                            attempt: state.attempt,
                            credential: Some(credential),
                            duration_seconds: audio.duration_seconds,
                        },
                    );

                    if let Some(cache) = &self.cache {
                        cache.insert(cache_key, audio.clone()).await;
                    }
                    return Ok(ChunkFragment::from_audio(index, audio));
                }
                Ok(_) => {
                    drop(lease);
                    let message = "provider returned empty audio".to_string();
                    self.transient_failure(&request_id, index, &credential, &mut state, message, observer)
                }
                Err(ProviderError::RateLimited { retry_after }) => {
                    let cooldown = self.pool.record_rate_limited(credential_id, retry_after).await;
                    drop(lease);

                    state.rate_limited += 1;
                    state.last_error = Some(format!("credential \"{}\" rate limited", credential));
                    tracing::warn!(
                        request_id = %request_id,
                        credential = %credential,
                        attempt = state.attempt,
                        rate_limited = state.rate_limited,
                        cooldown_secs = cooldown.as_secs_f64(),
                        "Chunk rate limited, switching credential"
                    );
                    observer.on_event(
                        index,
                        &ChunkEvent::RateLimited {
                            attempt: state.attempt,
                            credential,
                            cooldown,
                        },
                    );
                    self.policy.switch_pause
                }
                Err(ProviderError::CredentialFatal(reason)) => {
                    self.pool.record_fatal(credential_id, reason).await;
                    drop(lease);

                    state.failed_credentials.insert(credential_id);
                    state.last_error = Some(format!("credential \"{}\": {}", credential, reason));
                    tracing::warn!(
                        request_id = %request_id,
                        credential = %credential,
                        attempt = state.attempt,
                        reason = %reason,
                        "Credential rejected, excluding it for this chunk"
                    );
                    observer.on_event(
                        index,
                        &ChunkEvent::CredentialRejected {
                            attempt: state.attempt,
                            credential,
                            reason,
                        },
                    );
                    self.policy.switch_pause
                }
                Err(error) => {
                    drop(lease);
                    self.transient_failure(
                        &request_id,
                        index,
                        &credential,
                        &mut state,
                        error.to_string(),
                        observer,
                    )
                }
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::select! {
                _ = tokio::time::sleep(pause.min(remaining)) => {}
                _ = cancel.cancelled() => return Err(ChunkError::Cancelled { index }),
            }
        }
    }

    fn transient_failure(
        &self,
        request_id: &str,
        index: usize,
        credential: &str,
        state: &mut RetryState,
        message: String,
        observer: &dyn ChunkObserver,
    ) -> Duration {
        let backoff = self.policy.backoff(state.attempt);
        tracing::warn!(
            request_id = %request_id,
            credential = %credential,
            attempt = state.attempt,
            error = %message,
            backoff_ms = backoff.as_millis() as u64,
            "Chunk request failed, backing off"
        );
        observer.on_event(
            index,
            &ChunkEvent::Failed {
                attempt: state.attempt,
                credential: credential.to_string(),
                message: message.clone(),
                backoff,
            },
        );
        state.last_error = Some(message);
        backoff
    }

    fn deadline_exceeded(&self, request_id: &str, index: usize, state: &RetryState) -> ChunkError {
        self.fail(
            request_id,
            state,
            ChunkError::DeadlineExceeded {
                index,
                attempts: state.attempt,
                limit: self.policy.max_duration,
                last_error: state.last_error(),
            },
        )
    }

    fn fail(&self, request_id: &str, state: &RetryState, error: ChunkError) -> ChunkError {
        tracing::error!(
            request_id = %request_id,
            attempts = state.attempt,
            rate_limited = state.rate_limited,
            failed_credentials = state.failed_credentials.len(),
            elapsed_ms = state.started.elapsed().as_millis() as u64,
            error = %error,
            "Chunk failed"
        );
        error
    }
}
