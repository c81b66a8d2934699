use super::error::JobServiceError;
use super::model::{ArtifactRef, CreateJobRequest, Job, JobResponse, JobStatus, LogLevel};
use crate::domain::audio::{assemble_with_progress, AssemblyStage};
use crate::domain::synthesis::{
    cancellation, clean_text, count_words, resolve_voice, split_text, CancelHandle, Cancellation,
    ChunkEvent, ChunkObserver, ChunkRequest, ChunkRetryEngine, ChunkState,
};
use crate::infrastructure::config::Config;
use crate::infrastructure::repositories::{Artifact, ArtifactRepository};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const MAX_FILENAME_LENGTH: usize = 200;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_concurrent: usize,
    pub chunk_word_limit: usize,
    pub max_text_length: usize,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent: config.max_concurrent_jobs.max(1),
            chunk_word_limit: config.chunk_word_limit,
            max_text_length: config.max_text_length,
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    /// Every known job, in submission order
    jobs: Vec<Job>,
    /// Ids waiting for a processing slot, FIFO
    queue: VecDeque<Uuid>,
    active: usize,
    cancels: HashMap<Uuid, CancelHandle>,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    engine: Arc<ChunkRetryEngine>,
    artifacts: Arc<ArtifactRepository>,
    settings: SchedulerSettings,
}

/// Admitted job handed to a worker task
struct Admission {
    job_id: Uuid,
    chunks: Vec<String>,
    voice: String,
    filename: String,
    signal: Cancellation,
}

impl SchedulerInner {
    fn with_job<R>(&self, job_id: Uuid, apply: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let mut state = self.state.lock();
        state.jobs.iter_mut().find(|job| job.id == job_id).map(apply)
    }

    /// Start queued jobs while processing slots are free
    fn admit(self: &Arc<Self>) {
        let admitted = {
            let mut state = self.state.lock();
            let mut admitted = Vec::new();

            while state.active < self.settings.max_concurrent {
                let Some(job_id) = state.queue.pop_front() else {
                    break;
                };
                let Some(job) = state
                    .jobs
                    .iter_mut()
                    .find(|job| job.id == job_id && job.status == JobStatus::Queued)
                else {
                    continue;
                };

                job.status = JobStatus::Processing;
                job.started_at = Some(Utc::now());
                job.log(LogLevel::Info, "Processing started", None);

                let (handle, signal) = cancellation();
                admitted.push(Admission {
                    job_id,
                    chunks: job.chunks.clone(),
                    voice: job.voice.clone(),
                    filename: job.filename.clone(),
                    signal,
                });
                state.cancels.insert(job_id, handle);
                state.active += 1;
            }

            admitted
        };

        if admitted.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("No async runtime available to start jobs");
            return;
        };
        for admission in admitted {
            runtime.spawn(run_job(self.clone(), admission));
        }
    }

    /// Release the processing slot of a job and admit the next ones
    fn finish(self: &Arc<Self>, job_id: Uuid) {
        {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            state.cancels.remove(&job_id);
            if let Some(job) = state.jobs.iter_mut().find(|job| job.id == job_id) {
                if job.status == JobStatus::Processing {
                    job.fail("Job aborted unexpectedly".to_string());
                }
            }
        }
        self.admit();
    }

    fn fail_job(&self, job_id: Uuid, message: String) {
        tracing::error!(job_id = %job_id, error = %message, "Job failed");
        self.with_job(job_id, |job| job.fail(message));
    }
}

/// Releases the processing slot whatever way the worker ends
struct SlotGuard {
    inner: Arc<SchedulerInner>,
    job_id: Uuid,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.finish(self.job_id);
    }
}

/// Mirrors retry engine transitions into the job's annotations and log
struct JobObserver<'a> {
    inner: &'a SchedulerInner,
    job_id: Uuid,
}

impl ChunkObserver for JobObserver<'_> {
    fn on_event(&self, chunk_index: usize, event: &ChunkEvent) {
        let chunk = Some(chunk_index);
        self.inner.with_job(self.job_id, |job| {
            let Some(annotation) = job.annotations.get_mut(chunk_index) else {
                return;
            };
            annotation.state = event.state();

            let entry = match event {
                ChunkEvent::Waiting {
                    cooling,
                    locked,
                    wake_in,
                } => {
                    if annotation.waiting {
                        None
                    } else {
                        annotation.waiting = true;
                        let message = match wake_in {
                            Some(wait) => format!(
                                "No free credential ({} cooling down, {} in use), retrying in {}s",
                                cooling,
                                locked,
                                wait.as_secs()
                            ),
                            None => format!(
                                "No free credential ({} in use), waiting for one to be released",
                                locked
                            ),
                        };
                        Some((LogLevel::Warning, message))
                    }
                }
                ChunkEvent::Requesting {
                    attempt,
                    credential,
                } => {
                    annotation.waiting = false;
                    annotation.attempts = *attempt;
                    annotation.credential = Some(credential.clone());
                    (*attempt > 1).then(|| {
                        (
                            LogLevel::Info,
                            format!("Attempt {} with credential \"{}\"", attempt, credential),
                        )
                    })
                }
                ChunkEvent::RateLimited {
                    credential,
                    cooldown,
                    ..
                } => {
                    annotation.rate_limits += 1;
                    Some((
                        LogLevel::Warning,
                        format!(
                            "Credential \"{}\" rate limited, cooling down for {}s",
                            credential,
                            cooldown.as_secs()
                        ),
                    ))
                }
                ChunkEvent::CredentialRejected {
                    credential, reason, ..
                } => {
                    annotation.failures += 1;
                    Some((
                        LogLevel::Error,
                        format!("Credential \"{}\" excluded: {}", credential, reason),
                    ))
                }
                ChunkEvent::Failed {
                    attempt,
                    message,
                    backoff,
                    ..
                } => {
                    annotation.failures += 1;
                    Some((
                        LogLevel::Warning,
                        format!(
                            "Attempt {} failed: {}. Retrying in {:.1}s",
                            attempt,
                            message,
                            backoff.as_secs_f64()
                        ),
                    ))
                }
                ChunkEvent::Succeeded {
                    duration_seconds, ..
                } => {
                    annotation.completed = true;
                    annotation.waiting = false;
                    annotation.duration_seconds = Some(*duration_seconds);
                    Some((
                        LogLevel::Success,
                        format!(
                            "Chunk {} ready ({:.1}s of audio)",
                            chunk_index + 1,
                            duration_seconds
                        ),
                    ))
                }
            };

            if let Some((level, message)) = entry {
                job.log(level, message, chunk);
            }
        });
    }
}

async fn run_job(inner: Arc<SchedulerInner>, admission: Admission) {
    let Admission {
        job_id,
        chunks,
        voice,
        filename,
        signal,
    } = admission;
    let _slot = SlotGuard {
        inner: inner.clone(),
        job_id,
    };
    let started = Instant::now();
    let total = chunks.len();

    tracing::info!(job_id = %job_id, chunks = total, voice = %voice, "Job started");

    for (index, text) in chunks.iter().enumerate() {
        if signal.is_cancelled() {
            inner.fail_job(job_id, "Job cancelled".to_string());
            return;
        }

        inner.with_job(job_id, |job| {
            job.current_chunk = Some(index);
            job.log(
                LogLevel::Info,
                format!(
                    "Processing chunk {}/{} ({} words)",
                    index + 1,
                    total,
                    count_words(text)
                ),
                Some(index),
            );
        });

        let observer = JobObserver {
            inner: &inner,
            job_id,
        };
        let request = ChunkRequest {
            job_id,
            index,
            text,
            voice: &voice,
        };

        match inner.engine.process(request, &observer, &signal).await {
            Ok(fragment) => {
                let stored = inner.with_job(job_id, |job| -> Result<(), String> {
                    job.store_fragment(fragment)?;
                    job.progress = Job::chunk_progress(index, total);
                    Ok(())
                });
                if let Some(Err(message)) = stored {
                    inner.fail_job(job_id, message);
                    return;
                }
            }
            Err(error) => {
                if error.is_cancelled() {
                    inner.with_job(job_id, |job| {
                        if let Some(annotation) = job.annotations.get_mut(index) {
                            annotation.state = ChunkState::Pending;
                        }
                    });
                } else {
                    inner.with_job(job_id, |job| {
                        if let Some(annotation) = job.annotations.get_mut(index) {
                            annotation.state = ChunkState::Failed;
                        }
                    });
                }
                inner.fail_job(job_id, error.to_string());
                return;
            }
        }
    }

    if signal.is_cancelled() {
        inner.fail_job(job_id, "Job cancelled".to_string());
        return;
    }

    let Some(fragments) = inner.with_job(job_id, |job| {
        job.current_chunk = None;
        job.progress = 90;
        job.log(LogLevel::Info, "Validating and concatenating audio", None);
        job.fragments.clone()
    }) else {
        return;
    };

    let stage_inner = inner.clone();
    let assembled = tokio::task::spawn_blocking(move || {
        assemble_with_progress(&fragments, |stage| {
            if stage == AssemblyStage::WavEncoded {
                stage_inner.with_job(job_id, |job| {
                    job.progress = 95;
                    job.log(LogLevel::Info, "Converting to MP3", None);
                });
            }
        })
    })
    .await;

    let audio = match assembled {
        Ok(Ok(audio)) => audio,
        Ok(Err(error)) => {
            inner.fail_job(job_id, error.to_string());
            return;
        }
        Err(error) => {
            inner.fail_job(job_id, format!("Audio assembly aborted: {}", error));
            return;
        }
    };

    // Assembly is not interruptible; a cancel that arrived meanwhile still wins
    if signal.is_cancelled() {
        inner.fail_job(job_id, "Job cancelled".to_string());
        return;
    }

    let size_bytes = audio.mp3.len();
    let handle = inner.artifacts.store(audio.mp3, &filename);

    inner.with_job(job_id, |job| {
        job.status = JobStatus::Done;
        job.progress = 100;
        job.finished_at = Some(Utc::now());
        job.artifact = Some(ArtifactRef {
            handle,
            url: format!("/api/artifacts/{}", handle),
            size_bytes,
            duration_seconds: audio.duration_seconds,
        });
        // The artifact supersedes the per-chunk audio
        job.fragments.iter_mut().for_each(|slot| *slot = None);
        job.log(
            LogLevel::Success,
            format!(
                "Audio ready: {:.1}s, {} KB",
                audio.duration_seconds,
                size_bytes / 1024
            ),
            None,
        );
    });

    tracing::info!(
        job_id = %job_id,
        chunks = total,
        duration_seconds = audio.duration_seconds,
        size_bytes,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Job completed"
    );
}

/// Reserved path characters become `-` and runs of whitespace one space
fn sanitize_filename(filename: Option<&str>) -> String {
    let replaced: String = filename
        .unwrap_or_default()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let cleaned: String = replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .collect();
    let cleaned = cleaned.trim_end();

    if cleaned.is_empty() {
        format!("audio_{}", Utc::now().timestamp_millis())
    } else {
        cleaned.to_string()
    }
}

/// Bounded-concurrency job queue driving chunks through the retry engine
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    pub fn new(
        engine: Arc<ChunkRetryEngine>,
        artifacts: Arc<ArtifactRepository>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState::default()),
                engine,
                artifacts,
                settings,
            }),
        }
    }

    /// Resolve the voice and chunk the text of a new job
    fn validate(
        &self,
        request: &CreateJobRequest,
    ) -> Result<(&'static str, Vec<String>), JobServiceError> {
        let voice = resolve_voice(self.inner.engine.provider().voices(), &request.voice)
            .ok_or_else(|| JobServiceError::Invalid(format!("Unknown voice: {}", request.voice)))?;
        if request.text.trim().is_empty() {
            return Err(JobServiceError::Invalid("Text cannot be empty".to_string()));
        }
        let length = request.text.chars().count();
        if length > self.inner.settings.max_text_length {
            return Err(JobServiceError::TooLarge(format!(
                "{} characters, maximum is {}",
                length, self.inner.settings.max_text_length
            )));
        }

        let chunks = split_text(&clean_text(&request.text), self.inner.settings.chunk_word_limit);
        if chunks.is_empty() {
            return Err(JobServiceError::Invalid(
                "Text has no speakable content".to_string(),
            ));
        }
        Ok((voice.id, chunks))
    }
}

#[async_trait]
pub trait JobSchedulerApi: Send + Sync {
    /// Chunk the text, queue the job and start it if a slot is free
    async fn submit(&self, request: CreateJobRequest) -> Result<Uuid, JobServiceError>;

    async fn list(&self) -> Vec<JobResponse>;

    async fn get(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError>;

    /// Delete a job that is not processing and revoke its artifact
    async fn remove(&self, job_id: Uuid) -> Result<(), JobServiceError>;

    /// Stop a queued job at once, or a processing one at its next wait or chunk boundary
    async fn cancel(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError>;

    /// Remove every finished job. Returns how many were removed.
    async fn clear_completed(&self) -> usize;

    async fn artifact(&self, handle: Uuid) -> Result<Artifact, JobServiceError>;
}

#[async_trait]
impl JobSchedulerApi for JobScheduler {
    async fn submit(&self, request: CreateJobRequest) -> Result<Uuid, JobServiceError> {
        let (voice, chunks) = self.validate(&request)?;
        let filename = sanitize_filename(request.filename.as_deref());
        let chunk_count = chunks.len();

        let mut job = Job::new(request.text, voice.to_string(), filename, chunks);
        job.log(
            LogLevel::Info,
            format!("Job queued with {} chunks", chunk_count),
            None,
        );
        let job_id = job.id;

        {
            let mut state = self.inner.state.lock();
            state.jobs.push(job);
            state.queue.push_back(job_id);
        }

        tracing::info!(job_id = %job_id, chunks = chunk_count, "Job submitted");
        self.inner.admit();

        Ok(job_id)
    }

    async fn list(&self) -> Vec<JobResponse> {
        let state = self.inner.state.lock();
        state.jobs.iter().map(JobResponse::from).collect()
    }

    async fn get(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError> {
        self.inner
            .with_job(job_id, |job| JobResponse::from(&*job))
            .ok_or(JobServiceError::NotFound)
    }

    async fn remove(&self, job_id: Uuid) -> Result<(), JobServiceError> {
        let removed = {
            let mut state = self.inner.state.lock();
            let position = state
                .jobs
                .iter()
                .position(|job| job.id == job_id)
                .ok_or(JobServiceError::NotFound)?;

            if state.jobs[position].status == JobStatus::Processing {
                return Err(JobServiceError::Conflict(
                    "Job is processing and cannot be removed".to_string(),
                ));
            }

            state.queue.retain(|id| *id != job_id);
            state.jobs.remove(position)
        };

        if let Some(artifact) = &removed.artifact {
            self.inner.artifacts.revoke(artifact.handle);
        }
        tracing::info!(job_id = %job_id, status = %removed.status, "Job removed");

        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError> {
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or(JobServiceError::NotFound)?;

        match job.status {
            JobStatus::Queued => {
                state.queue.retain(|id| *id != job_id);
                job.fail("Job cancelled".to_string());
                tracing::info!(job_id = %job_id, "Queued job cancelled");
            }
            JobStatus::Processing => {
                if let Some(handle) = state.cancels.get(&job_id) {
                    handle.cancel();
                }
                job.log(LogLevel::Warning, "Cancellation requested", job.current_chunk);
                tracing::info!(job_id = %job_id, "Cancellation requested");
            }
            JobStatus::Done | JobStatus::Error => {
                return Err(JobServiceError::Conflict(format!(
                    "Job already finished with status {}",
                    job.status
                )));
            }
        }

        Ok(JobResponse::from(&*job))
    }

    async fn clear_completed(&self) -> usize {
        let removed: Vec<Job> = {
            let mut state = self.inner.state.lock();
            let (finished, remaining): (Vec<Job>, Vec<Job>) = std::mem::take(&mut state.jobs)
                .into_iter()
                .partition(|job| job.status.is_finished());
            state.jobs = remaining;
            finished
        };

        for job in &removed {
            if let Some(artifact) = &job.artifact {
                self.inner.artifacts.revoke(artifact.handle);
            }
        }

        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "Completed jobs cleared");
        }
        removed.len()
    }

    async fn artifact(&self, handle: Uuid) -> Result<Artifact, JobServiceError> {
        self.inner
            .artifacts
            .get(handle)
            .ok_or(JobServiceError::ArtifactNotFound)
    }
}
