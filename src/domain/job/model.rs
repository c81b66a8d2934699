use crate::domain::synthesis::{ChunkFragment, ChunkState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Only the most recent entries are kept per job
pub const MAX_JOB_LOGS: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
}

/// Per-chunk progress as seen by clients
#[derive(Debug, Clone, Serialize)]
pub struct ChunkAnnotation {
    pub state: ChunkState,
    pub attempts: u32,
    pub failures: u32,
    pub rate_limits: u32,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip)]
    pub waiting: bool,
}

impl Default for ChunkAnnotation {
    fn default() -> Self {
        Self {
            state: ChunkState::Pending,
            attempts: 0,
            failures: 0,
            rate_limits: 0,
            completed: false,
            credential: None,
            duration_seconds: None,
            waiting: false,
        }
    }
}

/// Downloadable result of a finished job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub handle: Uuid,
    pub url: String,
    pub size_bytes: usize,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub text: String,
    pub voice: String,
    pub filename: String,
    pub chunks: Vec<String>,
    pub fragments: Vec<Option<ChunkFragment>>,
    pub annotations: Vec<ChunkAnnotation>,
    pub status: JobStatus,
    pub progress: u8,
    pub logs: VecDeque<JobLog>,
    pub current_chunk: Option<usize>,
    pub error: Option<String>,
    pub artifact: Option<ArtifactRef>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(text: String, voice: String, filename: String, chunks: Vec<String>) -> Self {
        let count = chunks.len();
        Self {
            id: Uuid::new_v4(),
            text,
            voice,
            filename,
            fragments: vec![None; count],
            annotations: vec![ChunkAnnotation::default(); count],
            chunks,
            status: JobStatus::Queued,
            progress: 0,
            logs: VecDeque::new(),
            current_chunk: None,
            error: None,
            artifact: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, chunk_index: Option<usize>) {
        self.logs.push_back(JobLog {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            chunk_index,
        });
        while self.logs.len() > MAX_JOB_LOGS {
            self.logs.pop_front();
        }
    }

    /// Fill a fragment slot. A filled slot is never overwritten.
    pub fn store_fragment(&mut self, fragment: ChunkFragment) -> Result<(), String> {
        let index = fragment.index;
        match self.fragments.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(fragment);
                Ok(())
            }
            Some(_) => Err(format!("Fragment for chunk {} already stored", index)),
            None => Err(format!(
                "Fragment index {} out of range for {} chunks",
                index,
                self.chunks.len()
            )),
        }
    }

    /// Progress once chunk `index` has completed, out of the 90% reserved for synthesis
    pub fn chunk_progress(index: usize, total: usize) -> u8 {
        if total == 0 {
            return 0;
        }
        (((index + 1) * 90) / total).min(90) as u8
    }

    pub fn fail(&mut self, message: String) {
        self.status = JobStatus::Error;
        self.error = Some(message.clone());
        self.current_chunk = None;
        self.finished_at = Some(Utc::now());
        // Partial fragments are never exposed
        self.fragments.iter_mut().for_each(|slot| *slot = None);
        self.log(LogLevel::Error, message, None);
    }
}

/// Request to create a new job
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub text: String,
    pub voice: String,
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearCompletedResponse {
    pub removed: usize,
}

/// Read-only view of a job
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub voice: String,
    pub filename: String,
    pub text_length: usize,
    pub chunk_count: usize,
    pub completed_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_chunk: Option<usize>,
    pub chunks: Vec<ChunkAnnotation>,
    pub logs: Vec<JobLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            voice: job.voice.clone(),
            filename: job.filename.clone(),
            text_length: job.text.chars().count(),
            chunk_count: job.chunks.len(),
            completed_chunks: job.annotations.iter().filter(|a| a.completed).count(),
            current_chunk: job.current_chunk,
            chunks: job.annotations.clone(),
            logs: job.logs.iter().cloned().collect(),
            error: job.error.clone(),
            artifact: job.artifact.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}
