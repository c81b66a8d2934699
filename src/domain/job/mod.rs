pub mod error;
pub mod model;
pub mod scheduler;

pub use error::JobServiceError;
pub use model::{
    ArtifactRef, ChunkAnnotation, ClearCompletedResponse, CreateJobRequest, CreateJobResponse,
    Job, JobLog, JobResponse, JobStatus, LogLevel, MAX_JOB_LOGS,
};
pub use scheduler::{JobScheduler, JobSchedulerApi, SchedulerSettings};
