pub mod audio;
pub mod credential;
pub mod job;
pub mod synthesis;
