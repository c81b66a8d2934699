pub mod assembly;
pub mod error;

pub use assembly::{assemble, assemble_with_progress, AssemblyStage, FinalAudio, MP3_BITRATE_KBPS};
pub use error::AssemblyError;
