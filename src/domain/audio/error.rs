/// Orchestration invariant violations and codec failures while building the
/// final artifact. None of these are retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssemblyError {
    #[error("No audio fragments to assemble")]
    NoFragments,

    #[error("Missing audio for chunks {indices:?}")]
    MissingFragments { indices: Vec<usize> },

    #[error("Audio for chunk {index} is empty")]
    EmptyFragment { index: usize },

    #[error("Fragment order broken: slot {position} holds chunk {found}")]
    OutOfOrder { position: usize, found: usize },

    #[error("Failed to decode audio for chunk {index}: {message}")]
    Decode { index: usize, message: String },

    #[error("Sample rate mismatch in chunk {index}: expected {expected} Hz, found {found} Hz")]
    SampleRateMismatch {
        index: usize,
        expected: u32,
        found: u32,
    },

    #[error("Unsupported channel count {channels}")]
    UnsupportedChannels { channels: u16 },

    #[error("Failed to encode final audio: {0}")]
    Encode(String),
}
