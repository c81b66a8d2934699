pub mod cancellation;
pub mod chunker;
pub mod error;
pub mod retry;
pub mod voice;

pub use cancellation::{cancellation, CancelHandle, Cancellation};
pub use chunker::{clean_text, count_words, split_text, DEFAULT_CHUNK_WORD_LIMIT};
pub use error::ChunkError;
pub use retry::{
    ChunkEvent, ChunkFragment, ChunkObserver, ChunkRequest, ChunkRetryEngine, ChunkState,
    NoopObserver, RetryPolicy,
};
pub use voice::{
    find_voice, language_for_voice, resolve_voice, Voice, VoiceCategory, ELEVENLABS_VOICES,
    GEMINI_VOICES,
};
