pub mod artifact_repository;
pub mod credential_repository;
pub mod elevenlabs_tts_repository;
pub mod gemini_tts_repository;
pub mod tts_repository;

pub use artifact_repository::{Artifact, ArtifactRepository, ARTIFACT_MIME_TYPE};
pub use credential_repository::{CredentialRepository, CredentialStore, InMemoryCredentialStore};
pub use elevenlabs_tts_repository::{mp3_to_wav, ElevenLabsTtsRepository, VoiceSettings};
pub use gemini_tts_repository::{pcm_to_wav, GeminiTtsRepository};
pub use tts_repository::{
    wav_from_samples, ProviderError, SynthesisRequest, SynthesizedAudio, TtsRepository,
};
