use async_trait::async_trait;
use narration_backend::domain::credential::FatalReason;
use narration_backend::domain::synthesis::{Voice, GEMINI_VOICES};
use narration_backend::infrastructure::repositories::{
    pcm_to_wav, ProviderError, SynthesisRequest, SynthesizedAudio, TtsRepository,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Secrets with these prefixes make the provider misbehave
pub const INVALID_SECRET_PREFIX: &str = "invalid-";
pub const LIMITED_SECRET_PREFIX: &str = "limited-";

/// Chunks containing these markers fail or answer slowly
pub const FAILING_MARKER: &str = "UNSPEAKABLE";
pub const SLOW_MARKER: &str = "LEISURELY";

pub const SAMPLE_RATE: u32 = 24_000;

/// Provider scripted by credential secret and chunk text
#[derive(Default)]
pub struct FakeTtsProvider {
    calls: AtomicUsize,
}

impl FakeTtsProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TtsRepository for FakeTtsProvider {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        secret: &str,
    ) -> Result<SynthesizedAudio, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if secret.starts_with(INVALID_SECRET_PREFIX) {
            return Err(ProviderError::CredentialFatal(FatalReason::InvalidKey));
        }
        if secret.starts_with(LIMITED_SECRET_PREFIX) {
            return Err(ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(30)),
            });
        }
        if request.text.contains(FAILING_MARKER) {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "text could not be synthesized".to_string(),
            });
        }

        let delay = if request.text.contains(SLOW_MARKER) {
            Duration::from_millis(800)
        } else {
            Duration::from_millis(20)
        };
        tokio::time::sleep(delay).await;

        // A tenth of a second of a square-ish tone
        let pcm: Vec<u8> = (0..SAMPLE_RATE / 10)
            .flat_map(|i| (if (i / 40) % 2 == 0 { 6000i16 } else { -6000i16 }).to_le_bytes())
            .collect();
        pcm_to_wav(&pcm, SAMPLE_RATE)
    }

    fn model(&self) -> &str {
        "fake-tts"
    }

    fn voices(&self) -> &'static [Voice] {
        GEMINI_VOICES
    }
}
