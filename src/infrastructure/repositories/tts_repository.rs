use crate::domain::credential::FatalReason;
use crate::domain::synthesis::Voice;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;
use std::time::Duration;

/// One synthesis call: a single chunk of text spoken by one voice
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub model: String,
}

/// Audio returned by the provider, already wrapped as WAV
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub data: Bytes,
    pub mime_type: String,
    pub duration_seconds: f64,
}

/// Provider failures, classified by what the caller should do about them
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The credential hit a quota window; try again after the delay
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// The credential will not work again until revalidated
    #[error("credential rejected: {0}")]
    CredentialFatal(FatalReason),

    /// The request itself was refused (bad voice, text rejected, ...)
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// 5xx, timeouts and network errors
    #[error("provider unavailable: {0}")]
    Transient(String),

    /// 2xx with a body that carries no usable audio
    #[error("malformed provider response: {0}")]
    MalformedPayload(String),
}

/// Repository for TTS synthesis operations.
/// Abstracts the underlying TTS provider.
///
/// Implementations must:
/// - Authenticate every call with the secret they are handed, never their own
/// - Classify failures into [`ProviderError`] so retry decisions stay out of
///   the transport layer
/// - Return WAV audio regardless of the provider's native format
#[async_trait]
pub trait TtsRepository: Send + Sync {
    /// Synthesize one chunk of text with the given credential secret
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        secret: &str,
    ) -> Result<SynthesizedAudio, ProviderError>;

    /// Default model identifier, part of the fragment cache key
    fn model(&self) -> &str;

    /// Voices this provider accepts
    fn voices(&self) -> &'static [Voice];
}

/// Encode interleaved 16-bit samples as a WAV payload
pub fn wav_from_samples(
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
) -> Result<SynthesizedAudio, ProviderError> {
    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(ProviderError::MalformedPayload("empty audio payload".to_string()));
    }

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let invalid = |e: hound::Error| ProviderError::MalformedPayload(e.to_string());

    let mut cursor = Cursor::new(Vec::with_capacity(samples.len() * 2 + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(invalid)?;
        for &sample in samples {
            writer.write_sample(sample).map_err(invalid)?;
        }
        writer.finalize().map_err(invalid)?;
    }

    let frames = samples.len() / channels as usize;
    Ok(SynthesizedAudio {
        data: Bytes::from(cursor.into_inner()),
        mime_type: "audio/wav".to_string(),
        duration_seconds: frames as f64 / sample_rate as f64,
    })
}
