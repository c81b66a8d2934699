use super::tts_repository::{
    wav_from_samples, ProviderError, SynthesisRequest, SynthesizedAudio, TtsRepository,
};
use crate::domain::credential::FatalReason;
use crate::domain::synthesis::{Voice, ELEVENLABS_VOICES};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::io::Cursor;
use std::time::{Duration, Instant};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::default::formats::MpaReader;

const OUTPUT_FORMAT: &str = "mp3_44100_128";

#[derive(Debug, Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.75,
            similarity_boost: 0.75,
        }
    }
}

/// ElevenLabs text-to-speech implementation of TTS repository
pub struct ElevenLabsTtsRepository {
    http_client: reqwest::Client,
    api_base: String,
    model: String,
    voice_settings: VoiceSettings,
}

impl ElevenLabsTtsRepository {
    pub fn new(
        api_base: String,
        model: String,
        voice_settings: VoiceSettings,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            voice_settings,
        })
    }

    fn endpoint(&self, voice_id: &str) -> String {
        format!(
            "{}/{}?output_format={}",
            self.api_base,
            urlencoding::encode(voice_id),
            OUTPUT_FORMAT
        )
    }

    async fn classify_failure(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        classify_status(status, retry_after, &body)
    }
}

#[async_trait]
impl TtsRepository for ElevenLabsTtsRepository {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        secret: &str,
    ) -> Result<SynthesizedAudio, ProviderError> {
        let start_time = Instant::now();

        tracing::debug!(
            model = %request.model,
            voice = %request.voice,
            text_length = request.text.len(),
            "Calling ElevenLabs TTS API"
        );

        let body = TextToSpeechRequest {
            text: &request.text,
            model_id: &request.model,
            voice_settings: self.voice_settings,
        };

        let response = self
            .http_client
            .post(self.endpoint(&request.voice))
            .header("xi-api-key", secret)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Transient(format!("request timed out: {}", e))
                } else {
                    ProviderError::Transient(format!("request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let error = Self::classify_failure(response).await;
            tracing::warn!(
                error = %error,
                voice = %request.voice,
                "ElevenLabs TTS API call failed"
            );
            return Err(error);
        }

        let mp3 = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transient(format!("failed to read body: {}", e)))?;
        if mp3.is_empty() {
            return Err(ProviderError::MalformedPayload(
                "empty audio payload".to_string(),
            ));
        }

        let mp3_size = mp3.len();
        let audio = tokio::task::spawn_blocking(move || mp3_to_wav(mp3))
            .await
            .map_err(|e| ProviderError::MalformedPayload(format!("MP3 decode aborted: {}", e)))??;

        tracing::info!(
            voice = %request.voice,
            mp3_size,
            audio_size = audio.data.len(),
            duration_seconds = audio.duration_seconds,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "ElevenLabs TTS audio received"
        );

        Ok(audio)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn voices(&self) -> &'static [Voice] {
        ELEVENLABS_VOICES
    }
}

/// Map a non-2xx status and its body to a retry decision.
///
/// ElevenLabs reports an exhausted character quota as 401 `quota_exceeded`,
/// which must not be mistaken for a bad key.
fn classify_status(status: u16, retry_after: Option<Duration>, body: &str) -> ProviderError {
    let (detail_status, message) = error_detail(body);

    match (status, detail_status.as_deref()) {
        (429, _) => ProviderError::RateLimited { retry_after },
        (401, Some("quota_exceeded")) | (402, _) => {
            ProviderError::CredentialFatal(FatalReason::NoCredits)
        }
        (401, _) => ProviderError::CredentialFatal(FatalReason::InvalidKey),
        (403, _) => ProviderError::CredentialFatal(FatalReason::Suspended),
        (500..=599, _) => ProviderError::Transient(format!("status {}: {}", status, message)),
        _ => ProviderError::Rejected { status, message },
    }
}

/// `detail` is an object with `status`/`message`, a plain string, or a list
/// of validation errors
fn error_detail(body: &str) -> (Option<String>, String) {
    let fallback = || body.chars().take(300).collect::<String>();
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (None, fallback());
    };

    match value.get("detail") {
        Some(Value::Object(detail)) => (
            detail.get("status").and_then(Value::as_str).map(str::to_string),
            detail
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(fallback),
        ),
        Some(Value::String(message)) => (None, message.clone()),
        Some(Value::Array(errors)) => {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|error| error.get("msg").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                (None, fallback())
            } else {
                (None, messages.join("; "))
            }
        }
        _ => (None, fallback()),
    }
}

/// Decode an MP3 payload to interleaved 16-bit PCM and wrap it as WAV
pub fn mp3_to_wav(data: Bytes) -> Result<SynthesizedAudio, ProviderError> {
    let malformed = |e: SymphoniaError| ProviderError::MalformedPayload(format!("invalid MP3: {}", e));

    let source = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());
    let mut format = MpaReader::try_new(source, &FormatOptions::default()).map_err(malformed)?;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ProviderError::MalformedPayload("no audio track in MP3".to_string()))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(malformed)?;

    let mut samples: Vec<i16> = Vec::new();
    let mut channels = 0u16;
    let mut sample_rate = 0u32;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(malformed(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(reason, "Skipping undecodable MP3 frame");
                continue;
            }
            Err(e) => return Err(malformed(e)),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count() as u16;
        sample_rate = spec.rate;

        let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    wav_from_samples(&samples, channels, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mp3lame_encoder::{Builder, FlushNoGap, MonoPcm};

    fn sine_mp3(seconds: f32, sample_rate: u32) -> Vec<u8> {
        let mut builder = Builder::new().unwrap();
        builder.set_num_channels(1).unwrap();
        builder.set_sample_rate(sample_rate).unwrap();
        builder.set_brate(mp3lame_encoder::Bitrate::Kbps64).unwrap();
        let mut encoder = builder.build().unwrap();

        let frames = (seconds * sample_rate as f32) as usize;
        let pcm: Vec<i16> = (0..frames)
            .map(|i| ((i as f32 * 0.06).sin() * 8000.0) as i16)
            .collect();

        let mut mp3 = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(frames));
        encoder.encode_to_vec(MonoPcm(&pcm), &mut mp3).unwrap();
        mp3.reserve(7200);
        encoder.flush_to_vec::<FlushNoGap>(&mut mp3).unwrap();
        mp3
    }

    #[test]
    fn test_quota_exceeded_is_no_credits_not_invalid_key() {
        let body = r#"{"detail": {"status": "quota_exceeded", "message": "This request exceeds your quota of 10000."}}"#;
        assert!(matches!(
            classify_status(401, None, body),
            ProviderError::CredentialFatal(FatalReason::NoCredits)
        ));

        let body = r#"{"detail": {"status": "invalid_api_key", "message": "Invalid API key"}}"#;
        assert!(matches!(
            classify_status(401, None, body),
            ProviderError::CredentialFatal(FatalReason::InvalidKey)
        ));
    }

    #[test]
    fn test_credential_fatal_statuses() {
        assert!(matches!(
            classify_status(402, None, ""),
            ProviderError::CredentialFatal(FatalReason::NoCredits)
        ));
        assert!(matches!(
            classify_status(403, None, r#"{"detail": {"status": "detected_unusual_activity"}}"#),
            ProviderError::CredentialFatal(FatalReason::Suspended)
        ));
        assert!(matches!(
            classify_status(401, None, "unauthorized"),
            ProviderError::CredentialFatal(FatalReason::InvalidKey)
        ));
    }

    #[test]
    fn test_rate_limit_uses_retry_after_header() {
        let body = r#"{"detail": {"status": "too_many_concurrent_requests", "message": "Too many"}}"#;
        match classify_status(429, Some(Duration::from_secs(12)), body) {
            ProviderError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(12)))
            }
            other => panic!("unexpected classification: {:?}", other),
        }
        assert!(matches!(
            classify_status(429, None, ""),
            ProviderError::RateLimited { retry_after: None }
        ));
    }

    #[test]
    fn test_server_errors_are_transient_and_other_4xx_rejected() {
        assert!(matches!(
            classify_status(502, None, "bad gateway"),
            ProviderError::Transient(_)
        ));

        let body = r#"{"detail": {"status": "voice_not_found", "message": "A voice with the voice_id abc was not found."}}"#;
        match classify_status(404, None, body) {
            ProviderError::Rejected { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "A voice with the voice_id abc was not found.");
            }
            other => panic!("unexpected classification: {:?}", other),
        }

        let body = r#"{"detail": [{"loc": ["body", "text"], "msg": "field required"}]}"#;
        match classify_status(422, None, body) {
            ProviderError::Rejected { message, .. } => assert_eq!(message, "field required"),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_mp3_is_decoded_to_wav() {
        let mp3 = sine_mp3(1.0, 24_000);
        let audio = mp3_to_wav(Bytes::from(mp3)).unwrap();

        assert_eq!(audio.mime_type, "audio/wav");
        // Encoder delay and padding add a few frames
        assert!(
            (audio.duration_seconds - 1.0).abs() < 0.2,
            "duration {}",
            audio.duration_seconds
        );

        let reader = hound::WavReader::new(Cursor::new(audio.data.as_ref())).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().channels, 1);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result = mp3_to_wav(Bytes::from_static(b"definitely not audio"));
        assert!(matches!(result, Err(ProviderError::MalformedPayload(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let body = TextToSpeechRequest {
            text: "Hello.",
            model_id: "eleven_multilingual_v2",
            voice_settings: VoiceSettings::default(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "text": "Hello.",
                "model_id": "eleven_multilingual_v2",
                "voice_settings": {"stability": 0.75, "similarity_boost": 0.75}
            })
        );
    }
}
