use super::tts_repository::{
    wav_from_samples, ProviderError, SynthesisRequest, SynthesizedAudio, TtsRepository,
};
use crate::domain::credential::FatalReason;
use crate::domain::synthesis::{language_for_voice, Voice, GEMINI_VOICES};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Cursor;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Gemini returns 16-bit mono PCM; the sample rate travels in the mime type
const DEFAULT_PCM_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    model: &'a str,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    language_code: &'static str,
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// Gemini `generateContent` speech implementation of TTS repository
pub struct GeminiTtsRepository {
    http_client: reqwest::Client,
    api_base: String,
    model: String,
}

impl GeminiTtsRepository {
    pub fn new(api_base: String, model: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn endpoint(&self, model: &str, secret: &str) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.api_base,
            model,
            urlencoding::encode(secret)
        )
    }

    async fn classify_failure(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let retry_after_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        classify_status(status, retry_after_header, &body)
    }
}

#[async_trait]
impl TtsRepository for GeminiTtsRepository {
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
            "Calling Gemini TTS API"
        );

        let body = GenerateContentRequest {
            model: &request.model,
            contents: vec![Content {
                parts: vec![TextPart {
                    text: &request.text,
                }],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    language_code: language_for_voice(&request.voice),
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: &request.voice,
                        },
                    },
                },
            },
        };

        let response = self
            .http_client
            .post(self.endpoint(&request.model, secret))
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
                "Gemini TTS API call failed"
            );
            return Err(error);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let audio = if content_type.starts_with("audio/wav") || content_type.starts_with("audio/x-wav")
        {
            let data = response
                .bytes()
                .await
                .map_err(|e| ProviderError::Transient(format!("failed to read body: {}", e)))?;
            wav_passthrough(data)?
        } else {
            let payload: GenerateContentResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
            decode_inline_audio(payload)?
        };

        tracing::info!(
            voice = %request.voice,
            audio_size = audio.data.len(),
            duration_seconds = audio.duration_seconds,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Gemini TTS audio received"
        );

        Ok(audio)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn voices(&self) -> &'static [Voice] {
        GEMINI_VOICES
    }
}

/// Map a non-2xx status and its body to a retry decision
fn classify_status(status: u16, retry_after_header: Option<Duration>, body: &str) -> ProviderError {
    let message = error_message(body);

    match status {
        429 => ProviderError::RateLimited {
            retry_after: retry_delay(body).or(retry_after_header),
        },
        402 => ProviderError::CredentialFatal(FatalReason::NoCredits),
        403 => ProviderError::CredentialFatal(FatalReason::Suspended),
        401 => ProviderError::CredentialFatal(FatalReason::InvalidKey),
        400 if message.contains("API key not valid") || message.contains("API_KEY_INVALID") => {
            ProviderError::CredentialFatal(FatalReason::InvalidKey)
        }
        500..=599 => ProviderError::Transient(format!("status {}: {}", status, message)),
        _ => ProviderError::Rejected { status, message },
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(300).collect())
}

/// Extract `error.details[RetryInfo].retryDelay` ("37s") from a 429 body
fn retry_delay(body: &str) -> Option<Duration> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"(\d+)").expect("valid regex"));

    let value: Value = serde_json::from_str(body).ok()?;
    let details = value.pointer("/error/details")?.as_array()?;
    let retry_info = details.iter().find(|detail| {
        detail
            .get("@type")
            .and_then(Value::as_str)
            .is_some_and(|kind| kind.contains("RetryInfo"))
    })?;
    let delay = retry_info.get("retryDelay")?.as_str()?;
    let seconds = digits.captures(delay)?.get(1)?.as_str().parse::<u64>().ok()?;

    Some(Duration::from_secs(seconds))
}

fn decode_inline_audio(payload: GenerateContentResponse) -> Result<SynthesizedAudio, ProviderError> {
    let inline = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.inline_data))
        .ok_or_else(|| ProviderError::MalformedPayload("no audio in response".to_string()))?;

    let raw = STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| ProviderError::MalformedPayload(format!("invalid base64 audio: {}", e)))?;

    if inline.mime_type.starts_with("audio/wav") || inline.mime_type.starts_with("audio/x-wav") {
        return wav_passthrough(Bytes::from(raw));
    }

    pcm_to_wav(&raw, sample_rate_from_mime(&inline.mime_type))
}

fn sample_rate_from_mime(mime_type: &str) -> u32 {
    static RATE: OnceLock<Regex> = OnceLock::new();
    let rate = RATE.get_or_init(|| Regex::new(r"rate=(\d+)").expect("valid regex"));

    rate.captures(mime_type)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(DEFAULT_PCM_SAMPLE_RATE)
}

/// Wrap little-endian 16-bit mono PCM in a WAV container
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<SynthesizedAudio, ProviderError> {
    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|sample| i16::from_le_bytes([sample[0], sample[1]]))
        .collect();
    wav_from_samples(&samples, 1, sample_rate)
}

fn wav_passthrough(data: Bytes) -> Result<SynthesizedAudio, ProviderError> {
    let reader = hound::WavReader::new(Cursor::new(data.as_ref()))
        .map_err(|e| ProviderError::MalformedPayload(format!("invalid WAV: {}", e)))?;
    let spec = reader.spec();
    let duration_seconds = reader.duration() as f64 / spec.sample_rate as f64;

    Ok(SynthesizedAudio {
        data,
        mime_type: "audio/wav".to_string(),
        duration_seconds,
    })
}
