use super::error::AssemblyError;
use crate::domain::synthesis::ChunkFragment;
use bytes::Bytes;
use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};
use std::io::Cursor;

pub const MP3_BITRATE_KBPS: u32 = 128;

/// Samples per channel handed to LAME per call
const ENCODE_BLOCK: usize = 1152;

/// Pipeline checkpoints, reported as they are passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStage {
    Validated,
    Concatenated,
    WavEncoded,
    Mp3Encoded,
}

/// The deliverable built from every fragment of a job
#[derive(Debug, Clone)]
pub struct FinalAudio {
    pub mp3: Bytes,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Planar f32 samples, one vector per channel, all the same length
#[derive(Debug, Clone)]
struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    fn rms(&self) -> f64 {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for channel in &self.channels {
            for &sample in channel {
                sum += (sample as f64) * (sample as f64);
                count += 1;
            }
        }
        if count == 0 {
            return 0.0;
        }
        (sum / count as f64).sqrt()
    }

    /// Scale to `target` RMS, clamping to [-1, 1]. Silence is left untouched.
    fn normalize_to(&mut self, target: f64) {
        let current = self.rms();
        if current == 0.0 {
            return;
        }
        let gain = (target / current) as f32;
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample = (*sample * gain).clamp(-1.0, 1.0);
            }
        }
    }
}

/// Validate, normalize and join the fragments of a job into one MP3
pub fn assemble(fragments: &[Option<ChunkFragment>]) -> Result<FinalAudio, AssemblyError> {
    assemble_with_progress(fragments, |_| {})
}

pub fn assemble_with_progress(
    fragments: &[Option<ChunkFragment>],
    mut on_stage: impl FnMut(AssemblyStage),
) -> Result<FinalAudio, AssemblyError> {
    let ordered = validate_fragments(fragments)?;
    on_stage(AssemblyStage::Validated);

    let mut buffers = Vec::with_capacity(ordered.len());
    for fragment in &ordered {
        buffers.push(decode_fragment(fragment)?);
    }

    let expected_rate = buffers[0].sample_rate;
    if let Some((index, buffer)) = buffers
        .iter()
        .enumerate()
        .find(|(_, buffer)| buffer.sample_rate != expected_rate)
    {
        return Err(AssemblyError::SampleRateMismatch {
            index,
            expected: expected_rate,
            found: buffer.sample_rate,
        });
    }

    let joined = concatenate(buffers);
    on_stage(AssemblyStage::Concatenated);

    let wav = encode_wav(&joined)?;
    on_stage(AssemblyStage::WavEncoded);

    let mp3 = transcode_wav_to_mp3(&wav)?;
    on_stage(AssemblyStage::Mp3Encoded);

    let channels = joined.channels.len() as u16;
    let duration_seconds = joined.frames() as f64 / joined.sample_rate as f64;

    tracing::debug!(
        fragments = ordered.len(),
        duration_seconds,
        wav_bytes = wav.len(),
        mp3_bytes = mp3.len(),
        "Audio assembled"
    );

    Ok(FinalAudio {
        mp3: Bytes::from(mp3),
        duration_seconds,
        sample_rate: joined.sample_rate,
        channels,
    })
}

/// Every slot filled, every payload non-empty, indices contiguous from zero
pub fn validate_fragments(
    fragments: &[Option<ChunkFragment>],
) -> Result<Vec<&ChunkFragment>, AssemblyError> {
    if fragments.is_empty() {
        return Err(AssemblyError::NoFragments);
    }

    let missing: Vec<usize> = fragments
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_none())
        .map(|(index, _)| index)
        .collect();
    if !missing.is_empty() {
        return Err(AssemblyError::MissingFragments { indices: missing });
    }

    let ordered: Vec<&ChunkFragment> = fragments.iter().flatten().collect();

    if let Some(empty) = ordered.iter().find(|fragment| fragment.audio.is_empty()) {
        return Err(AssemblyError::EmptyFragment {
            index: empty.index,
        });
    }

    for (position, fragment) in ordered.iter().enumerate() {
        if fragment.index != position {
            return Err(AssemblyError::OutOfOrder {
                position,
                found: fragment.index,
            });
        }
    }

    Ok(ordered)
}

fn decode_fragment(fragment: &ChunkFragment) -> Result<AudioBuffer, AssemblyError> {
    let index = fragment.index;
    let decode_error = |e: hound::Error| AssemblyError::Decode {
        index,
        message: e.to_string(),
    };

    let mut reader = hound::WavReader::new(Cursor::new(fragment.audio.as_ref())).map_err(decode_error)?;
    let spec = reader.spec();
    let channel_count = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_error)?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(decode_error)?
        }
    };

    if interleaved.is_empty() {
        return Err(AssemblyError::EmptyFragment { index });
    }

    let frames = interleaved.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    Ok(AudioBuffer {
        sample_rate: spec.sample_rate,
        channels,
    })
}

/// Bring every buffer to the mean RMS, then join them in order.
/// Buffers with fewer channels repeat their last channel.
fn concatenate(mut buffers: Vec<AudioBuffer>) -> AudioBuffer {
    let rms_values: Vec<f64> = buffers.iter().map(AudioBuffer::rms).collect();
    let target = rms_values.iter().sum::<f64>() / rms_values.len().max(1) as f64;
    for buffer in &mut buffers {
        buffer.normalize_to(target);
    }

    let sample_rate = buffers.first().map(|b| b.sample_rate).unwrap_or_default();
    let channel_count = buffers.iter().map(|b| b.channels.len()).max().unwrap_or(1);
    let total_frames: usize = buffers.iter().map(AudioBuffer::frames).sum();

    let mut channels = vec![Vec::with_capacity(total_frames); channel_count];
    for buffer in &buffers {
        for (channel_index, channel) in channels.iter_mut().enumerate() {
            let source = channel_index.min(buffer.channels.len() - 1);
            channel.extend_from_slice(&buffer.channels[source]);
        }
    }

    AudioBuffer {
        sample_rate,
        channels,
    }
}

fn to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, AssemblyError> {
    let channels = buffer.channels.len() as u16;
    let spec = hound::WavSpec {
        channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let encode_error = |e: hound::Error| AssemblyError::Encode(e.to_string());
    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.frames() * channels as usize * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encode_error)?;
        for frame in 0..buffer.frames() {
            for channel in &buffer.channels {
                writer.write_sample(to_i16(channel[frame])).map_err(encode_error)?;
            }
        }
        writer.finalize().map_err(encode_error)?;
    }

    Ok(cursor.into_inner())
}

fn transcode_wav_to_mp3(wav: &[u8]) -> Result<Vec<u8>, AssemblyError> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| AssemblyError::Encode(e.to_string()))?;
    let spec = reader.spec();
    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<Result<_, _>>()
        .map_err(|e| AssemblyError::Encode(e.to_string()))?;

    encode_mp3(&samples, spec.channels, spec.sample_rate)
}

/// Constant 128 kbps LAME encoding of interleaved 16-bit PCM
fn encode_mp3(samples: &[i16], channels: u16, sample_rate: u32) -> Result<Vec<u8>, AssemblyError> {
    if !(1..=2).contains(&channels) {
        return Err(AssemblyError::UnsupportedChannels { channels });
    }

    let lame_error = |e: &dyn std::fmt::Debug| AssemblyError::Encode(format!("{:?}", e));

    let mut builder = Builder::new()
        .ok_or_else(|| AssemblyError::Encode("failed to allocate LAME encoder".to_string()))?;
    builder
        .set_num_channels(channels as u8)
        .map_err(|e| lame_error(&e))?;
    builder
        .set_sample_rate(sample_rate)
        .map_err(|e| lame_error(&e))?;
    builder
        .set_brate(Bitrate::Kbps128)
        .map_err(|e| lame_error(&e))?;
    builder
        .set_quality(Quality::Good)
        .map_err(|e| lame_error(&e))?;
    let mut encoder = builder.build().map_err(|e| lame_error(&e))?;

    let block = ENCODE_BLOCK * channels as usize;
    let mut mp3 = Vec::with_capacity(samples.len() / 4 + 7200);

    for pcm in samples.chunks(block) {
        let frames = pcm.len() / channels as usize;
        mp3.reserve(mp3lame_encoder::max_required_buffer_size(frames));
        if channels == 1 {
            encoder.encode_to_vec(MonoPcm(pcm), &mut mp3)
        } else {
            encoder.encode_to_vec(InterleavedPcm(pcm), &mut mp3)
        }
        .map_err(|e| lame_error(&e))?;
    }

    mp3.reserve(7200);
    encoder
        .flush_to_vec::<FlushNoGap>(&mut mp3)
        .map_err(|e| lame_error(&e))?;

    Ok(mp3)
}
