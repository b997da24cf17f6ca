//! Audio file decoding for transcription.
//!
//! Any container/codec symphonia understands is decoded, mixed to mono and
//! resampled to 16kHz, the only rate Whisper and Silero accept.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use audioadapter_buffers::direct::SequentialSliceOfVecs;
use rubato::audioadapter::Adapter;
use rubato::{Fft, FixedSync, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Target sample rate for speech recognition models.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Audio buffer containing mono f32 samples at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new audio buffer.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of the buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Convert multi-channel interleaved samples to mono by averaging all channels.
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resampler for converting audio between sample rates.
pub struct AudioResampler {
    resampler: Fft<f32>,
    input_rate: u32,
    output_rate: u32,
    chunk_size_in: usize,
    chunk_size_out: usize,
}

impl AudioResampler {
    /// Create a new resampler.
    ///
    /// # Arguments
    /// * `input_rate` - Input sample rate in Hz
    /// * `output_rate` - Output sample rate in Hz
    /// * `chunk_size` - Number of input samples per processing chunk
    pub fn new(input_rate: u32, output_rate: u32, chunk_size: usize) -> Result<Self> {
        let resampler = Fft::new(
            input_rate as usize,
            output_rate as usize,
            chunk_size,
            1, // sub_chunks
            1, // channels
            FixedSync::Input,
        )
        .context("Failed to create resampler")?;

        let chunk_size_out = resampler.output_frames_max();

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            chunk_size_in: chunk_size,
            chunk_size_out,
        })
    }

    /// Resample a whole signal of any length.
    ///
    /// The tail is zero-padded and the filter delay removed, so the result is
    /// aligned with the input and exactly `ceil(len * out / in)` long.
    pub fn process_all(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let expected = (input.len() as u64 * u64::from(self.output_rate))
            .div_ceil(u64::from(self.input_rate)) as usize;
        let delay = self.resampler.output_delay();

        let mut output = Vec::with_capacity(expected + delay + self.chunk_size_out);
        let mut chunk = vec![0.0f32; self.chunk_size_in];
        let mut offset = 0;

        while output.len() < expected + delay {
            chunk.fill(0.0);
            if offset < input.len() {
                let end = (offset + self.chunk_size_in).min(input.len());
                chunk[..end - offset].copy_from_slice(&input[offset..end]);
                offset = end;
            }

            let before = output.len();
            self.process_chunk(&chunk, &mut output)?;
            if output.len() == before {
                break;
            }
        }

        output.drain(..delay.min(output.len()));
        output.truncate(expected);
        Ok(output)
    }

    fn process_chunk(&mut self, chunk: &[f32], output: &mut Vec<f32>) -> Result<()> {
        let input_vecs = vec![chunk.to_vec()];
        let input_adapter = SequentialSliceOfVecs::new(&input_vecs, 1, chunk.len())
            .ok()
            .context("Invalid resampler input")?;
        let resampled = self
            .resampler
            .process(&input_adapter, 0, None)
            .context("Resampling failed")?;

        for frame_idx in 0..resampled.frames() {
            output.push(resampled.read_sample(0, frame_idx).unwrap_or(0.0));
        }
        Ok(())
    }
}

/// Decode an audio file into 16kHz mono samples.
///
/// A file without audio yields an empty buffer; deciding whether that is an
/// error is up to the caller.
pub fn decode_file(path: &Path) -> Result<AudioBuffer> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized audio format")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found")?;
    let track_id = track.id;
    let mut source_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported audio codec")?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e).context("Failed to decode audio"),
        };

        let spec = *decoded.spec();
        source_rate.get_or_insert(spec.rate);

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        mono.extend(to_mono(buf.samples(), spec.channels.count() as u16));
    }

    let source_rate = match source_rate {
        Some(rate) if rate > 0 => rate,
        _ => return Ok(AudioBuffer::new(Vec::new(), TARGET_SAMPLE_RATE)),
    };

    debug!(
        path = %path.display(),
        source_rate,
        frames = mono.len(),
        "Audio decoded"
    );

    if source_rate == TARGET_SAMPLE_RATE || mono.is_empty() {
        return Ok(AudioBuffer::new(mono, TARGET_SAMPLE_RATE));
    }

    // 100ms chunks
    let chunk_size = (source_rate as usize / 10).max(1);
    let mut resampler = AudioResampler::new(source_rate, TARGET_SAMPLE_RATE, chunk_size)?;
    let samples = resampler.process_all(&mono)?;

    Ok(AudioBuffer::new(samples, TARGET_SAMPLE_RATE))
}

#[cfg(test)]
#[path = "audio_test.rs"]
mod tests;
