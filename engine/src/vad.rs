//! Voice Activity Detection using Silero VAD.
//!
//! Splits a decoded file into speech regions so silent stretches are never
//! sent to Whisper.

use anyhow::{Context, Result};
use ndarray::{Array0, Array2, Array3};
use ort::session::Session;
use ort::value::TensorRef;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, trace};

/// LSTM hidden state size for Silero VAD.
const LSTM_HIDDEN_SIZE: usize = 128;

/// Context size for 16kHz audio (prepended to each chunk).
const CONTEXT_SIZE_16K: usize = 64;

/// Sample rate expected by Silero VAD.
pub const VAD_SAMPLE_RATE: u32 = 16000;

/// Supported chunk sizes for Silero VAD (in samples at 16kHz).
pub const VAD_CHUNK_SIZES: [usize; 3] = [512, 1024, 1536];

/// Default speech probability threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Configuration for speech region detection.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Probability at or above which a chunk counts as speech.
    pub threshold: f32,
    /// Consecutive speech chunks needed to open a region.
    pub min_speech_chunks: usize,
    /// Consecutive silent chunks needed to close a region.
    pub min_silence_chunks: usize,
    /// Chunks of context kept on both sides of every region.
    pub pad_chunks: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        // 512-sample chunks are 32ms: a region ends after ~0.5s of silence
        // and keeps ~130ms of margin.
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_speech_chunks: 2,
            min_silence_chunks: 16,
            pad_chunks: 4,
        }
    }
}

/// Follows speech/silence runs over a sequence of chunk probabilities.
///
/// A region opens at the first chunk of the speech run that reached
/// `min_speech_chunks` and closes at the first chunk of the silence run
/// that reached `min_silence_chunks`.
#[derive(Debug)]
pub struct RegionTracker {
    config: VadConfig,
    speech_run: usize,
    silence_run: usize,
    open: Option<usize>,
    seen: usize,
}

impl RegionTracker {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            speech_run: 0,
            silence_run: 0,
            open: None,
            seen: 0,
        }
    }

    /// Feed the next chunk; returns the chunk range of a region it closed.
    pub fn push(&mut self, probability: f32) -> Option<Range<usize>> {
        let index = self.seen;
        self.seen += 1;

        if probability >= self.config.threshold {
            self.speech_run += 1;
            self.silence_run = 0;
            if self.open.is_none() && self.speech_run >= self.config.min_speech_chunks {
                self.open = Some(self.seen.saturating_sub(self.speech_run));
            }
            return None;
        }

        self.silence_run += 1;
        self.speech_run = 0;
        if self.silence_run < self.config.min_silence_chunks {
            return None;
        }
        let start = self.open.take()?;
        let end = (index + 1).saturating_sub(self.silence_run);
        Some(start..end.max(start))
    }

    /// Whether a region is currently open.
    pub fn in_speech(&self) -> bool {
        self.open.is_some()
    }

    /// Close a region left open by the last chunk.
    pub fn finish(self) -> Option<Range<usize>> {
        self.open.map(|start| start..self.seen)
    }
}

/// Turn per-chunk speech probabilities into sample ranges.
///
/// Regions are padded, clamped to `total_len` and merged where they touch.
/// Speech still open at the end runs to `total_len`.
pub fn speech_regions_from_probabilities(
    probabilities: &[f32],
    chunk_size: usize,
    total_len: usize,
    config: &VadConfig,
) -> Vec<Range<usize>> {
    let mut tracker = RegionTracker::new(config.clone());
    let mut regions: Vec<Range<usize>> = probabilities
        .iter()
        .filter_map(|&p| tracker.push(p))
        .map(|chunks| chunks.start * chunk_size..chunks.end * chunk_size)
        .collect();
    if let Some(chunks) = tracker.finish() {
        regions.push(chunks.start * chunk_size..total_len);
    }

    pad_and_merge(regions, config.pad_chunks * chunk_size, total_len)
}

fn pad_and_merge(regions: Vec<Range<usize>>, pad: usize, total_len: usize) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::new();
    for region in regions {
        let start = region.start.saturating_sub(pad).min(total_len);
        let end = (region.end + pad).min(total_len);
        if start >= end {
            continue;
        }
        match merged.last_mut() {
            Some(last) if start <= last.end => last.end = last.end.max(end),
            _ => merged.push(start..end),
        }
    }
    merged
}

/// Silero ONNX session plus the recurrent state carried between chunks.
struct SileroModel {
    session: Session,
    /// LSTM state, shape (2, 1, 128).
    state: Array3<f32>,
    /// Tail of the previous chunk, prepended to the next one.
    context: Vec<f32>,
}

impl SileroModel {
    fn load(path: &Path) -> Result<Self> {
        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .with_intra_threads(1)
            .context("Failed to set intra threads")?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load VAD model from {}", path.display()))?;

        Ok(Self {
            session,
            state: Array3::zeros((2, 1, LSTM_HIDDEN_SIZE)),
            context: vec![0.0; CONTEXT_SIZE_16K],
        })
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
        self.context.fill(0.0);
    }

    /// Speech probability of one chunk.
    fn infer(&mut self, chunk: &[f32]) -> Result<f32> {
        let mut input = Vec::with_capacity(CONTEXT_SIZE_16K + chunk.len());
        input.extend_from_slice(&self.context);
        input.extend_from_slice(chunk);

        let audio = Array2::from_shape_vec((1, input.len()), input)
            .context("Failed to create audio array")?;
        let sample_rate = Array0::from_elem((), i64::from(VAD_SAMPLE_RATE));

        let outputs = self
            .session
            .run(ort::inputs![
                "input" => TensorRef::from_array_view(&audio)?,
                "sr" => TensorRef::from_array_view(&sample_rate)?,
                "state" => TensorRef::from_array_view(&self.state)?
            ])
            .context("VAD inference failed")?;

        let (_, probability) = outputs["output"]
            .try_extract_tensor::<f32>()
            .context("Failed to extract output tensor")?;
        let probability = probability.first().copied().unwrap_or(0.0);

        let (_, state) = outputs["stateN"]
            .try_extract_tensor::<f32>()
            .context("Failed to extract state tensor")?;
        self.state = Array3::from_shape_vec((2, 1, LSTM_HIDDEN_SIZE), state.to_vec())
            .context("Failed to reshape state")?;
        self.context
            .copy_from_slice(&chunk[chunk.len() - CONTEXT_SIZE_16K..]);

        Ok(probability)
    }
}

/// Finds speech regions in 16kHz mono audio.
pub struct VoiceActivityDetector {
    model: SileroModel,
    config: VadConfig,
    chunk_size: usize,
}

impl VoiceActivityDetector {
    /// Load the Silero VAD model with 512-sample chunks.
    pub fn new(model_path: impl AsRef<Path>, config: VadConfig) -> Result<Self> {
        Self::with_chunk_size(model_path, config, VAD_CHUNK_SIZES[0])
    }

    /// Load the model with a specific chunk size (one of [`VAD_CHUNK_SIZES`]).
    pub fn with_chunk_size(
        model_path: impl AsRef<Path>,
        config: VadConfig,
        chunk_size: usize,
    ) -> Result<Self> {
        if !VAD_CHUNK_SIZES.contains(&chunk_size) {
            anyhow::bail!("Invalid chunk size {chunk_size}. Must be one of {VAD_CHUNK_SIZES:?}");
        }

        let path = model_path.as_ref();
        debug!(path = %path.display(), chunk_size, "Loading VAD model");
        Ok(Self {
            model: SileroModel::load(path)?,
            config,
            chunk_size,
        })
    }

    /// Speech probability of every chunk of `samples`; the tail is zero-padded.
    pub fn probabilities(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        self.reset();

        let mut probabilities = Vec::with_capacity(samples.len().div_ceil(self.chunk_size));
        let mut tail = vec![0.0f32; self.chunk_size];
        for chunk in samples.chunks(self.chunk_size) {
            let probability = if chunk.len() == self.chunk_size {
                self.model.infer(chunk)?
            } else {
                tail[..chunk.len()].copy_from_slice(chunk);
                self.model.infer(&tail)?
            };
            probabilities.push(probability);
        }

        trace!(chunks = probabilities.len(), "VAD pass complete");
        Ok(probabilities)
    }

    /// Sample ranges of `samples` that contain speech.
    pub fn speech_regions(&mut self, samples: &[f32]) -> Result<Vec<Range<usize>>> {
        let probabilities = self.probabilities(samples)?;
        let regions = speech_regions_from_probabilities(
            &probabilities,
            self.chunk_size,
            samples.len(),
            &self.config,
        );

        debug!(
            regions = regions.len(),
            speech_samples = regions.iter().map(|r| r.len()).sum::<usize>(),
            total_samples = samples.len(),
            "Speech regions detected"
        );
        Ok(regions)
    }

    /// Forget the recurrent state of the previous pass.
    pub fn reset(&mut self) {
        self.model.reset();
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[cfg(test)]
#[path = "vad_test.rs"]
mod tests;
