//! Whisper transcription backend.
//!
//! Uses whisper.cpp via whisper-rs for speech-to-text.

use super::{
    DecodeOptions, PositionCallback, RawSegment, RawTranscription, RawWord, SpeechBackend,
    Transcriber,
};
use crate::audio::{self, AudioBuffer, TARGET_SAMPLE_RATE};
use crate::config::{Device, ModelSize};
use crate::models::{ModelId, ModelManager};
use crate::vad::{VadConfig, VoiceActivityDetector};
use anyhow::{Context, Result};
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tracing::{debug, info};
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

/// whisper.cpp timestamps are in centiseconds.
const TICKS_PER_SECOND: f64 = 100.0;

/// Production speech stack: symphonia decoding, cached GGML models, whisper.cpp.
pub struct WhisperBackend {
    models: ModelManager,
    runtime: Handle,
}

impl WhisperBackend {
    /// `runtime` drives model downloads; calls must come from outside it
    /// (e.g. a `spawn_blocking` thread).
    pub fn new(models: ModelManager, runtime: Handle) -> Self {
        Self { models, runtime }
    }
}

impl SpeechBackend for WhisperBackend {
    fn load_audio(&mut self, path: &Path) -> Result<AudioBuffer> {
        audio::decode_file(path)
    }

    fn detect_device(&self) -> Device {
        Device::detect()
    }

    fn load_model(
        &mut self,
        size: ModelSize,
        device: Device,
        options: &DecodeOptions,
    ) -> Result<Box<dyn Transcriber>> {
        let model_path = self
            .runtime
            .block_on(self.models.ensure_model(ModelId::for_size(size)))
            .with_context(|| format!("Failed to fetch {size} model"))?;

        let vad = if options.vad {
            let vad_path = self
                .runtime
                .block_on(self.models.ensure_model(ModelId::SileroVad))
                .context("Failed to fetch VAD model")?;
            Some(VoiceActivityDetector::new(vad_path, VadConfig::default())?)
        } else {
            None
        };

        let transcriber = WhisperTranscriber::new(&model_path, device, vad)?;
        Ok(Box::new(transcriber))
    }
}

/// Whisper context parameters for a device.
fn context_params(device: Device) -> Result<WhisperContextParameters<'static>> {
    let mut params = WhisperContextParameters::default();
    match device {
        Device::Cpu => {
            params.use_gpu(false);
        }
        Device::Cuda => {
            if !cfg!(feature = "cuda") {
                anyhow::bail!("CUDA requested but this engine was built without CUDA support");
            }
            params.use_gpu(true);
        }
    }
    Ok(params)
}

/// Whisper speech-to-text transcriber.
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    vad: Option<VoiceActivityDetector>,
}

impl WhisperTranscriber {
    /// Load a Whisper model.
    ///
    /// # Arguments
    /// * `model_path` - Path to the Whisper GGML model file
    /// * `device` - Where inference runs
    /// * `vad` - Detector used when decoding asks for speech regions only
    pub fn new(
        model_path: impl AsRef<Path>,
        device: Device,
        vad: Option<VoiceActivityDetector>,
    ) -> Result<Self> {
        info!(
            path = %model_path.as_ref().display(),
            device = %device,
            "Loading Whisper model"
        );

        let params = context_params(device)?;
        let ctx = WhisperContext::new_with_params(
            model_path.as_ref().to_str().context("Invalid model path")?,
            params,
        )
        .context("Failed to load Whisper model")?;

        info!("Whisper model loaded successfully");

        Ok(Self { ctx, vad })
    }

    fn regions(
        &mut self,
        audio: &AudioBuffer,
        options: &DecodeOptions,
    ) -> Result<Vec<Range<usize>>> {
        match (&mut self.vad, options.vad) {
            (Some(vad), true) => vad.speech_regions(&audio.samples),
            _ => Ok(vec![0..audio.samples.len()]),
        }
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(
        &mut self,
        audio: &AudioBuffer,
        options: &DecodeOptions,
        on_position: PositionCallback,
    ) -> Result<RawTranscription> {
        debug!(
            samples = audio.samples.len(),
            duration_secs = audio.duration_secs(),
            "Transcribing audio with Whisper"
        );

        if audio.sample_rate != TARGET_SAMPLE_RATE {
            anyhow::bail!(
                "Whisper expects 16kHz audio, got {}Hz. Resample before calling transcribe.",
                audio.sample_rate
            );
        }

        let regions = self.regions(audio, options)?;
        let on_position = Arc::new(Mutex::new(on_position));
        let rate = f64::from(audio.sample_rate);

        let mut result = RawTranscription {
            language: options.language.clone(),
            segments: Vec::new(),
        };

        for region in regions {
            let offset = region.start as f64 / rate;
            let span = region.len() as f64 / rate;

            let mut params = full_params(options);
            let callback = Arc::clone(&on_position);
            params.set_progress_callback_safe(move |percent: i32| {
                let position = offset + span * f64::from(percent.clamp(0, 100)) / 100.0;
                let mut report = callback.lock().unwrap_or_else(PoisonError::into_inner);
                (*report)(position);
            });

            let mut state = self
                .ctx
                .create_state()
                .context("Failed to create Whisper state")?;
            state
                .full(params, &audio.samples[region.clone()])
                .context("Whisper inference failed")?;

            if result.language.is_none() {
                result.language = detected_language(&state);
            }
            result.segments.extend(read_segments(&state, offset));
        }

        debug!(
            segments = result.segments.len(),
            language = ?result.language,
            "Transcription complete"
        );
        Ok(result)
    }
}

fn full_params(options: &DecodeOptions) -> FullParams<'_, '_> {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

    // "auto" asks whisper.cpp to detect the language
    params.set_language(Some(options.language.as_deref().unwrap_or("auto")));
    params.set_token_timestamps(true);

    // Disable printing to stdout
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    if let Some(threads) = options.threads {
        params.set_n_threads(i32::from(threads));
    }
    params
}

fn detected_language(state: &WhisperState) -> Option<String> {
    whisper_rs::get_lang_str(state.full_lang_id_from_state()).map(str::to_string)
}

fn read_segments(state: &WhisperState, offset: f64) -> Vec<RawSegment> {
    let mut segments = Vec::new();
    for i in 0..state.full_n_segments() {
        let Some(segment) = state.get_segment(i) else {
            continue;
        };

        let mut pieces = Vec::new();
        for t in 0..segment.n_tokens() {
            let Some(token) = segment.get_token(t) else {
                continue;
            };
            let Ok(bytes) = token.to_bytes() else {
                continue;
            };
            let data = token.token_data();
            pieces.push(TokenPiece {
                bytes: bytes.to_vec(),
                start: offset + data.t0 as f64 / TICKS_PER_SECOND,
                end: offset + data.t1 as f64 / TICKS_PER_SECOND,
            });
        }

        segments.push(RawSegment {
            start: Some(offset + segment.start_timestamp() as f64 / TICKS_PER_SECOND),
            end: Some(offset + segment.end_timestamp() as f64 / TICKS_PER_SECOND),
            text: segment.to_str_lossy().ok().map(|t| t.into_owned()),
            words: group_words(pieces),
        });
    }
    segments
}

/// One token's raw bytes and its timing, in seconds.
///
/// A token may hold only part of a multibyte character, so text is decoded
/// per word rather than per token.
#[derive(Debug, Clone, PartialEq)]
struct TokenPiece {
    bytes: Vec<u8>,
    start: f64,
    end: f64,
}

fn is_special(bytes: &[u8]) -> bool {
    bytes.starts_with(b"[_") || bytes.starts_with(b"<|")
}

/// Merge subword tokens into words.
///
/// A token starting with whitespace opens a new word; any other token
/// (including punctuation) extends the current one.
fn group_words(pieces: Vec<TokenPiece>) -> Vec<RawWord> {
    let mut open: Vec<(Vec<u8>, f64, f64)> = Vec::new();
    for piece in pieces {
        if piece.bytes.is_empty() || is_special(&piece.bytes) {
            continue;
        }

        let opens_word = piece.bytes[0].is_ascii_whitespace();
        match open.last_mut() {
            Some((bytes, _, end)) if !opens_word => {
                bytes.extend_from_slice(&piece.bytes);
                *end = piece.end;
            }
            _ => open.push((piece.bytes, piece.start, piece.end)),
        }
    }

    open.into_iter()
        .map(|(bytes, start, end)| RawWord {
            text: Some(String::from_utf8_lossy(&bytes).into_owned()),
            start: Some(start),
            end: Some(end),
        })
        .collect()
}
