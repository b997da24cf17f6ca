//! Speech-to-text transcription.
//!
//! This module provides trait abstractions for the speech backend and the
//! loaded model, the loosely-typed result they hand back, and its conversion
//! into protocol segments.

use std::path::Path;

use anyhow::Result;
use scriptgrab_proto::{Segment, Word};

use crate::audio::AudioBuffer;
use crate::config::{Device, ModelSize};

mod whisper;

pub use whisper::{WhisperBackend, WhisperTranscriber};

/// Language reported when the model does not name one.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Receives the inference position, in seconds of audio processed.
pub type PositionCallback = Box<dyn FnMut(f64) + Send>;

/// Decoding switches passed to the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOptions {
    /// Language code; `None` detects it.
    pub language: Option<String>,
    /// Transcribe only the speech regions found by Silero VAD.
    pub vad: bool,
    /// Inference threads; `None` leaves the choice to the backend.
    pub threads: Option<u16>,
}

/// Everything the orchestrator needs from a speech stack.
pub trait SpeechBackend: Send {
    /// Decode an audio file into 16kHz mono samples.
    fn load_audio(&mut self, path: &Path) -> Result<AudioBuffer>;

    /// Device used when none was requested.
    fn detect_device(&self) -> Device;

    /// Load (downloading if needed) the model for `size` on `device`.
    fn load_model(
        &mut self,
        size: ModelSize,
        device: Device,
        options: &DecodeOptions,
    ) -> Result<Box<dyn Transcriber>>;
}

/// Speech-to-text transcriber.
///
/// Implementations convert audio samples to timed segments.
pub trait Transcriber: Send {
    /// Transcribe a whole buffer.
    ///
    /// `on_position` is called as inference advances, with the position in
    /// seconds from the start of `audio`.
    fn transcribe(
        &mut self,
        audio: &AudioBuffer,
        options: &DecodeOptions,
        on_position: PositionCallback,
    ) -> Result<RawTranscription>;
}

/// Transcription result as a backend produced it. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTranscription {
    pub language: Option<String>,
    pub segments: Vec<RawSegment>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSegment {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub text: Option<String>,
    pub words: Vec<RawWord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWord {
    pub text: Option<String>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

/// A transcription ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub language: String,
    pub segments: Vec<Segment>,
}

impl RawTranscription {
    /// Fill in defaults, order segments by start time and number them.
    ///
    /// Missing times become `0.0`, missing text `""`, a missing language
    /// `"unknown"`. Segments with equal starts keep the backend's order.
    pub fn normalize(self) -> Transcript {
        let language = self
            .language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        let mut segments: Vec<Segment> = self
            .segments
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let words = raw
                    .words
                    .into_iter()
                    .map(|w| {
                        Word::new(
                            w.text.as_deref().unwrap_or_default(),
                            w.start.unwrap_or_default(),
                            w.end.unwrap_or_default(),
                        )
                    })
                    .collect();
                Segment::new(
                    index,
                    raw.start.unwrap_or_default(),
                    raw.end.unwrap_or_default(),
                    raw.text.as_deref().unwrap_or_default(),
                    words,
                )
            })
            .collect();

        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        for (index, segment) in segments.iter_mut().enumerate() {
            segment.id = Segment::id_for(index);
        }

        Transcript { language, segments }
    }
}
