//! Transcription orchestrator.
//!
//! One run walks through six stages and ends in exactly one terminal
//! message:
//!
//! | stage        | emits                                             |
//! |--------------|---------------------------------------------------|
//! | Validate     | nothing, or `error` if the file is missing        |
//! | Probe        | `progress 5`, then decodes the audio              |
//! | LoadModel    | `progress 10`, loads the model, `progress 20`     |
//! | Transcribe   | `progress` as inference advances                  |
//! | EmitSegments | `progress 90`, one `segment` per result segment   |
//! | Complete     | `progress 100`, `complete`                        |

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use scriptgrab_proto::{Message, ProtocolError};
use tracing::{debug, error, info, trace, warn};

use crate::channel::Emitter;
use crate::config::{Device, ModelSize};
use crate::error::{EXIT_CANCELLED, EXIT_SUCCESS, EngineError};
use crate::progress::ProgressReporter;
use crate::redirect::Segregator;
use crate::transcribe::{DecodeOptions, SpeechBackend};

/// What to transcribe and how.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub audio_path: PathBuf,
    pub model: ModelSize,
    /// `None` lets the backend pick.
    pub device: Option<Device>,
    pub options: DecodeOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Probe,
    LoadModel,
    Transcribe,
    EmitSegments,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Probe => "probe",
            Stage::LoadModel => "load_model",
            Stage::Transcribe => "transcribe",
            Stage::EmitSegments => "emit_segments",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    Complete {
        language: String,
        duration: f64,
        segments: usize,
    },
    Failed {
        stage: Stage,
        error: EngineError,
    },
    Cancelled,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Complete { .. } => EXIT_SUCCESS,
            Outcome::Failed { error, .. } => error.exit_code(),
            Outcome::Cancelled => EXIT_CANCELLED,
        }
    }
}

/// Drives one transcription run against a speech backend.
pub struct Engine<B: SpeechBackend, S: Segregator> {
    backend: B,
    segregator: S,
    emitter: Emitter,
    progress: Arc<Mutex<ProgressReporter>>,
}

impl<B: SpeechBackend, S: Segregator> Engine<B, S> {
    pub fn new(backend: B, segregator: S, emitter: Emitter) -> Self {
        let progress = Arc::new(Mutex::new(ProgressReporter::new(emitter.clone())));
        Self {
            backend,
            segregator,
            emitter,
            progress,
        }
    }

    /// Run every stage and report the outcome on the protocol channel.
    pub fn run(mut self, request: &Request) -> Outcome {
        let mut stage = Stage::Validate;
        match self.drive(request, &mut stage) {
            Ok(outcome) => outcome,
            Err(err) => self.fail(stage, err),
        }
    }

    fn drive(&mut self, request: &Request, stage: &mut Stage) -> Result<Outcome, EngineError> {
        let path = &request.audio_path;
        info!(path = %path.display(), model = %request.model, "Starting transcription");

        *stage = Stage::Validate;
        if !path.exists() {
            return Err(EngineError::InputNotFound(path.display().to_string()));
        }

        *stage = Stage::Probe;
        self.milestone(5, "Loading audio file...")?;
        let audio = {
            let _guard = self.isolate()?;
            self.backend.load_audio(path)
        }
        .map_err(|e| {
            warn!(path = %path.display(), error = %format!("{e:#}"), "Audio decoding failed");
            EngineError::UnreadableAudio
        })?;

        let duration = audio.duration_secs();
        if duration <= 0.0 {
            return Err(EngineError::UnreadableAudio);
        }
        debug!(duration, samples = audio.samples.len(), "Audio loaded");
        self.reporter().set_total(duration);

        *stage = Stage::LoadModel;
        let device = request
            .device
            .unwrap_or_else(|| self.backend.detect_device());
        info!(model = %request.model, device = %device, "Loading model");
        self.milestone(10, &format!("Loading {} model...", request.model))?;
        let mut transcriber = {
            let _guard = self.isolate()?;
            self.backend
                .load_model(request.model, device, &request.options)
        }
        .map_err(EngineError::model_load)?;
        self.milestone(20, "Model loaded, starting transcription...")?;

        *stage = Stage::Transcribe;
        let progress = Arc::clone(&self.progress);
        let on_position = Box::new(move |position: f64| {
            let mut reporter = progress.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = reporter.advance(position) {
                trace!(error = %e, "Dropped progress update");
            }
        });
        let raw = {
            let _guard = self.isolate()?;
            transcriber.transcribe(&audio, &request.options, on_position)
        }
        .map_err(EngineError::inference)?;
        drop(transcriber);

        *stage = Stage::EmitSegments;
        let transcript = raw.normalize();
        self.milestone(90, "Processing segments...")?;
        for segment in &transcript.segments {
            self.emitter.emit(&Message::segment(segment.clone()))?;
        }

        *stage = Stage::Complete;
        self.reporter()
            .finish(Message::complete(transcript.language.as_str(), duration))?;

        info!(
            language = %transcript.language,
            duration,
            segments = transcript.segments.len(),
            "Transcription complete"
        );
        Ok(Outcome::Complete {
            language: transcript.language,
            duration,
            segments: transcript.segments.len(),
        })
    }

    fn fail(&self, stage: Stage, err: EngineError) -> Outcome {
        match err {
            // Only the interrupt handler closes the stream behind our back.
            EngineError::Protocol(ProtocolError::Terminated) => {
                info!(stage = %stage, "Run cancelled");
                return Outcome::Cancelled;
            }
            EngineError::Cancelled => {
                info!(stage = %stage, "Run cancelled");
                if let Err(e) = report_cancellation(&self.emitter) {
                    error!(error = %e, "Failed to report cancellation");
                }
                return Outcome::Cancelled;
            }
            _ => {}
        }

        error!(stage = %stage, error = %err, "Transcription failed");
        match self.emitter.emit(&Message::error(err.to_string())) {
            Ok(()) => {}
            Err(ProtocolError::Terminated) => return Outcome::Cancelled,
            Err(e) => error!(error = %e, "Failed to report error"),
        }
        Outcome::Failed { stage, error: err }
    }

    fn milestone(&self, percent: u8, status: &str) -> Result<(), ProtocolError> {
        self.reporter().stage(percent, status)
    }

    fn reporter(&self) -> std::sync::MutexGuard<'_, ProgressReporter> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn isolate(&self) -> Result<S::Guard, EngineError> {
        self.segregator
            .isolate()
            .context("Failed to redirect stdout")
            .map_err(|e| EngineError::Setup(format!("{e:#}")))
    }
}

/// Emit the cancellation error unless the run already ended.
///
/// Returns `Ok(false)` when a terminal message was already written; the
/// run's own outcome stands in that case.
pub fn report_cancellation(emitter: &Emitter) -> Result<bool, ProtocolError> {
    match emitter.emit(&Message::error(EngineError::Cancelled.to_string())) {
        Ok(()) => Ok(true),
        Err(ProtocolError::Terminated) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
