//! Progress reporting for a single run.

use scriptgrab_proto::{Message, ProtocolError};

use crate::channel::Emitter;

/// Highest percent reachable before the run completes.
const MAX_RUNNING_PERCENT: f64 = 99.0;

/// Turns inference positions and stage milestones into `progress` messages.
///
/// Percent values never go backwards: a position that maps to the last
/// emitted percent or lower is swallowed, and a milestone below it is raised
/// to it.
pub struct ProgressReporter {
    emitter: Emitter,
    total_duration: f64,
    last_emitted: u8,
}

impl ProgressReporter {
    pub fn new(emitter: Emitter) -> Self {
        Self {
            emitter,
            total_duration: 0.0,
            last_emitted: 0,
        }
    }

    /// Audio duration in seconds that positions are measured against.
    pub fn set_total(&mut self, total_duration: f64) {
        self.total_duration = total_duration;
    }

    pub fn last_emitted(&self) -> u8 {
        self.last_emitted
    }

    /// Report how far inference has got, in seconds of audio.
    pub fn advance(&mut self, position: f64) -> Result<(), ProtocolError> {
        if self.total_duration <= 0.0 || !position.is_finite() {
            return Ok(());
        }

        let percent = (position / self.total_duration * 100.0)
            .floor()
            .clamp(0.0, MAX_RUNNING_PERCENT) as u8;
        if percent <= self.last_emitted {
            return Ok(());
        }

        self.send(percent, format!("Transcribing... {percent}%"))
    }

    /// Report an orchestrator milestone.
    pub fn stage(&mut self, percent: u8, status: &str) -> Result<(), ProtocolError> {
        let percent = percent.max(self.last_emitted);
        self.send(percent, status.to_string())
    }

    /// The 100% update followed by `complete`, written as one unit so an
    /// interrupt cannot land between them.
    pub fn finish(&mut self, complete: Message) -> Result<(), ProtocolError> {
        self.emitter
            .emit_all(&[Message::progress(100, "Transcription complete"), complete])?;
        self.last_emitted = 100;
        Ok(())
    }

    fn send(&mut self, percent: u8, status: String) -> Result<(), ProtocolError> {
        self.emitter
            .emit(&Message::progress(u32::from(percent), status))?;
        self.last_emitted = percent;
        Ok(())
    }
}
