//! Ordering rules of a single run's message stream.

use crate::Message;

/// A message that breaks the ordering rules of a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Violation {
    #[error("progress went backwards: {previous}% -> {current}%")]
    ProgressRegressed { previous: u8, current: u8 },

    /// Only `complete` may follow a 100% progress update.
    #[error("{kind} message after 100% progress")]
    AfterFullProgress { kind: &'static str },

    #[error("segment {id} starts at {start}s, before the previous segment ({previous}s)")]
    SegmentOutOfOrder { id: String, start: f64, previous: f64 },

    #[error("segment {id} has an invalid span {start}s..{end}s")]
    InvalidSpan { id: String, start: f64, end: f64 },

    #[error("words of segment {id} are not in chronological order")]
    WordsOutOfOrder { id: String },

    #[error("{kind} message after the terminal {terminal} message")]
    AfterTerminal {
        kind: &'static str,
        terminal: &'static str,
    },

    #[error("stream ended without a complete or error message")]
    Unterminated,
}

/// Incrementally checks a message stream.
#[derive(Debug, Default)]
pub struct StreamValidator {
    last_percent: Option<u8>,
    last_segment_start: Option<f64>,
    terminal: Option<&'static str>,
}

impl StreamValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the next message of the stream.
    pub fn observe(&mut self, message: &Message) -> Result<(), Violation> {
        if let Some(terminal) = self.terminal {
            return Err(Violation::AfterTerminal {
                kind: message.kind(),
                terminal,
            });
        }

        if self.last_percent == Some(100) && !matches!(message, Message::Complete { .. }) {
            return Err(Violation::AfterFullProgress {
                kind: message.kind(),
            });
        }

        match message {
            Message::Progress { percent, .. } => {
                if let Some(previous) = self.last_percent {
                    if *percent < previous {
                        return Err(Violation::ProgressRegressed {
                            previous,
                            current: *percent,
                        });
                    }
                }
                self.last_percent = Some(*percent);
            }
            Message::Segment { data } => {
                if !(0.0 <= data.start && data.start <= data.end) {
                    return Err(Violation::InvalidSpan {
                        id: data.id.clone(),
                        start: data.start,
                        end: data.end,
                    });
                }
                if let Some(previous) = self.last_segment_start {
                    if data.start < previous {
                        return Err(Violation::SegmentOutOfOrder {
                            id: data.id.clone(),
                            start: data.start,
                            previous,
                        });
                    }
                }
                if data.words.windows(2).any(|pair| pair[1].start < pair[0].start) {
                    return Err(Violation::WordsOutOfOrder {
                        id: data.id.clone(),
                    });
                }
                self.last_segment_start = Some(data.start);
            }
            Message::Complete { .. } | Message::Error { .. } => {
                self.terminal = Some(message.kind());
            }
        }

        Ok(())
    }

    /// Check that the stream ended properly.
    pub fn finish(&self) -> Result<(), Violation> {
        match self.terminal {
            Some(_) => Ok(()),
            None => Err(Violation::Unterminated),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
