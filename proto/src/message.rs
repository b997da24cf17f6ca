//! Message, segment and word types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ProtocolError;

/// Round a timestamp to millisecond precision.
///
/// The three-decimal rounding is part of the wire format. Non-finite input
/// becomes `0.0`, and so does negative zero.
pub fn round_ms(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Floor a raw percentage and clamp it into `[0, 100]`.
pub fn clamp_percent(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.floor().clamp(0.0, 100.0) as u8
}

fn serialize_ms<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_ms(*value))
}

fn deserialize_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_percent(raw))
}

/// A single recognized word with its timing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Word {
    pub word: String,
    #[serde(serialize_with = "serialize_ms")]
    pub start: f64,
    #[serde(serialize_with = "serialize_ms")]
    pub end: f64,
}

impl Word {
    /// Build a word, trimming its text and rounding its span.
    ///
    /// `end` is raised to `start` when the two are inverted.
    pub fn new(word: &str, start: f64, end: f64) -> Self {
        let start = round_ms(start);
        Self {
            word: word.trim().to_string(),
            start,
            end: round_ms(end).max(start),
        }
    }
}

/// A contiguous span of recognized speech.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Segment {
    pub id: String,
    #[serde(serialize_with = "serialize_ms")]
    pub start: f64,
    #[serde(serialize_with = "serialize_ms")]
    pub end: f64,
    pub text: String,
    pub words: Vec<Word>,
}

impl Segment {
    /// Build the `index`-th segment of a run.
    ///
    /// Text is trimmed, the span is rounded and forced into
    /// `0 <= start <= end`, and words are ordered by start time.
    pub fn new(index: usize, start: f64, end: f64, text: &str, mut words: Vec<Word>) -> Self {
        let start = round_ms(start).max(0.0);
        words.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self {
            id: Self::id_for(index),
            start,
            end: round_ms(end).max(start),
            text: text.trim().to_string(),
            words,
        }
    }

    /// Stable identifier of the `index`-th segment: `seg_0000`, `seg_0001`, ...
    pub fn id_for(index: usize) -> String {
        format!("seg_{index:04}")
    }
}

/// One line of the protocol stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Progress {
        #[serde(default, deserialize_with = "deserialize_percent")]
        percent: u8,
        #[serde(default)]
        status: String,
    },
    Segment {
        #[serde(default)]
        data: Segment,
    },
    Complete {
        #[serde(default)]
        language: String,
        #[serde(default, serialize_with = "serialize_ms")]
        duration: f64,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

impl Message {
    /// Progress update; `percent` is capped at 100.
    pub fn progress(percent: u32, status: impl Into<String>) -> Self {
        Message::Progress {
            percent: percent.min(100) as u8,
            status: status.into(),
        }
    }

    pub fn segment(data: Segment) -> Self {
        Message::Segment { data }
    }

    pub fn complete(language: impl Into<String>, duration: f64) -> Self {
        Message::Complete {
            language: language.into(),
            duration: round_ms(duration),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Message::Error {
            message: message.into(),
        }
    }

    /// Whether this message ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::Complete { .. } | Message::Error { .. })
    }

    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Progress { .. } => "progress",
            Message::Segment { .. } => "segment",
            Message::Complete { .. } => "complete",
            Message::Error { .. } => "error",
        }
    }

    /// Encode as a single JSON line without the trailing newline.
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// Parse one line of the protocol stream.
///
/// Blank lines yield `Ok(None)`; anything else must be a complete message.
pub fn parse_line(line: &str) -> Result<Option<Message>, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(ProtocolError::Malformed)
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
