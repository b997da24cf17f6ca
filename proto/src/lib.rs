//! Wire protocol between the transcription sidecar and its host.
//!
//! Every message is a single JSON object on its own line, written to the
//! sidecar's stdout and flushed immediately:
//!
//! ```text
//! {"type":"progress","percent":42,"status":"Transcribing... 42%"}
//! {"type":"segment","data":{"id":"seg_0000","start":0.0,"end":1.23,"text":"...","words":[...]}}
//! {"type":"complete","language":"en","duration":12.345}
//! {"type":"error","message":"..."}
//! ```
//!
//! A run ends with exactly one `complete` or `error` message.

mod message;
mod validate;
mod writer;

pub use message::{Message, Segment, Word, clamp_percent, parse_line, round_ms};
pub use validate::{StreamValidator, Violation};
pub use writer::ProtocolWriter;

/// Errors raised while encoding, writing or parsing protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A terminal message was already written; the stream is closed.
    #[error("protocol stream already terminated")]
    Terminated,

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// A line that is not a valid protocol message.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("protocol stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}
