//! The protocol channel shared by the orchestrator, the progress callback and
//! the interrupt handler.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use scriptgrab_proto::{Message, ProtocolError, ProtocolWriter, parse_line};
use tracing::trace;

type SharedWriter = Arc<Mutex<ProtocolWriter<Box<dyn Write + Send>>>>;

/// Cloneable handle to the one protocol writer of a run.
#[derive(Clone)]
pub struct Emitter {
    writer: SharedWriter,
}

impl Emitter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(ProtocolWriter::new(out))),
        }
    }

    pub fn emit(&self, message: &Message) -> Result<(), ProtocolError> {
        trace!(kind = message.kind(), "emit");
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(message)
    }

    /// Write `messages` back to back; no other emitter can interleave.
    pub fn emit_all(&self, messages: &[Message]) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for message in messages {
            trace!(kind = message.kind(), "emit");
            writer.emit(message)?;
        }
        Ok(())
    }

    /// Whether a terminal message went out on this channel.
    pub fn is_terminated(&self) -> bool {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_terminated()
    }
}

/// In-memory protocol sink for tests.
#[derive(Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// An emitter writing into this sink.
    pub fn emitter(&self) -> Emitter {
        Emitter::new(Box::new(self.clone()))
    }

    /// Raw lines written so far.
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Every line parsed back into a message.
    pub fn messages(&self) -> Result<Vec<Message>, ProtocolError> {
        let mut messages = Vec::new();
        for line in self.lines() {
            if let Some(message) = parse_line(&line)? {
                messages.push(message);
            }
        }
        Ok(messages)
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_one_stream() {
        let sink = MemorySink::new();
        let emitter = sink.emitter();
        let from_callback = emitter.clone();

        emitter.emit(&Message::progress(5, "Loading audio file...")).unwrap();
        from_callback
            .emit(&Message::progress(30, "Transcribing... 30%"))
            .unwrap();
        emitter.emit(&Message::error("boom")).unwrap();

        assert!(from_callback.is_terminated());
        assert!(matches!(
            from_callback.emit(&Message::progress(40, "late")),
            Err(ProtocolError::Terminated)
        ));
        assert_eq!(sink.lines().len(), 3);
        assert_eq!(
            sink.lines()[2],
            r#"{"type":"error","message":"boom"}"#
        );
    }

    #[test]
    fn test_emit_all_stops_at_terminal_message() {
        let sink = MemorySink::new();
        let emitter = sink.emitter();

        let result = emitter.emit_all(&[
            Message::progress(100, "Transcription complete"),
            Message::complete("en", 1.5),
            Message::error("late"),
        ]);

        assert!(matches!(result, Err(ProtocolError::Terminated)));
        assert_eq!(
            sink.messages().unwrap(),
            vec![
                Message::progress(100, "Transcription complete"),
                Message::complete("en", 1.5),
            ]
        );
    }

    #[test]
    fn test_messages_parse_back() {
        let sink = MemorySink::new();
        let emitter = sink.emitter();
        emitter.emit(&Message::complete("en", 1.5)).unwrap();

        assert_eq!(sink.messages().unwrap(), vec![Message::complete("en", 1.5)]);
    }
}
