//! Line framing for the protocol stream.

use std::io::Write;

use crate::{Message, ProtocolError};

/// Writes one message per line and flushes after each one.
///
/// After a terminal message (`complete` or `error`) every further write is
/// refused with [`ProtocolError::Terminated`], so a run can never produce two
/// terminal messages or trailing output after one.
pub struct ProtocolWriter<W: Write> {
    out: W,
    terminated: bool,
}

impl<W: Write> ProtocolWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            terminated: false,
        }
    }

    /// Encode, write and flush a single message.
    pub fn emit(&mut self, message: &Message) -> Result<(), ProtocolError> {
        if self.terminated {
            return Err(ProtocolError::Terminated);
        }

        let mut line = message.to_line()?.into_bytes();
        line.push(b'\n');

        // The whole line goes out in one write so a concurrent reader never
        // sees half a message.
        self.out.write_all(&line)?;
        self.out.flush()?;

        if message.is_terminal() {
            self.terminated = true;
        }
        Ok(())
    }

    /// Whether a terminal message has been written.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod tests;
