use memchr::memmem;
use serde::{Deserialize, Serialize};

/// Width of the command field used by the controller protocol.
pub const DEFAULT_COMMAND_LENGTH: usize = 7;

/// Terminator appended to blob transfers.
pub const DEFAULT_TERMINATOR: &str = "The_Cool_Termination_Mark";

/// How the server decides where one request ends on the byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Framing {
    /// A command field of exactly `length` bytes, right-padded with spaces.
    FixedLength { length: usize },

    /// An arbitrary-length payload followed by a fixed terminator string.
    Terminated { terminator: String },
}

impl Default for Framing {
    fn default() -> Self {
        Framing::FixedLength {
            length: DEFAULT_COMMAND_LENGTH,
        }
    }
}

impl Framing {
    pub fn terminated_default() -> Self {
        Framing::Terminated {
            terminator: DEFAULT_TERMINATOR.to_string(),
        }
    }
}

/// Incremental frame scanner over a growing read buffer.
///
/// Bytes arrive in arbitrary chunks; `feed` appends them and `next_frame`
/// yields a complete payload once the framing rule is satisfied. For
/// terminated framing the returned payload excludes the terminator itself.
pub struct FrameReader {
    framing: Framing,
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new(framing: Framing, capacity: usize) -> Self {
        Self {
            framing,
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Feed data into the scanner
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete frame, or None if more bytes are needed
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        match &self.framing {
            Framing::FixedLength { length } => {
                if self.buffer.len() < *length {
                    return None;
                }
                let rest = self.buffer.split_off(*length);
                let frame = std::mem::replace(&mut self.buffer, rest);
                Some(frame)
            }
            Framing::Terminated { terminator } => {
                let pos = memmem::find(&self.buffer, terminator.as_bytes())?;
                let rest = self.buffer.split_off(pos + terminator.len());
                let mut frame = std::mem::replace(&mut self.buffer, rest);
                frame.truncate(pos);
                Some(frame)
            }
        }
    }

    /// Bytes buffered but not yet assembled into a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_length_waits_for_full_field() {
        let mut reader = FrameReader::new(Framing::FixedLength { length: 7 }, 64);
        reader.feed(b"UP  ");
        assert!(reader.next_frame().is_none());
        reader.feed(b"   ");
        assert_eq!(reader.next_frame().unwrap(), b"UP     ");
    }

    #[test]
    fn fixed_length_keeps_excess_bytes() {
        let mut reader = FrameReader::new(Framing::FixedLength { length: 4 }, 64);
        reader.feed(b"LEFTRIGHT");
        assert_eq!(reader.next_frame().unwrap(), b"LEFT");
        assert_eq!(reader.buffered(), 5);
    }

    #[test]
    fn terminated_strips_the_terminator() {
        let mut reader = FrameReader::new(
            Framing::Terminated {
                terminator: "END".to_string(),
            },
            64,
        );
        reader.feed(b"12345@blob");
        assert!(reader.next_frame().is_none());
        reader.feed(b"dataEND");
        assert_eq!(reader.next_frame().unwrap(), b"12345@blobdata");
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn terminator_split_across_feeds() {
        let mut reader = FrameReader::new(
            Framing::Terminated {
                terminator: "MARK".to_string(),
            },
            64,
        );
        reader.feed(b"payloadMA");
        assert!(reader.next_frame().is_none());
        reader.feed(b"RK");
        assert_eq!(reader.next_frame().unwrap(), b"payload");
    }
}
