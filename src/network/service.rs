use crate::network::ServiceCallback;
use crate::protocol::{trim_command, CommandSet, FrameReader, Framing};
use tracing::error;

/// Fixed line reported to the client when the read side fails mid-request.
pub const READ_ERROR_RESPONSE: &str = "Error reading CMD\n";

/// Fixed line reported when the owner's data callback fails.
pub const PROCESSING_ERROR_RESPONSE: &str = "PROCESSING FAILED\n";

/// Per-connection protocol handler.
///
/// A short-lived state machine: read one framed request, hand the payload to
/// the owner's callback, write the response line back, finish. The owning
/// event loop drops the handler once its response is flushed (or its
/// connection fails), so no handler outlives its exchange.
pub struct Service {
    framing: Framing,
    reader: FrameReader,

    // Consolidated write buffer, drained by the event loop
    write_buffer: Vec<u8>,
    write_position: usize,

    finished: bool,
}

impl Service {
    pub fn new(framing: Framing, buffer_size: usize) -> Self {
        Self {
            reader: FrameReader::new(framing.clone(), buffer_size),
            framing,
            write_buffer: Vec::with_capacity(256),
            write_position: 0,
            finished: false,
        }
    }

    /// Feed freshly read bytes. Once a complete frame is assembled it is
    /// dispatched and the response is staged for writing.
    pub fn on_data(&mut self, data: &[u8], commands: &CommandSet, callback: &dyn ServiceCallback) {
        if self.finished {
            return;
        }

        self.reader.feed(data);
        if let Some(frame) = self.reader.next_frame() {
            let response = self.dispatch(&frame, commands, callback);
            self.write_buffer.extend_from_slice(response.as_bytes());
            self.finished = true;
        }
    }

    /// Record a transport error on the read side. The client gets a fixed
    /// error line and the connection is torn down once it is flushed.
    pub fn on_read_error(&mut self) {
        if !self.finished {
            self.write_buffer
                .extend_from_slice(READ_ERROR_RESPONSE.as_bytes());
            self.finished = true;
        }
    }

    /// True once a response has been staged; nothing further will be read
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True once every staged byte has been handed to the socket
    pub fn is_flushed(&self) -> bool {
        self.write_position >= self.write_buffer.len()
    }

    /// Get pending write data as a single buffer slice
    pub fn pending_writes(&self) -> Option<&[u8]> {
        if self.write_position < self.write_buffer.len() {
            Some(&self.write_buffer[self.write_position..])
        } else {
            None
        }
    }

    /// Mark bytes as written
    pub fn consume_writes(&mut self, n: usize) {
        self.write_position += n;
    }

    fn dispatch(
        &self,
        frame: &[u8],
        commands: &CommandSet,
        callback: &dyn ServiceCallback,
    ) -> String {
        match self.framing {
            Framing::FixedLength { .. } => {
                let raw = String::from_utf8_lossy(frame);
                self.process_command(&raw, commands, callback)
            }
            Framing::Terminated { .. } => match callback.on_data_received(frame) {
                Ok(mut body) => {
                    if !body.ends_with('\n') {
                        body.push('\n');
                    }
                    body
                }
                Err(e) => {
                    // Caught here so a failing callback cannot take a
                    // reactor thread down with it.
                    error!("Error processing data payload: {}", e);
                    PROCESSING_ERROR_RESPONSE.to_string()
                }
            },
        }
    }

    /// Check the padded command field against the whitelist and execute it.
    /// The response line always echoes the raw field as received.
    fn process_command(
        &self,
        raw: &str,
        commands: &CommandSet,
        callback: &dyn ServiceCallback,
    ) -> String {
        let trimmed = trim_command(raw);

        if !commands.is_supported(trimmed) {
            return format!("{} NOT SUPPORTED\n", raw);
        }

        match callback.execute_command(trimmed) {
            Ok(()) => format!("{} EXECUTED\n", raw),
            Err(e) => {
                error!("Error executing command '{}': {}", trimmed, e);
                format!("{} FAILED\n", raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};

    struct StubCallback {
        fail_commands: bool,
    }

    impl ServiceCallback for StubCallback {
        fn execute_command(&self, command: &str) -> Result<()> {
            if self.fail_commands {
                Err(Error::CommandFailed {
                    command: command.to_string(),
                    reason: "robot offline".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn on_data_received(&self, payload: &[u8]) -> Result<String> {
            if self.fail_commands {
                Err(Error::Protocol("bad payload".to_string()))
            } else {
                assert!(!payload.is_empty());
                Ok("Response sent ".to_string())
            }
        }
    }

    fn fixed_service() -> Service {
        Service::new(Framing::FixedLength { length: 7 }, 1024)
    }

    #[test]
    fn supported_command_is_executed() {
        let mut service = fixed_service();
        let callback = StubCallback {
            fail_commands: false,
        };
        service.on_data(b"UP     ", &CommandSet::default(), &callback);
        assert!(service.is_finished());
        assert_eq!(service.pending_writes().unwrap(), b"UP      EXECUTED\n");
    }

    #[test]
    fn unknown_command_is_rejected_without_teardown() {
        let mut service = fixed_service();
        let callback = StubCallback {
            fail_commands: false,
        };
        service.on_data(b"FOO    ", &CommandSet::default(), &callback);
        assert_eq!(
            service.pending_writes().unwrap(),
            b"FOO     NOT SUPPORTED\n"
        );
    }

    #[test]
    fn failing_callback_reports_failure_line() {
        let mut service = fixed_service();
        let callback = StubCallback {
            fail_commands: true,
        };
        service.on_data(b"DOWN   ", &CommandSet::default(), &callback);
        assert_eq!(service.pending_writes().unwrap(), b"DOWN    FAILED\n");
    }

    #[test]
    fn partial_frame_stays_unfinished() {
        let mut service = fixed_service();
        let callback = StubCallback {
            fail_commands: false,
        };
        service.on_data(b"UP", &CommandSet::default(), &callback);
        assert!(!service.is_finished());
        service.on_data(b"     ", &CommandSet::default(), &callback);
        assert!(service.is_finished());
    }

    #[test]
    fn sentinel_payload_goes_to_data_callback() {
        let mut service = Service::new(
            Framing::Terminated {
                terminator: "END".to_string(),
            },
            1024,
        );
        let callback = StubCallback {
            fail_commands: false,
        };
        service.on_data(b"1234@blobEND", &CommandSet::default(), &callback);
        assert_eq!(service.pending_writes().unwrap(), b"Response sent \n");
    }

    #[test]
    fn read_error_stages_fixed_line() {
        let mut service = fixed_service();
        service.on_read_error();
        assert!(service.is_finished());
        assert_eq!(
            service.pending_writes().unwrap(),
            READ_ERROR_RESPONSE.as_bytes()
        );
        service.consume_writes(READ_ERROR_RESPONSE.len());
        assert!(service.is_flushed());
    }
}
