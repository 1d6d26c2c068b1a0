use crate::error::{Error, Result};
use crate::network::ServiceCallback;
use crate::store::BlobStore;
use crate::worker::{WorkItem, WorkerThread};
use bytes::Bytes;
use memchr::memchr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How long a reactor thread will wait for queue capacity before refusing
/// a command outright.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Robot drive state. Mutated exclusively through queued work items, which
/// the worker drains one at a time, so it needs no locking of its own.
#[derive(Debug, Default)]
pub struct DriveState {
    x: i64,
    y: i64,
    moves: u64,
}

impl DriveState {
    fn apply(&mut self, command: &str) -> bool {
        match command {
            "UP" => self.y += 1,
            "DOWN" => self.y -= 1,
            "LEFT" => self.x -= 1,
            "RIGHT" => self.x += 1,
            _ => return false,
        }
        self.moves += 1;
        true
    }
}

/// Production server callback.
///
/// Drive commands are executed against `DriveState` on a dedicated worker
/// thread, since the robot API blocks and reactor threads must not; the
/// calling handler waits on the work item for a bounded time. Blob payloads
/// are parsed and filed into the shared store.
pub struct Controller {
    worker: WorkerThread<DriveState>,
    store: BlobStore,
    command_timeout: Duration,
}

impl Controller {
    pub fn new(queue_capacity: usize, command_timeout: Duration) -> Result<Self> {
        let worker = WorkerThread::spawn("controller-worker", DriveState::default(), queue_capacity)?;

        Ok(Self {
            worker,
            store: BlobStore::new(),
            command_timeout,
        })
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    pub fn queued_commands(&self) -> usize {
        self.worker.queue_len()
    }

    /// Snapshot of the drive state `(x, y, moves)`, taken on the worker
    /// thread behind any commands already queued.
    pub fn telemetry(&self) -> Option<(i64, i64, u64)> {
        let (tx, rx) = std::sync::mpsc::channel();
        let item = WorkItem::new(move |state: &mut DriveState| {
            tx.send((state.x, state.y, state.moves)).is_ok()
        });

        if !self.worker.submit(item, Some(SUBMIT_TIMEOUT)) {
            return None;
        }
        rx.recv_timeout(self.command_timeout).ok()
    }
}

impl ServiceCallback for Controller {
    fn execute_command(&self, command: &str) -> Result<()> {
        let cmd = command.to_string();
        let item = WorkItem::new(move |state: &mut DriveState| state.apply(&cmd));

        // Ordinary work takes the backpressure path: a saturated queue
        // refuses the command instead of growing without bound.
        if !self.worker.submit(Arc::clone(&item), Some(SUBMIT_TIMEOUT)) {
            return Err(Error::CommandFailed {
                command: command.to_string(),
                reason: "work queue is full".to_string(),
            });
        }

        if item.wait(Some(self.command_timeout)) {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: command.to_string(),
                reason: "execution timed out or was rejected".to_string(),
            })
        }
    }

    fn on_data_received(&self, payload: &[u8]) -> Result<String> {
        // Payload layout: "<timestamp-key>@<blob>", where anything after a
        // newline in the blob section is trailing metadata, not blob data.
        let at = memchr(b'@', payload)
            .ok_or_else(|| Error::Protocol("payload missing '@' key separator".to_string()))?;
        let key = std::str::from_utf8(&payload[..at])
            .map_err(|_| Error::Protocol("payload key is not valid UTF-8".to_string()))?;

        let rest = &payload[at + 1..];
        let blob_end = memchr(b'\n', rest).unwrap_or(rest.len());

        self.store
            .insert(key.to_string(), Bytes::copy_from_slice(&rest[..blob_end]));
        debug!("Stored blob {} ({} bytes)", key, blob_end);

        Ok("Response sent ".to_string())
    }
}
