mod acceptor;
mod service;

pub use acceptor::Acceptor;
pub use service::{Service, READ_ERROR_RESPONSE};

use crate::error::Result;

/// Capabilities a server owner exposes to its per-connection handlers.
///
/// Implementations are selected at construction time and shared across all
/// reactor threads, so they must be safe to call from any of them.
pub trait ServiceCallback: Send + Sync {
    /// Execute a whitelisted, already-trimmed controller command.
    fn execute_command(&self, command: &str) -> Result<()>;

    /// Ingest a sentinel-framed data payload, returning the response body.
    fn on_data_received(&self, payload: &[u8]) -> Result<String>;
}
