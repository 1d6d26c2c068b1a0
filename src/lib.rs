//! robolink: asynchronous command-and-data transfer engine for robot
//! controllers.
//!
//! A reactor-driven TCP server accepts framed requests (fixed-width command
//! fields or sentinel-terminated blobs) and answers each with one response
//! line; a cancellable asynchronous client issues such requests keyed by
//! request id; a bounded work-queue/worker-thread pair keeps blocking
//! controller work off reactor threads.
//!
//! # Architecture
//!
//! - mio-based event loop, run identically by every reactor thread
//! - one short-lived protocol handler per accepted connection
//! - client requests driven as connect → write → read chains with
//!   lock-mediated cancellation at every stage boundary
//! - explicit backpressure on work submission; control messages bypass it

/// Cancellable asynchronous request client
pub mod client;

/// Configuration management for the server
pub mod config;

/// The production `ServiceCallback`: drive commands and blob ingestion
pub mod controller;

/// Error types and result aliases
pub mod error;

/// Network layer: acceptor and per-connection handlers
pub mod network;

/// Wire framing and command dispatch
pub mod protocol;

/// Core server implementation
pub mod server;

/// Shared blob container fed by the data callback
pub mod store;

/// Bounded work queue and worker thread
pub mod worker;

pub use client::{AsyncTcpClient, RequestStatus};
pub use config::Config;
pub use controller::Controller;
pub use error::{Error, Result};
pub use network::ServiceCallback;
pub use protocol::Framing;
pub use server::Server;
