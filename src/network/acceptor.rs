use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Accepts connections for one reactor thread.
///
/// Every reactor thread holds its own `Acceptor` over a clone of the shared
/// listening socket; whichever thread wins the accept race constructs the
/// connection's handler. After each accepted (or failed) accept the acceptor
/// re-arms itself, until the stop flag is observed; at that point the
/// listener is deregistered and no further accepts are issued.
pub struct Acceptor {
    listener: TcpListener,
    stopped: Arc<AtomicBool>,
    closed: bool,
}

impl Acceptor {
    pub fn new(listener: std::net::TcpListener, stopped: Arc<AtomicBool>) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener: TcpListener::from_std(listener),
            stopped,
            closed: false,
        })
    }

    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.listener, token, Interest::READABLE)
    }

    /// Drain all pending accepts for one readiness event.
    ///
    /// Accept failures are logged and the acceptor stays armed; the next
    /// readiness event retries. Once the stop flag is set the listener is
    /// closed instead and the returned batch is whatever was accepted before
    /// the flag was observed.
    pub fn accept_ready(&mut self, registry: &Registry) -> Vec<(TcpStream, SocketAddr)> {
        let mut accepted = Vec::new();

        loop {
            if self.stopped.load(Ordering::Acquire) {
                self.close(registry);
                break;
            }

            match self.listener.accept() {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {:?}", addr);
                    accepted.push((stream, addr));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    break;
                }
            }
        }

        accepted
    }

    /// Request that no further accepts be issued. Asynchronous: the flag is
    /// observed on the next readiness event, so one more connection may land
    /// after this returns.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn close(&mut self, registry: &Registry) {
        if !self.closed {
            if let Err(e) = registry.deregister(&mut self.listener) {
                debug!("Failed to deregister listener: {}", e);
            }
            self.closed = true;
            info!("Acceptor stopped listening");
        }
    }
}
