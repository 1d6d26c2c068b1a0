use crate::config::Config;
use crate::error::Result;
use crate::network::{Acceptor, Service, ServiceCallback};
use crate::protocol::CommandSet;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

/// Reactor-driven command-and-data transfer server
pub struct Server {
    config: Config,
    callback: Arc<dyn ServiceCallback>,
    shutdown: Arc<AtomicBool>,
    active_connections: AtomicUsize,
}

impl Server {
    /// Create a new server with the given configuration and owner callback
    pub fn new(config: Config, callback: Arc<dyn ServiceCallback>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            callback,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: AtomicUsize::new(0),
        })
    }

    /// Run the server, spawning reactor threads
    ///
    /// This method blocks until the server is shut down.
    pub fn run(self: Arc<Self>) -> Result<()> {
        let listener =
            TcpListener::bind(format!("{}:{}", self.config.bind_addr, self.config.port))?;
        self.run_on(listener)
    }

    /// Run on an already-bound listener. Lets embedders (and tests) bind an
    /// ephemeral port themselves.
    pub fn run_on(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let threads = self.config.effective_threads();

        info!(
            "Server listening on {} with {} reactor threads",
            listener.local_addr()?,
            threads
        );

        let mut handles = Vec::new();

        for thread_id in 0..threads {
            let server = Arc::clone(&self);
            let listener = listener.try_clone()?;

            let handle = thread::Builder::new()
                .name(format!("reactor-{}", thread_id))
                .spawn(move || {
                    if let Err(e) = server.run_worker(thread_id, listener) {
                        error!("Reactor {} failed: {}", thread_id, e);
                    }
                })?;
            handles.push(handle);
        }

        // Wait for all reactors to finish
        for handle in handles {
            let _ = handle.join();
        }

        Ok(())
    }

    /// Signal the server to shut down gracefully. Asynchronous: reactor
    /// threads observe the flag on their next poll tick, and one last
    /// connection may still be accepted before the acceptor closes.
    pub fn shutdown(&self) {
        info!("Initiating server shutdown");
        self.shutdown.store(true, Ordering::Release);
    }

    /// Get the number of connections currently being handled
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    fn run_worker(self: &Arc<Self>, thread_id: usize, listener: TcpListener) -> Result<()> {
        use mio::net::TcpStream;
        use mio::{Events, Interest, Poll, Token};
        use std::collections::HashMap;
        use std::io::{ErrorKind, Read, Write};
        use std::time::Duration;

        const LISTENER: Token = Token(0);

        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(1024);

        let mut acceptor = Acceptor::new(listener, Arc::clone(&self.shutdown))?;
        acceptor.register(poll.registry(), LISTENER)?;

        let commands = CommandSet::new(self.config.supported_commands.clone());

        // One protocol handler per live connection
        let mut connections: HashMap<Token, (TcpStream, Service)> = HashMap::new();
        let mut next_token = 1usize;

        info!("Reactor {} started", thread_id);

        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(e) = poll.poll(&mut events, Some(Duration::from_millis(100))) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => {
                        for (mut stream, addr) in acceptor.accept_ready(poll.registry()) {
                            if let Err(e) = stream.set_nodelay(self.config.tcp_nodelay) {
                                debug!("Failed to set nodelay for {:?}: {}", addr, e);
                            }

                            let token = Token(next_token);
                            next_token += 1;

                            poll.registry().register(
                                &mut stream,
                                token,
                                Interest::READABLE,
                            )?;

                            let service = Service::new(
                                self.config.framing.clone(),
                                self.config.connection_buffer_size,
                            );

                            connections.insert(token, (stream, service));
                            self.active_connections.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    token => {
                        let should_close = if let Some((stream, service)) =
                            connections.get_mut(&token)
                        {
                            let mut should_close = false;

                            if event.is_readable() && !service.is_finished() {
                                let mut buffer = vec![0u8; 8192];

                                match stream.read(&mut buffer) {
                                    Ok(0) => {
                                        // Peer closed before a full frame
                                        service.on_read_error();
                                    }
                                    Ok(n) => {
                                        service.on_data(
                                            &buffer[..n],
                                            &commands,
                                            self.callback.as_ref(),
                                        );
                                    }
                                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                                    Err(e) => {
                                        if e.kind() != ErrorKind::ConnectionReset {
                                            error!("Error reading: {}", e);
                                        }
                                        service.on_read_error();
                                    }
                                }
                            }

                            // Flush whatever response is staged
                            let mut would_block = false;
                            while let Some(response_data) = service.pending_writes() {
                                let response_len = response_data.len();
                                match stream.write(response_data) {
                                    Ok(n) => {
                                        service.consume_writes(n);
                                        if n < response_len {
                                            would_block = true;
                                            break;
                                        }
                                    }
                                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                                        would_block = true;
                                        break;
                                    }
                                    Err(e) => {
                                        // Write errors are logged, never retried
                                        error!("Error writing: {}", e);
                                        should_close = true;
                                        break;
                                    }
                                }
                            }

                            if service.is_finished() && service.is_flushed() {
                                should_close = true;
                            } else if service.is_finished() && would_block {
                                // Response staged but the socket is full;
                                // finish the flush on the next writable event.
                                poll.registry().reregister(
                                    stream,
                                    token,
                                    Interest::WRITABLE,
                                )?;
                            }

                            should_close
                        } else {
                            false
                        };

                        if should_close {
                            if let Some((mut stream, _service)) = connections.remove(&token) {
                                let _ = poll.registry().deregister(&mut stream);
                                self.active_connections.fetch_sub(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
            }
        }

        // Cleanup: handlers for connections still open at shutdown are
        // released without completing their exchange.
        for (_, (mut stream, _service)) in connections {
            let _ = poll.registry().deregister(&mut stream);
            self.active_connections.fetch_sub(1, Ordering::Relaxed);
        }

        info!("Reactor {} shutting down", thread_id);
        Ok(())
    }
}
