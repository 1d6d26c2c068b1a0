mod session;

pub use session::{RequestCallback, RequestStatus, Session};

use crate::error::{Error, Result};
use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use memchr::memchr;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

const WAKER: Token = Token(0);

enum ReactorCommand {
    Start(Arc<Session>),
    Cancel(u64),
    Shutdown,
}

#[derive(Clone, Copy)]
enum Stage {
    Connecting,
    Writing { written: usize },
    Reading,
}

/// Reactor-side state of one request: the session plus everything only the
/// reactor thread touches.
struct ActiveRequest {
    session: Arc<Session>,
    stream: TcpStream,
    stage: Stage,
    response: Vec<u8>,
    error: Option<io::Error>,
}

type SessionMap = Arc<Mutex<HashMap<u64, Arc<Session>>>>;

/// Asynchronous request client with mid-flight cancellation.
///
/// Requests are keyed by a caller-supplied id, driven by a dedicated reactor
/// thread through an async connect → write → read chain, and always resolve
/// with exactly one completion callback: success, transport failure, or
/// aborted after `cancel_request`.
pub struct AsyncTcpClient {
    sessions: SessionMap,
    commands: Sender<ReactorCommand>,
    waker: Arc<Waker>,
    reactor: Option<JoinHandle<()>>,
}

impl AsyncTcpClient {
    pub fn new() -> Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let (commands, receiver) = unbounded();
        let sessions: SessionMap = Arc::new(Mutex::new(HashMap::new()));

        let reactor = thread::Builder::new().name("client-reactor".to_string()).spawn({
            let sessions = Arc::clone(&sessions);
            move || run_reactor(poll, receiver, sessions)
        })?;

        Ok(Self {
            sessions,
            commands,
            waker,
            reactor: Some(reactor),
        })
    }

    /// Issue an asynchronous request.
    ///
    /// The request id must not already be in flight; reusing a live id is a
    /// caller bug and is refused rather than silently overwriting the
    /// existing session. Ids may be reused after their request completes.
    pub fn send_request(
        &self,
        payload: impl Into<Bytes>,
        endpoint: SocketAddr,
        callback: RequestCallback,
        request_id: u64,
    ) -> Result<()> {
        let session = Session::new(request_id, endpoint, payload.into(), callback);

        {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(&request_id) {
                return Err(Error::DuplicateRequestId(request_id));
            }
            sessions.insert(request_id, Arc::clone(&session));
        }

        if self.commands.send(ReactorCommand::Start(session)).is_err() {
            self.sessions.lock().remove(&request_id);
            return Err(Error::Shutdown);
        }
        self.waker.wake()?;

        Ok(())
    }

    /// Cancel an in-flight request.
    ///
    /// Sets the session's cancellation flag under its lock and cancels the
    /// pending transport operation; completion then follows the normal path
    /// with an `Aborted` status. Returns false if the id is not in flight
    /// (never issued, or already completed).
    pub fn cancel_request(&self, request_id: u64) -> bool {
        let session = self.sessions.lock().get(&request_id).cloned();
        let Some(session) = session else {
            debug!("Cancel requested for unknown request id {}", request_id);
            return false;
        };

        session.mark_cancelled();

        if self.commands.send(ReactorCommand::Cancel(request_id)).is_ok() {
            let _ = self.waker.wake();
        }

        debug!("Request {} cancelled", request_id);
        true
    }

    /// Number of requests currently in flight
    pub fn pending_requests(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_in_flight(&self, request_id: u64) -> bool {
        self.sessions.lock().contains_key(&request_id)
    }

    /// Stop accepting work, let in-flight requests run to completion (their
    /// callbacks still fire), then join the reactor thread.
    pub fn close(&mut self) {
        if let Some(handle) = self.reactor.take() {
            let _ = self.commands.send(ReactorCommand::Shutdown);
            let _ = self.waker.wake();
            if handle.join().is_err() {
                warn!("Client reactor panicked");
            }
        }
    }
}

impl Drop for AsyncTcpClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_reactor(mut poll: Poll, commands: Receiver<ReactorCommand>, sessions: SessionMap) {
    let mut events = Events::with_capacity(256);
    let mut active: HashMap<Token, ActiveRequest> = HashMap::new();
    let mut next_token = 1usize;
    let mut draining = false;

    info!("Client reactor started");

    loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == ErrorKind::Interrupted {
                continue;
            }
            warn!("Client reactor poll failed: {}", e);
            break;
        }

        for event in events.iter() {
            let token = event.token();
            if token == WAKER {
                continue; // commands are drained below
            }

            let finished = match active.get_mut(&token) {
                Some(request) => drive(request, poll.registry(), token),
                None => false,
            };

            if finished {
                if let Some(request) = active.remove(&token) {
                    finish(&sessions, poll.registry(), request);
                }
            }
        }

        while let Ok(command) = commands.try_recv() {
            match command {
                ReactorCommand::Start(session) => {
                    start_request(&sessions, poll.registry(), &mut active, &mut next_token, session);
                }
                ReactorCommand::Cancel(id) => {
                    // The flag is already set; abort the pending transport
                    // operation and let completion run the normal path.
                    let token = active
                        .iter()
                        .find(|(_, r)| r.session.id == id)
                        .map(|(t, _)| *t);
                    if let Some(token) = token {
                        if let Some(request) = active.remove(&token) {
                            finish(&sessions, poll.registry(), request);
                        }
                    }
                }
                ReactorCommand::Shutdown => {
                    draining = true;
                }
            }
        }

        if draining && active.is_empty() {
            break;
        }
    }

    info!("Client reactor stopped");
}

fn start_request(
    sessions: &SessionMap,
    registry: &Registry,
    active: &mut HashMap<Token, ActiveRequest>,
    next_token: &mut usize,
    session: Arc<Session>,
) {
    // A cancel may land before the connect is even issued
    if session.is_cancelled() {
        complete(sessions, &session, None, Vec::new());
        return;
    }

    match TcpStream::connect(session.endpoint) {
        Ok(mut stream) => {
            let token = Token(*next_token);
            *next_token += 1;

            if let Err(e) = registry.register(&mut stream, token, Interest::WRITABLE) {
                complete(sessions, &session, Some(e), Vec::new());
                return;
            }

            active.insert(
                token,
                ActiveRequest {
                    session,
                    stream,
                    stage: Stage::Connecting,
                    response: Vec::new(),
                    error: None,
                },
            );
        }
        Err(e) => complete(sessions, &session, Some(e), Vec::new()),
    }
}

/// Advance a request's state machine as far as the socket allows.
/// Returns true once the request is finished, successfully or not.
fn drive(request: &mut ActiveRequest, registry: &Registry, token: Token) -> bool {
    loop {
        match request.stage {
            Stage::Connecting => {
                match request.stream.take_error() {
                    Ok(Some(e)) => {
                        request.error = Some(e);
                        return true;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        request.error = Some(e);
                        return true;
                    }
                }
                match request.stream.peer_addr() {
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::NotConnected => return false,
                    Err(e) => {
                        request.error = Some(e);
                        return true;
                    }
                }

                // Connected. Advance to the write only if no cancel slipped
                // in; finishing with no recorded error maps to Aborted.
                if request.session.is_cancelled() {
                    return true;
                }
                request.stage = Stage::Writing { written: 0 };
            }
            Stage::Writing { written } => {
                let payload = &request.session.payload;
                let mut written = written;

                while written < payload.len() {
                    match request.stream.write(&payload[written..]) {
                        Ok(0) => {
                            request.error = Some(io::Error::new(
                                ErrorKind::WriteZero,
                                "connection closed during request write",
                            ));
                            return true;
                        }
                        Ok(n) => written += n,
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            request.stage = Stage::Writing { written };
                            return false;
                        }
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            request.error = Some(e);
                            return true;
                        }
                    }
                }

                // Payload fully handed off; same cancel check before the read
                if request.session.is_cancelled() {
                    return true;
                }
                request.stage = Stage::Reading;
                if let Err(e) = registry.reregister(&mut request.stream, token, Interest::READABLE)
                {
                    request.error = Some(e);
                    return true;
                }
                return false;
            }
            Stage::Reading => {
                let mut buffer = [0u8; 4096];
                loop {
                    match request.stream.read(&mut buffer) {
                        Ok(0) => {
                            request.error = Some(ErrorKind::UnexpectedEof.into());
                            return true;
                        }
                        Ok(n) => {
                            request.response.extend_from_slice(&buffer[..n]);
                            if let Some(pos) = memchr(b'\n', &request.response) {
                                request.response.truncate(pos);
                                return true;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            request.error = Some(e);
                            return true;
                        }
                    }
                }
            }
        }
    }
}

fn finish(sessions: &SessionMap, registry: &Registry, mut request: ActiveRequest) {
    let _ = registry.deregister(&mut request.stream);
    let _ = request.stream.shutdown(Shutdown::Both);
    complete(sessions, &request.session, request.error, request.response);
}

/// Terminal step shared by every outcome: drop the id from the registry,
/// compute the final status, fire the callback.
fn complete(
    sessions: &SessionMap,
    session: &Arc<Session>,
    error: Option<io::Error>,
    response: Vec<u8>,
) {
    sessions.lock().remove(&session.id);

    // Aborted only when cancellation was requested and no transport error
    // preempted it; an observed error always wins.
    let status = match error {
        Some(e) => RequestStatus::Failed(Error::Io(e)),
        None if session.is_cancelled() => RequestStatus::Aborted,
        None => RequestStatus::Completed,
    };

    let response = String::from_utf8_lossy(&response).into_owned();
    session.complete(response, status);
}
