use crate::error::Error;
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Final status delivered to a request's completion callback.
#[derive(Debug)]
pub enum RequestStatus {
    /// The connect → write → read chain ran and a response line arrived.
    Completed,

    /// The request was cancelled before it could complete.
    Aborted,

    /// A transport error ended the request.
    Failed(Error),
}

impl RequestStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RequestStatus::Completed)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RequestStatus::Aborted)
    }
}

/// Invoked exactly once per request with `(request_id, response, status)`.
pub type RequestCallback = Box<dyn FnOnce(u64, String, RequestStatus) + Send>;

/// Mutable state of one in-flight client request.
///
/// Shared between the registry (by id) and the reactor driving the request's
/// transport operations; dropped once the completion callback has run and
/// the id has left the registry.
pub struct Session {
    pub id: u64,
    pub endpoint: SocketAddr,
    pub payload: Bytes,

    // The cancellation flag and every stage-advance decision are read and
    // written under this one lock, which is what closes the race between
    // "user cancels" and "stage N completion fires".
    cancelled: Mutex<bool>,

    callback: Mutex<Option<RequestCallback>>,
}

impl Session {
    pub fn new(
        id: u64,
        endpoint: SocketAddr,
        payload: Bytes,
        callback: RequestCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            endpoint,
            payload,
            cancelled: Mutex::new(false),
            callback: Mutex::new(Some(callback)),
        })
    }

    pub fn mark_cancelled(&self) {
        *self.cancelled.lock() = true;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Invoke the completion callback. A second call is a no-op, so the
    /// callback fires exactly once no matter how the request ended.
    pub fn complete(&self, response: String, status: RequestStatus) {
        let callback = self.callback.lock().take();
        match callback {
            Some(callback) => callback(self.id, response, status),
            None => debug!("Request {} already completed", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn endpoint() -> SocketAddr {
        "127.0.0.1:3333".parse().unwrap()
    }

    #[test]
    fn complete_fires_the_callback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let session = Session::new(7, endpoint(), Bytes::from_static(b"UP     "), {
            let calls = Arc::clone(&calls);
            Box::new(move |id, response, status| {
                assert_eq!(id, 7);
                assert_eq!(response, "done");
                assert!(status.is_completed());
                calls.fetch_add(1, Ordering::SeqCst);
            })
        });

        session.complete("done".to_string(), RequestStatus::Completed);
        session.complete("again".to_string(), RequestStatus::Aborted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_flag_round_trips() {
        let session = Session::new(1, endpoint(), Bytes::new(), Box::new(|_, _, _| {}));
        assert!(!session.is_cancelled());
        session.mark_cancelled();
        assert!(session.is_cancelled());
    }
}
