use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::queue::WorkQueue;

type Action<O> = Box<dyn FnOnce(&mut O) -> bool + Send>;

struct Completion {
    completed: bool,
    success: bool,
}

/// A unit of deferred, possibly-blocking work with synchronous completion
/// signaling for callers that need to wait on it.
pub struct WorkItem<O> {
    action: Mutex<Option<Action<O>>>,
    state: Mutex<Completion>,
    done: Condvar,
}

impl<O> WorkItem<O> {
    pub fn new<F>(action: F) -> Arc<Self>
    where
        F: FnOnce(&mut O) -> bool + Send + 'static,
    {
        Arc::new(Self {
            action: Mutex::new(Some(Box::new(action))),
            state: Mutex::new(Completion {
                completed: false,
                success: false,
            }),
            done: Condvar::new(),
        })
    }

    /// Run the action against the owner, record its result and wake any
    /// waiter. The action runs at most once; re-invoking is a no-op.
    pub fn invoke(&self, owner: &mut O) {
        let action = self.action.lock().take();
        let Some(action) = action else {
            return;
        };
        let success = action(owner);

        let mut state = self.state.lock();
        state.success = success;
        state.completed = true;
        drop(state);
        self.done.notify_all();
    }

    /// Block until the item completes. `None` waits indefinitely. Returns
    /// false on timeout, otherwise the action's own result.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.state.lock();
        match timeout {
            None => {
                while !state.completed {
                    self.done.wait(&mut state);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !state.completed {
                    if self.done.wait_until(&mut state, deadline).timed_out() {
                        return state.completed && state.success;
                    }
                }
            }
        }
        state.success
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }
}

/// A dedicated thread draining one `WorkQueue`, executing each item against
/// an owner object it holds exclusively.
///
/// Items are drained strictly one at a time, so the owner sees at most one
/// concurrent invocation: state touched only through queued actions needs no
/// further locking.
pub struct WorkerThread<O: Send + 'static> {
    queue: Arc<WorkQueue<Arc<WorkItem<O>>>>,
    stopping: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<O: Send + 'static> WorkerThread<O> {
    pub fn spawn(name: &str, owner: O, queue_capacity: usize) -> std::io::Result<Self> {
        let queue = Arc::new(WorkQueue::new(queue_capacity));
        let stopping = Arc::new(AtomicBool::new(false));

        let handle = thread::Builder::new().name(name.to_string()).spawn({
            let queue = Arc::clone(&queue);
            let stopping = Arc::clone(&stopping);
            let mut owner = owner;
            move || {
                debug!("worker thread started");
                while !stopping.load(Ordering::Acquire) {
                    let item: Arc<WorkItem<O>> = queue.pop();
                    item.invoke(&mut owner);
                }
                debug!("worker thread exiting");
            }
        })?;

        Ok(Self {
            queue,
            stopping,
            handle: Some(handle),
        })
    }

    /// Submit a work item. With a timeout this is the backpressure path and
    /// may be refused; without one the item is enqueued unconditionally.
    pub fn submit(&self, item: Arc<WorkItem<O>>, timeout: Option<Duration>) -> bool {
        match timeout {
            None => {
                self.queue.push(item);
                true
            }
            Some(timeout) => self.queue.push_timeout(item, timeout).is_ok(),
        }
    }

    /// Ask the drain loop to stop after the item it is currently taking.
    /// Prefer dropping the worker, which also flushes the queue.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

impl<O: Send + 'static> Drop for WorkerThread<O> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        // The stop item goes through the uncapped push path so backpressure
        // can never refuse it. Everything queued before it drains first.
        let stopping = Arc::clone(&self.stopping);
        let stop_item = WorkItem::new(move |_owner: &mut O| {
            stopping.store(true, Ordering::Release);
            true
        });
        self.queue.push(Arc::clone(&stop_item));

        if stop_item.wait(None) {
            debug!("stop item confirmed, joining worker thread");
            if handle.join().is_err() {
                warn!("worker thread panicked before join");
            }
        } else {
            // A stop that cannot be confirmed will never be actioned either;
            // leaking the thread beats hanging the caller in join forever.
            warn!("stop item was not confirmed; leaving worker thread unjoined");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_records_action_result() {
        let item: Arc<WorkItem<u32>> = WorkItem::new(|owner| {
            *owner += 1;
            true
        });
        let mut owner = 0u32;
        item.invoke(&mut owner);
        assert_eq!(owner, 1);
        assert!(item.is_completed());
        assert!(item.wait(Some(Duration::from_millis(1))));
    }

    #[test]
    fn invoke_runs_the_action_only_once() {
        let item: Arc<WorkItem<u32>> = WorkItem::new(|owner| {
            *owner += 1;
            true
        });
        let mut owner = 0u32;
        item.invoke(&mut owner);
        item.invoke(&mut owner);
        assert_eq!(owner, 1);
    }

    #[test]
    fn wait_times_out_when_never_invoked() {
        let item: Arc<WorkItem<u32>> = WorkItem::new(|_| true);
        assert!(!item.wait(Some(Duration::from_millis(20))));
    }

    #[test]
    fn wait_reports_action_failure() {
        let item: Arc<WorkItem<u32>> = WorkItem::new(|_| false);
        let mut owner = 0u32;
        item.invoke(&mut owner);
        assert!(!item.wait(None));
    }
}
