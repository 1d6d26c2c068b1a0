mod item;
mod queue;

pub use item::{WorkItem, WorkerThread};
pub use queue::{WorkQueue, DEFAULT_QUEUE_CAPACITY};
