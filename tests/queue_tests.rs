//! Bounded queue contract tests: capacity, FIFO, timed paths.

use robolink::worker::WorkQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn fifo_order_across_both_push_paths() {
    let queue = WorkQueue::new(8);

    queue.push_timeout(1, Duration::from_millis(100)).unwrap();
    queue.push(2);
    queue.push_timeout(3, Duration::from_millis(100)).unwrap();

    assert_eq!(queue.pop(), 1);
    assert_eq!(queue.pop(), 2);
    assert_eq!(queue.pop(), 3);
}

#[test]
fn pop_timeout_expires_on_an_empty_queue() {
    let queue: WorkQueue<u8> = WorkQueue::new(4);
    assert_eq!(queue.pop_timeout(Duration::from_millis(30)), None);
}

#[test]
fn control_push_is_never_refused() {
    let queue = WorkQueue::new(2);
    assert!(queue.push_timeout(1, Duration::from_millis(50)).is_ok());
    assert!(queue.push_timeout(2, Duration::from_millis(50)).is_ok());

    // The data-plane path is full, but a control item still goes through.
    queue.push(99);
    assert_eq!(queue.len(), 3);

    assert_eq!(queue.pop(), 1);
    assert_eq!(queue.pop(), 2);
    assert_eq!(queue.pop(), 99);
}

#[test]
fn timed_push_respects_capacity_under_contention() {
    // 100 concurrent timed pushes against capacity 10: only ten can fit at
    // once, the remainder get in as the single consumer drains, and the
    // size observed at every point stays within capacity.
    let queue: Arc<WorkQueue<usize>> = Arc::new(WorkQueue::new(10));
    let rejected = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..100)
        .map(|i| {
            let queue = Arc::clone(&queue);
            let rejected = Arc::clone(&rejected);
            thread::spawn(move || {
                if queue.push_timeout(i, Duration::from_secs(1)).is_err() {
                    rejected.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    let mut drained = 0;
    let mut max_observed = 0;
    while let Some(_item) = queue.pop_timeout(Duration::from_millis(200)) {
        drained += 1;
        max_observed = max_observed.max(queue.len());
    }

    for producer in producers {
        producer.join().unwrap();
    }

    // Anything pushed after the consumer gave up is still in the queue.
    while queue.pop_timeout(Duration::from_millis(10)).is_some() {
        drained += 1;
    }

    assert!(max_observed <= 10, "queue grew to {}", max_observed);
    assert_eq!(drained + rejected.load(Ordering::SeqCst), 100);
    // An actively draining consumer leaves the one-second timeout ample.
    assert_eq!(rejected.load(Ordering::SeqCst), 0);
}

#[test]
fn timed_push_unblocks_as_the_consumer_drains() {
    let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new(1));
    queue.push(0);

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.push_timeout(1, Duration::from_secs(5)).is_ok())
    };

    thread::sleep(Duration::from_millis(30));
    assert_eq!(queue.pop(), 0);
    assert!(producer.join().unwrap());
    assert_eq!(queue.pop(), 1);
}
