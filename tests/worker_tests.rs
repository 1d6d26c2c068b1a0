//! Worker thread and work item behavior: wait semantics, sequential drain,
//! shutdown protocol.

use robolink::worker::{WorkItem, WorkerThread};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

#[test]
fn wait_indefinite_returns_the_action_result() {
    let worker = WorkerThread::spawn("wait-test", 0u64, 8).unwrap();

    let item = WorkItem::new(|owner: &mut u64| {
        *owner += 1;
        true
    });
    assert!(worker.submit(Arc::clone(&item), Some(Duration::from_secs(1))));
    assert!(item.wait(None));
}

#[test]
fn wait_reports_a_failing_action() {
    let worker = WorkerThread::spawn("fail-test", (), 8).unwrap();

    let item = WorkItem::new(|_: &mut ()| false);
    assert!(worker.submit(Arc::clone(&item), Some(Duration::from_secs(1))));
    assert!(!item.wait(None));
}

#[test]
fn wait_times_out_when_the_item_is_never_run() {
    let item: Arc<WorkItem<()>> = WorkItem::new(|_| true);
    assert!(!item.wait(Some(Duration::from_millis(30))));
    assert!(!item.is_completed());
}

#[test]
fn items_drain_sequentially_against_the_owner() {
    // The owner is plain unsynchronized state: single-drain execution is
    // what makes mutating it from queued actions sound.
    let worker = WorkerThread::spawn("seq-test", Vec::<usize>::new(), 32).unwrap();

    for i in 0..10 {
        let item = WorkItem::new(move |owner: &mut Vec<usize>| {
            owner.push(i);
            true
        });
        assert!(worker.submit(item, Some(Duration::from_secs(1))));
    }

    let (tx, rx) = mpsc::channel();
    let probe = WorkItem::new(move |owner: &mut Vec<usize>| tx.send(owner.clone()).is_ok());
    assert!(worker.submit(Arc::clone(&probe), Some(Duration::from_secs(1))));
    assert!(probe.wait(Some(Duration::from_secs(5))));

    let seen = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[test]
fn shutdown_drains_items_submitted_before_the_stop() {
    let counter = Arc::new(AtomicUsize::new(0));
    let worker = WorkerThread::spawn("drain-test", (), 64).unwrap();

    let mut items = Vec::new();
    for _ in 0..20 {
        let counter = Arc::clone(&counter);
        let item = WorkItem::new(move |_: &mut ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        assert!(worker.submit(Arc::clone(&item), Some(Duration::from_secs(1))));
        items.push(item);
    }

    // Dropping the worker queues the stop item behind everything above,
    // waits for it, and joins the thread.
    drop(worker);

    assert_eq!(counter.load(Ordering::SeqCst), 20);
    assert!(items.iter().all(|item| item.is_completed()));
}

#[test]
fn queue_len_reflects_unprocessed_backlog() {
    // A worker whose first item blocks holds the rest in the queue.
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let worker = WorkerThread::spawn("backlog-test", (), 16).unwrap();

    let blocker = WorkItem::new(move |_: &mut ()| {
        gate_rx.recv_timeout(Duration::from_secs(5)).is_ok()
    });
    assert!(worker.submit(blocker, Some(Duration::from_secs(1))));

    let follow_up = WorkItem::new(|_: &mut ()| true);
    assert!(worker.submit(Arc::clone(&follow_up), Some(Duration::from_secs(1))));

    assert!(!follow_up.is_completed());
    gate_tx.send(()).unwrap();
    assert!(follow_up.wait(Some(Duration::from_secs(5))));
    assert_eq!(worker.queue_len(), 0);
}
