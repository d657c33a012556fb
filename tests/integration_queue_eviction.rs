//! Subscriber callback queue eviction: with a limit of 2, enqueueing
//! callbacks `{1, 2, 3, 4}` before any servicing drops the two oldest, and
//! draining the queue invokes the survivors `{3, 4}` in order.

use basis_rs::queue::{SubscriberOverallQueue, SubscriberQueue};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn overflow_leaves_only_the_newest_two_and_they_run_in_order() {
    let overall = SubscriberOverallQueue::new();
    let sub = SubscriberQueue::new(overall.clone(), 2);
    let invoked = Arc::new(Mutex::new(Vec::new()));

    for i in 1..=4 {
        let invoked = invoked.clone();
        sub.add_callback(move || invoked.lock().push(i));
    }
    assert_eq!(sub.len(), 2);

    overall.process_callbacks(Duration::from_millis(50));

    assert_eq!(*invoked.lock(), vec![3, 4]);
}
