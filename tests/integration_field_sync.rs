//! Field synchronizer end-to-end: three header-stamped messages arriving
//! interleaved on two topics produce exactly two sync events, and the
//! unmatched stamp on topic A is evicted rather than lingering forever.

use basis_rs::sync::FieldEqual2;
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn interleaved_stamps_produce_two_syncs_and_evict_the_unmatched_one() {
    let fires = Arc::new(Mutex::new(Vec::new()));
    let fires_clone = fires.clone();

    let sync = FieldEqual2::<u32, u32, u32>::new(
        Some(Box::new(|stamp: &u32| *stamp)),
        Some(Box::new(|stamp: &u32| *stamp)),
        move |_time, a, b| fires_clone.lock().push((*a, *b)),
    );

    // (A:1)(A:2)(B:1)(A:3)(B:3)
    sync.on_message_a(Arc::new(1));
    sync.on_message_a(Arc::new(2));
    sync.on_message_b(Arc::new(1));
    sync.on_message_a(Arc::new(3));
    sync.on_message_b(Arc::new(3));

    let fires = fires.lock().clone();
    assert_eq!(fires, vec![(1, 1), (3, 3)]);
}
