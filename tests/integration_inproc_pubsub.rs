//! Single process, in-process transport only: a subscriber registered
//! before the topic is advertised and one registered after both receive
//! exactly one message with the published value.

use basis_rs::transport::BincodeSerializer;
use basis_rs::TransportManager;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn both_early_and_late_subscribers_see_the_one_publish() {
    let manager = TransportManager::new(true);

    let early_value = Arc::new(AtomicI32::new(0));
    let early_count = Arc::new(AtomicUsize::new(0));
    {
        let early_value = early_value.clone();
        let early_count = early_count.clone();
        manager
            .subscribe::<i32, BincodeSerializer<i32>>("/foo", move |msg| {
                early_value.store(*msg, Ordering::SeqCst);
                early_count.fetch_add(1, Ordering::SeqCst);
            })
            .expect("early subscribe");
    }

    let publisher = manager.advertise::<i32, BincodeSerializer<i32>>("/foo").expect("advertise");

    let late_value = Arc::new(AtomicI32::new(0));
    let late_count = Arc::new(AtomicUsize::new(0));
    {
        let late_value = late_value.clone();
        let late_count = late_count.clone();
        manager
            .subscribe::<i32, BincodeSerializer<i32>>("/foo", move |msg| {
                late_value.store(*msg, Ordering::SeqCst);
                late_count.fetch_add(1, Ordering::SeqCst);
            })
            .expect("late subscribe");
    }

    publisher.publish::<BincodeSerializer<i32>>(42).expect("publish");

    assert_eq!(early_count.load(Ordering::SeqCst), 1);
    assert_eq!(early_value.load(Ordering::SeqCst), 42);
    assert_eq!(late_count.load(Ordering::SeqCst), 1);
    assert_eq!(late_value.load(Ordering::SeqCst), 42);
}
