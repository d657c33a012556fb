//! In-process transport: same-process publishers hand subscribers an
//! `Arc<T>` directly, with no serialization. Fan-out holds only `Weak`
//! references to subscribers, mirroring the acyclic ownership the
//! subscriber callback queue uses — a publisher never keeps a dropped
//! subscriber's callback alive, and a subscriber going away doesn't need to
//! unregister itself.
//!
//! The original's `InprocCoordinator`/`InprocPublisher`/`InprocSubscriber`
//! are stubs (`core/transport/inproc.h`); this is a from-scratch
//! implementation of the behavior `spec.md` describes, in the same
//! trait-object idiom as [`crate::transport`].

use crate::time::MonotonicTime;
use crate::transport::MessageEvent;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

struct Topic<T> {
    subscribers: Mutex<Vec<Weak<SubscriberInner<T>>>>,
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

struct SubscriberInner<T> {
    topic: String,
    callback: Box<dyn Fn(MessageEvent<T>) + Send + Sync>,
}

/// Registry of per-topic in-process fan-out state, type-erased by topic
/// name since each topic has its own concrete message type.
#[derive(Default)]
pub struct InprocTransport {
    topics: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl InprocTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn topic_state<T: Send + Sync + 'static>(&self, topic: &str) -> Arc<Topic<T>> {
        let mut topics = self.topics.lock();
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(|| Box::new(Arc::new(Topic::<T>::default())));
        entry
            .downcast_ref::<Arc<Topic<T>>>()
            .expect("in-process topic registered twice under different message types")
            .clone()
    }

    pub fn advertise<T: Send + Sync + 'static>(&self, topic: &str) -> Arc<InprocPublisher<T>> {
        Arc::new(InprocPublisher {
            topic: topic.to_string(),
            state: self.topic_state(topic),
        })
    }

    pub fn subscribe<T: Send + Sync + 'static>(
        &self,
        topic: &str,
        callback: impl Fn(MessageEvent<T>) + Send + Sync + 'static,
    ) -> Arc<InprocSubscriber<T>> {
        let state = self.topic_state(topic);
        let inner = Arc::new(SubscriberInner {
            topic: topic.to_string(),
            callback: Box::new(callback),
        });
        state.subscribers.lock().push(Arc::downgrade(&inner));
        Arc::new(InprocSubscriber { inner })
    }
}

/// A publisher's in-process fan-out handle for one topic.
pub struct InprocPublisher<T> {
    topic: String,
    state: Arc<Topic<T>>,
}

impl<T: Send + Sync + 'static> InprocPublisher<T> {
    /// Hands `message` to every live subscriber, dropping dead `Weak`
    /// entries as it goes so the list doesn't grow unbounded.
    pub fn publish(&self, message: Arc<T>) {
        let send_time = MonotonicTime::now();
        let mut subscribers = self.state.subscribers.lock();
        subscribers.retain(|weak| {
            let Some(subscriber) = weak.upgrade() else {
                return false;
            };
            (subscriber.callback)(MessageEvent {
                topic: self.topic.clone(),
                message: message.clone(),
                send_time,
            });
            true
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.subscribers.lock().iter().filter(|w| w.strong_count() > 0).count()
    }
}

/// A subscriber's in-process handle for one topic. Dropping this
/// unregisters the subscriber, since the publisher only ever holds a
/// `Weak` reference to it.
pub struct InprocSubscriber<T> {
    inner: Arc<SubscriberInner<T>>,
}

impl<T> InprocSubscriber<T> {
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_reaches_live_subscribers_only() {
        let transport = InprocTransport::new();
        let received = Arc::new(AtomicUsize::new(0));

        let sub_received = received.clone();
        let sub = transport.subscribe::<u32>("topic", move |event: MessageEvent<u32>| {
            sub_received.fetch_add(*event.message as usize, Ordering::SeqCst);
        });

        let publisher = transport.advertise::<u32>("topic");
        publisher.publish(Arc::new(5));
        assert_eq!(received.load(Ordering::SeqCst), 5);

        drop(sub);
        publisher.publish(Arc::new(7));
        assert_eq!(received.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn subscriber_count_reflects_live_weak_refs() {
        let transport = InprocTransport::new();
        let publisher = transport.advertise::<u32>("topic");
        assert_eq!(publisher.subscriber_count(), 0);
        let sub = transport.subscribe::<u32>("topic", |_: MessageEvent<u32>| {});
        assert_eq!(publisher.subscriber_count(), 1);
        drop(sub);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
