//! Central per-process registry of transports, publishers, and
//! subscribers. Advertising a topic fans out to every registered
//! transport plus, if configured, the in-process path; subscribing does
//! the same and additionally reconciles against the coordinator's
//! `NetworkInfo` as it arrives.
//!
//! Grounded in `transport_manager.h`'s `TransportManager`/`SchemaManager`.

use crate::inproc::InprocTransport;
use crate::net::transport_tcp::INPROC_MARKER_KEY;
use crate::publisher_info::{NetworkInfo, PublisherInfo, SubscriberInfo, TransportManagerInfo};
use crate::schema::{MessageSchema, SchemaManager};
use crate::transport::{MessageEvent, MessageSerializer, Publisher, Subscriber, Transport, TransportSubscriber};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::error;

/// Type-erased seam so `owned_publishers` can hold `Publisher<T>` for any
/// `T` behind one weak-reference list. A weak ref here resolves only as
/// long as the caller's `Arc<Publisher<T>>` (the handle `advertise`
/// returned) is still alive — exactly the lifetime `Update`'s sweep is
/// supposed to track.
trait ErasedPublisher: Send + Sync {
    fn publisher_info(&self) -> PublisherInfo;
}

impl<T: Send + Sync> ErasedPublisher for Publisher<T> {
    fn publisher_info(&self) -> PublisherInfo {
        PublisherInfo {
            publisher_id: self.publisher_id,
            topic: self.topic.clone(),
            transport_info: self.transport_info.clone(),
        }
    }
}

/// Central per-process transport registry.
pub struct TransportManager {
    transports: HashMap<String, Arc<dyn Transport>>,
    inproc: Option<Arc<InprocTransport>>,
    schema_manager: Mutex<SchemaManager>,

    owned_publishers: Mutex<Vec<Weak<dyn ErasedPublisher>>>,
    last_owned_publisher_info: Mutex<Vec<PublisherInfo>>,
    last_network_info: Mutex<NetworkInfo>,

    subscriber_topics: Mutex<HashMap<String, String>>,
    subscriber_transports: Mutex<Vec<(String, Arc<dyn TransportSubscriber>)>>,
}

impl Default for TransportManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TransportManager {
    /// `with_inproc` matches the original's "for testing only" knob to
    /// force all traffic through a real transport instead of the
    /// zero-copy in-process path.
    pub fn new(with_inproc: bool) -> Self {
        Self {
            transports: HashMap::new(),
            inproc: with_inproc.then(InprocTransport::new),
            schema_manager: Mutex::new(SchemaManager::new()),
            owned_publishers: Mutex::new(Vec::new()),
            last_owned_publisher_info: Mutex::new(Vec::new()),
            last_network_info: Mutex::new(NetworkInfo::default()),
            subscriber_topics: Mutex::new(HashMap::new()),
            subscriber_transports: Mutex::new(Vec::new()),
        }
    }

    pub fn register_transport(&mut self, name: impl Into<String>, transport: Arc<dyn Transport>) {
        self.transports.insert(name.into(), transport);
    }

    pub fn schema_manager(&self) -> &Mutex<SchemaManager> {
        &self.schema_manager
    }

    /// Advertises `topic`, registering `S`'s schema once and creating one
    /// publisher handle per registered transport plus, if enabled, the
    /// in-process path.
    pub fn advertise<T, S>(&self, topic: &str) -> crate::error::Result<Arc<Publisher<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        S: MessageSerializer<T>,
    {
        self.register_schema::<T, S>();

        let mut transport_publishers = Vec::new();
        let mut transport_info = HashMap::new();
        for transport in self.transports.values() {
            let handle = transport.advertise(topic, &S::type_info())?;
            transport_info.extend(transport.connection_info(&handle));
            transport_publishers.push(handle);
        }

        let inproc_publisher = self.inproc.as_ref().map(|inproc| inproc.advertise::<T>(topic));
        if inproc_publisher.is_some() {
            // Presence-only marker (no endpoint) per `spec.md` §3's
            // well-known `"inproc"` transport name — lets a same-process
            // subscriber's topology reconciliation skip dialing TCP for
            // this publisher (§4.9's inproc-preference rule).
            transport_info.insert(INPROC_MARKER_KEY.to_string(), String::new());
        }

        let publisher = Arc::new(Publisher::new(topic.to_string(), transport_info, transport_publishers, inproc_publisher));

        let erased: Arc<dyn ErasedPublisher> = publisher.clone();
        self.owned_publishers.lock().push(Arc::downgrade(&erased));

        Ok(publisher)
    }

    /// Subscribes to `topic`, wiring up every registered transport plus,
    /// if enabled, the in-process path. `callback` is invoked once per
    /// message, deserialized with `S`.
    pub fn subscribe<T, S>(
        &self,
        topic: &str,
        callback: impl Fn(Arc<T>) + Send + Sync + 'static,
    ) -> crate::error::Result<Arc<Subscriber<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        S: MessageSerializer<T>,
    {
        self.register_schema::<T, S>();

        let callback = Arc::new(callback);
        let mut transport_subscribers = Vec::new();
        for (name, transport) in &self.transports {
            let topic_owned = topic.to_string();
            let raw_callback = callback.clone();
            let handle = transport.subscribe(
                topic,
                &S::type_info(),
                Arc::new(move |event: MessageEvent<Vec<u8>>| match S::deserialize(&event.message) {
                    Ok(message) => raw_callback(Arc::new(message)),
                    Err(err) => error!(topic = %topic_owned, %err, "failed to deserialize message"),
                }),
            )?;
            self.subscriber_transports.lock().push((topic.to_string(), handle.clone()));
            transport_subscribers.push(handle);
            self.subscriber_topics.lock().insert(name.clone(), topic.to_string());
        }

        let inproc_subscriber = self.inproc.as_ref().map(|inproc| {
            let callback = callback.clone();
            inproc.subscribe::<T>(topic, move |event: MessageEvent<T>| callback(event.message))
        });

        // A freshly subscribed transport should immediately hear about any
        // publishers we already know of for this topic — first the local
        // (same-process) cache, so intra-process subscribers bind without
        // waiting on a coordinator round trip, then whatever the
        // coordinator has already told us.
        let local = self.last_owned_publisher_info.lock().clone();
        let network = self.last_network_info.lock().publishers_for(topic).to_vec();
        for infos in [&local, &network] {
            self.notify_transports_for_topic(topic, infos);
        }

        Ok(Arc::new(Subscriber {
            topic: topic.to_string(),
            transport_subscribers,
            inproc: inproc_subscriber,
        }))
    }

    /// Like [`Self::subscribe`], but with no `Serializer` — `callback`
    /// receives the raw payload bytes exactly as they arrived. Used by
    /// tools that only need to move bytes around (the replayer, `topic
    /// print`-style introspection) without knowing the wire type. Per
    /// spec.md §4.8, raw subscriptions don't bind to the in-process path:
    /// inproc carries typed `Arc<T>` values, never serialized bytes, so
    /// there's nothing for a raw callback to observe there.
    pub fn subscribe_raw(
        &self,
        topic: &str,
        callback: impl Fn(MessageEvent<Vec<u8>>) + Send + Sync + 'static,
    ) -> crate::error::Result<Arc<Subscriber<Vec<u8>>>> {
        let callback = Arc::new(callback);
        let mut transport_subscribers = Vec::new();
        for (name, transport) in &self.transports {
            let raw_type_info = crate::schema::MessageTypeInfo::new("raw", "raw");
            let handle = transport.subscribe(topic, &raw_type_info, {
                let callback = callback.clone();
                Arc::new(move |event: MessageEvent<Vec<u8>>| callback(event))
            })?;
            self.subscriber_transports.lock().push((topic.to_string(), handle.clone()));
            transport_subscribers.push(handle);
            self.subscriber_topics.lock().insert(name.clone(), topic.to_string());
        }

        let local = self.last_owned_publisher_info.lock().clone();
        let network = self.last_network_info.lock().publishers_for(topic).to_vec();
        for infos in [&local, &network] {
            self.notify_transports_for_topic(topic, infos);
        }

        Ok(Arc::new(Subscriber {
            topic: topic.to_string(),
            transport_subscribers,
            inproc: None,
        }))
    }

    fn register_schema<T, S: MessageSerializer<T>>(&self) {
        let schema: MessageSchema = S::schema();
        self.schema_manager.lock().register(schema);
    }

    /// Forwards `infos` (filtered to `topic`) to every registered transport
    /// subscriber for that topic. Per §4.9's inproc-preference rule, a
    /// publisher advertising the `"inproc"` marker is withheld from
    /// network-facing transports (e.g. TCP) whenever this process itself
    /// has inproc enabled — such a publisher is either already reachable
    /// via the shared in-process fan-out (if it's local) or simply isn't
    /// one this process can use, since `"inproc"` never crosses a process
    /// boundary.
    fn notify_transports_for_topic(&self, topic: &str, infos: &[PublisherInfo]) {
        let filtered: Vec<PublisherInfo> = infos
            .iter()
            .filter(|info| info.topic == topic)
            .filter(|info| !(self.inproc.is_some() && info.transport_info.contains_key(INPROC_MARKER_KEY)))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return;
        }
        for (sub_topic, handle) in self.subscriber_transports.lock().iter() {
            if sub_topic == topic {
                handle.handle_publisher_info(&filtered);
            }
        }
    }

    /// Drains publisher liveness and returns the current snapshot. Called
    /// periodically by the owning unit/coordinator connector.
    pub fn update(&self) {
        let mut owned = self.owned_publishers.lock();
        let mut info = Vec::new();
        owned.retain(|weak| {
            if let Some(publisher) = weak.upgrade() {
                info.push(publisher.publisher_info());
                true
            } else {
                false
            }
        });
        *self.last_owned_publisher_info.lock() = info;
    }

    pub fn last_publisher_info(&self) -> Vec<PublisherInfo> {
        self.last_owned_publisher_info.lock().clone()
    }

    pub fn transport_manager_info(&self) -> TransportManagerInfo {
        TransportManagerInfo {
            publishers: self.last_publisher_info(),
            subscribers: self
                .subscriber_topics
                .lock()
                .values()
                .map(|topic| SubscriberInfo { topic: topic.clone() })
                .collect(),
        }
    }

    /// Applies a coordinator `NetworkInfo` update: records it and notifies
    /// every transport subscriber for each affected topic so TCP-style
    /// transports can connect to any newly-seen publisher.
    pub fn handle_network_info(&self, network_info: NetworkInfo) {
        for (topic, infos) in &network_info.publishers_by_topic {
            self.notify_transports_for_topic(topic, infos);
        }
        *self.last_network_info.lock() = network_info;
    }
}
