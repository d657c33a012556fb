//! Transport abstraction: the trait object seam between
//! [`TransportManager`](crate::transport_manager::TransportManager) and a
//! concrete wire transport (TCP, in-process), plus the typed `Publisher<T>`/
//! `Subscriber<T>` handles applications hold.
//!
//! The original expresses this with an inheritance hierarchy
//! (`Transport`/`TransportPublisher`/`TransportSubscriber`) and a template
//! `Serializer` with static methods specialized per message type. Rust has
//! no template specialization, so serialization is instead a small trait
//! implemented per wire format (see [`BincodeSerializer`]), and the
//! publisher/subscriber hierarchy becomes trait objects operating on raw
//! bytes, with the generic `Publisher<T>`/`Subscriber<T>` doing the
//! serialize/deserialize step before handing raw bytes to them.

use crate::packet::DataType;
use crate::schema::{MessageSchema, MessageTypeInfo};
use crate::time::MonotonicTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// A received message, raw or typed, plus the metadata every transport
/// attaches: which topic it arrived on and when the sender stamped it.
#[derive(Clone)]
pub struct MessageEvent<T> {
    pub topic: String,
    pub message: Arc<T>,
    pub send_time: MonotonicTime,
}

pub type RawCallback = Arc<dyn Fn(MessageEvent<Vec<u8>>) + Send + Sync>;

/// One transport's publisher-side handle for a single topic.
pub trait TransportPublisher: Send + Sync {
    fn publish_raw(&self, payload: &[u8], data_type: DataType);
    fn subscriber_count(&self) -> usize {
        0
    }
    /// Lets a transport recover its concrete type from a type-erased
    /// handle, e.g. so `TcpTransport::connection_info` can read back the
    /// bound port.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// One transport's subscriber-side handle for a single topic. Transports
/// drive delivery themselves (reactor callback, in-process fan-out); this
/// marker exists so `TransportManager` can hold the handle alive for as
/// long as the subscription should last.
pub trait TransportSubscriber: Send + Sync {
    /// Called by `TransportManager` whenever it learns of a fresh set of
    /// publishers for this subscriber's topic (typically via the
    /// coordinator's `NetworkInfo`). Transports that need to dial peers
    /// explicitly (TCP) connect to any new address here; transports that
    /// don't (in-process) simply ignore it.
    fn handle_publisher_info(&self, _infos: &[crate::publisher_info::PublisherInfo]) {}
}

/// A pluggable wire transport: TCP, in-process, or anything else that can
/// move raw bytes between an advertiser and its subscribers.
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    fn advertise(&self, topic: &str, type_info: &MessageTypeInfo) -> crate::error::Result<Arc<dyn TransportPublisher>>;

    fn subscribe(
        &self,
        topic: &str,
        type_info: &MessageTypeInfo,
        callback: RawCallback,
    ) -> crate::error::Result<Arc<dyn TransportSubscriber>>;

    /// Connection info this transport wants published alongside the topic
    /// in `TransportManagerInfo` (e.g. `{"tcp_port": "7913"}`).
    fn connection_info(&self, publisher: &Arc<dyn TransportPublisher>) -> std::collections::HashMap<String, String> {
        let _ = publisher;
        std::collections::HashMap::new()
    }
}

/// Per-message-type (de)serialization. Implemented once per wire format,
/// not once per message type — the original's template specialization
/// becomes a type parameter here instead.
pub trait MessageSerializer<T> {
    fn serializer_name() -> &'static str;
    fn serialize(message: &T) -> crate::error::Result<Vec<u8>>;
    fn deserialize(bytes: &[u8]) -> crate::error::Result<T>;
    fn type_info() -> MessageTypeInfo {
        MessageTypeInfo::new(Self::serializer_name(), std::any::type_name::<T>())
    }
    fn schema() -> MessageSchema {
        MessageSchema {
            serializer: Self::serializer_name().to_string(),
            name: std::any::type_name::<T>().to_string(),
            schema: String::new(),
            hash_id: String::new(),
        }
    }
}

/// Default serializer for typed topics: `bincode` over `serde`.
pub struct BincodeSerializer<T>(PhantomData<T>);

impl<T: Serialize + DeserializeOwned> MessageSerializer<T> for BincodeSerializer<T> {
    fn serializer_name() -> &'static str {
        "bincode"
    }

    fn serialize(message: &T) -> crate::error::Result<Vec<u8>> {
        bincode::serialize(message).map_err(crate::error::Error::Serialize)
    }

    fn deserialize(bytes: &[u8]) -> crate::error::Result<T> {
        bincode::deserialize(bytes).map_err(crate::error::Error::Deserialize)
    }
}

/// Serializer for raw byte topics, used by the replayer: the payload is
/// the message, verbatim.
pub struct RawSerializer;

impl MessageSerializer<Vec<u8>> for RawSerializer {
    fn serializer_name() -> &'static str {
        "raw"
    }

    fn serialize(message: &Vec<u8>) -> crate::error::Result<Vec<u8>> {
        Ok(message.clone())
    }

    fn deserialize(bytes: &[u8]) -> crate::error::Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// A typed publisher handle: fans a message out to every registered
/// transport (serializing once per transport kind) plus, if present, the
/// zero-copy in-process path.
pub struct Publisher<T> {
    pub(crate) publisher_id: uuid::Uuid,
    pub(crate) topic: String,
    pub(crate) transport_info: std::collections::HashMap<String, String>,
    pub(crate) transport_publishers: Vec<Arc<dyn TransportPublisher>>,
    pub(crate) inproc: Option<Arc<crate::inproc::InprocPublisher<T>>>,
    _marker: PhantomData<fn(&T)>,
}

impl<T> Publisher<T> {
    pub(crate) fn new(
        topic: String,
        transport_info: std::collections::HashMap<String, String>,
        transport_publishers: Vec<Arc<dyn TransportPublisher>>,
        inproc: Option<Arc<crate::inproc::InprocPublisher<T>>>,
    ) -> Self {
        Self {
            publisher_id: uuid::Uuid::now_v7(),
            topic,
            transport_info,
            transport_publishers,
            inproc,
            _marker: PhantomData,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscriber_count(&self) -> usize {
        let network = self.transport_publishers.iter().map(|p| p.subscriber_count()).sum::<usize>();
        let local = self.inproc.as_ref().map(|p| p.subscriber_count()).unwrap_or(0);
        network + local
    }
}

impl<T: Serialize> Publisher<T> {
    /// Publishes to every network transport by serializing once with `S`,
    /// and to the in-process path by sharing `message` directly.
    pub fn publish<S: MessageSerializer<T>>(&self, message: T) -> crate::error::Result<()> {
        let shared = Arc::new(message);

        if !self.transport_publishers.is_empty() {
            let bytes = S::serialize(shared.as_ref())?;
            for publisher in &self.transport_publishers {
                publisher.publish_raw(&bytes, DataType::Message);
            }
        }

        if let Some(inproc) = &self.inproc {
            inproc.publish(shared);
        }

        Ok(())
    }
}

/// A typed subscriber handle. Delivery happens via the callback passed at
/// construction (see `TransportManager::subscribe`); this type exists so
/// the caller can keep the subscription alive and query how it's wired.
pub struct Subscriber<T> {
    pub(crate) topic: String,
    pub(crate) transport_subscribers: Vec<Arc<dyn TransportSubscriber>>,
    pub(crate) inproc: Option<Arc<crate::inproc::InprocSubscriber<T>>>,
}

impl<T> Subscriber<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}
