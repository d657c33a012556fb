//! Topology records exchanged between transport managers and the
//! coordinator: who publishes/subscribes to what, and over which
//! transport-specific connection info.
//!
//! The original encodes these as protobuf messages
//! (`proto::PublisherInfo`/`proto::TransportManagerInfo`/`proto::NetworkInfo`).
//! Nothing else in this crate's dependency stack pulls in a protobuf
//! toolchain, so these are plain `serde`-derived structs instead, carried
//! the same way every other coordinator message is (see `coordinator.rs`):
//! `bincode`-encoded inside a `DataType::Message`-tagged packet, same as an
//! application message.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One advertised topic, with whatever connection info its transports need
/// for a remote subscriber to reach it (e.g. a TCP transport publishes its
/// listen address here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherInfo {
    pub publisher_id: Uuid,
    pub topic: String,
    pub transport_info: HashMap<String, String>,
}

/// One subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberInfo {
    pub topic: String,
}

/// What one transport manager reports about itself to the coordinator:
/// everything it publishes and subscribes to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportManagerInfo {
    pub publishers: Vec<PublisherInfo>,
    pub subscribers: Vec<SubscriberInfo>,
}

/// The coordinator's aggregated view, sent back out to every connected
/// transport manager whenever the topology changes: every publisher in the
/// process group, keyed by topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub publishers_by_topic: HashMap<String, Vec<PublisherInfo>>,
}

impl NetworkInfo {
    pub fn publishers_for(&self, topic: &str) -> &[PublisherInfo] {
        self.publishers_by_topic
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
