//! Wires the raw TCP primitives in [`super::tcp`] up to the
//! [`Transport`](crate::transport::Transport) trait object seam, including
//! the dynamic peer reconciliation a subscriber needs: a topic's
//! publishers are discovered over time via
//! [`TransportSubscriber::handle_publisher_info`], and each newly-seen
//! address gets its own connection (grounded in `TcpSubscriber::ConnectToPort`,
//! which is called once per discovered publisher address rather than once
//! up front).

use super::reactor::Reactor;
use super::tcp::{TcpPublisher, TcpSubscriber};
use crate::packet::DataType;
use crate::publisher_info::PublisherInfo;
use crate::schema::MessageTypeInfo;
use crate::transport::{RawCallback, Transport, TransportPublisher, TransportSubscriber};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

pub const TRANSPORT_NAME: &str = "tcp";

/// Key used in `PublisherInfo::transport_info` to carry this publisher's
/// listen address, so a remote subscriber knows where to connect.
pub const TCP_ADDR_KEY: &str = "tcp_addr";

/// Presence-only marker (spec.md §3's `"inproc"` well-known transport name)
/// a [`TransportManager`](crate::transport_manager::TransportManager) adds
/// to a publisher's `transport_info` when it also has the in-process path
/// enabled, so same-process subscribers skip dialing TCP for it.
pub const INPROC_MARKER_KEY: &str = "inproc";

pub struct TcpTransport {
    reactor: Arc<Reactor>,
    bind_host: String,
}

impl TcpTransport {
    pub fn new(reactor: Arc<Reactor>, bind_host: impl Into<String>) -> Self {
        Self {
            reactor,
            bind_host: bind_host.into(),
        }
    }
}

impl Transport for TcpTransport {
    fn name(&self) -> &str {
        TRANSPORT_NAME
    }

    fn advertise(&self, _topic: &str, _type_info: &MessageTypeInfo) -> crate::error::Result<Arc<dyn TransportPublisher>> {
        let publisher = TcpPublisher::bind(0, self.reactor.clone())?;
        Ok(publisher as Arc<dyn TransportPublisher>)
    }

    fn subscribe(
        &self,
        topic: &str,
        _type_info: &MessageTypeInfo,
        callback: RawCallback,
    ) -> crate::error::Result<Arc<dyn TransportSubscriber>> {
        Ok(Arc::new(TcpTransportSubscriber {
            topic: topic.to_string(),
            reactor: self.reactor.clone(),
            callback,
            connected: Mutex::new(HashSet::new()),
            subscribers: Mutex::new(Vec::new()),
        }))
    }

    fn connection_info(&self, publisher: &Arc<dyn TransportPublisher>) -> HashMap<String, String> {
        let mut info = HashMap::new();
        if let Some(tcp) = publisher.as_any().downcast_ref::<TcpPublisher>() {
            info.insert(TCP_ADDR_KEY.to_string(), format!("{}:{}", self.bind_host, tcp.port()));
        }
        info
    }
}

impl TransportPublisher for TcpPublisher {
    fn publish_raw(&self, payload: &[u8], data_type: DataType) {
        let packet = Arc::new(crate::packet::MessagePacket::new(data_type, payload));
        self.send(packet);
    }

    fn subscriber_count(&self) -> usize {
        TcpPublisher::subscriber_count(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A subscriber's TCP-side handle: one connection per discovered publisher
/// address, all feeding the same callback.
pub struct TcpTransportSubscriber {
    topic: String,
    reactor: Arc<Reactor>,
    callback: RawCallback,
    connected: Mutex<HashSet<SocketAddr>>,
    subscribers: Mutex<Vec<Arc<TcpSubscriber>>>,
}

impl TransportSubscriber for TcpTransportSubscriber {
    fn handle_publisher_info(&self, infos: &[PublisherInfo]) {
        self.reconcile_publishers(infos)
    }
}

impl TcpTransportSubscriber {
    fn connect_to(&self, addr: SocketAddr) {
        if !self.connected.lock().insert(addr) {
            return;
        }
        let callback = self.callback.clone();
        let topic = self.topic.clone();
        let connect_result = TcpSubscriber::connect(addr, self.reactor.clone(), move |packet| {
            callback(crate::transport::MessageEvent {
                topic: topic.clone(),
                message: Arc::new(packet.payload().to_vec()),
                send_time: crate::time::MonotonicTime::from_nanos(packet.header().send_time),
            });
        });
        match connect_result {
            Ok(subscriber) => self.subscribers.lock().push(subscriber),
            Err(err) => warn!(%addr, %err, "failed to connect to publisher"),
        }
    }

    /// Connects to any publisher address for this topic that isn't
    /// already connected.
    fn reconcile_publishers(&self, infos: &[PublisherInfo]) {
        for info in infos {
            let Some(addr) = info.transport_info.get(TCP_ADDR_KEY) else {
                continue;
            };
            match SocketAddr::from_str(addr) {
                Ok(addr) => self.connect_to(addr),
                Err(err) => warn!(addr, %err, "publisher advertised an unparseable tcp address"),
            }
        }
    }

    pub fn connected_publisher_count(&self) -> usize {
        self.connected.lock().len()
    }
}
