//! Client half of the coordinator protocol: one TCP connection a transport
//! manager uses to publish its topology and fetch `NetworkInfo` updates.
//!
//! Grounded in `coordinator_connector.h`'s `CoordinatorConnector`. Unlike
//! [`crate::coordinator::Coordinator`]'s per-`Update()` drain loop, this
//! side does a single receive attempt per `update()` call (spec.md §4.11:
//! "`Update()` runs receive once") — one coordinator broadcast is small
//! enough that a connector catches up within a few update cadences without
//! needing to drain a backlog in one call.

use crate::coordinator_wire;
use crate::packet::IncompleteMessagePacket;
use crate::protocol::{ClientToCoordinatorMessage, CoordinatorMessage};
use crate::publisher_info::{NetworkInfo, TransportManagerInfo};
use crate::schema::MessageSchema;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

pub struct CoordinatorConnector {
    stream: Mutex<TcpStream>,
    incomplete: Mutex<IncompleteMessagePacket>,
    network_info: Mutex<NetworkInfo>,
    pending_schemas: Mutex<HashMap<String, MessageSchema>>,
    errors: Mutex<Vec<String>>,
    connected: std::sync::atomic::AtomicBool,
}

impl CoordinatorConnector {
    pub fn connect(addr: impl ToSocketAddrs) -> crate::error::Result<Self> {
        let addr = addr
            .to_socket_addrs()
            .map_err(crate::error::Error::Io)?
            .next()
            .expect("at least one resolved address");
        let stream = TcpStream::connect(addr).map_err(|source| crate::error::Error::Connect {
            addr: addr.to_string(),
            source,
        })?;
        stream.set_nonblocking(true).map_err(crate::error::Error::Io)?;
        Ok(Self {
            stream: Mutex::new(stream),
            incomplete: Mutex::new(IncompleteMessagePacket::new()),
            network_info: Mutex::new(NetworkInfo::default()),
            pending_schemas: Mutex::new(HashMap::new()),
            errors: Mutex::new(Vec::new()),
            connected: std::sync::atomic::AtomicBool::new(true),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// One receive attempt: if a full message has arrived, decode and
    /// apply it. No-op if the connection has already been marked dead.
    pub fn update(&self) {
        if !self.is_connected() {
            return;
        }
        let mut stream = self.stream.lock();
        let mut incomplete = self.incomplete.lock();
        match coordinator_wire::try_read_one(&mut stream, &mut incomplete) {
            Ok(Some(payload)) => {
                drop(stream);
                drop(incomplete);
                self.apply(payload);
            }
            Ok(None) => {}
            Err(err) => {
                debug!(%err, "coordinator connection lost");
                self.connected.store(false, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }

    fn apply(&self, payload: Vec<u8>) {
        match coordinator_wire::decode::<CoordinatorMessage>(&payload) {
            Ok(CoordinatorMessage::NetworkInfo(info)) => *self.network_info.lock() = info,
            Ok(CoordinatorMessage::Schemas(schemas)) => {
                let mut pending = self.pending_schemas.lock();
                for schema in schemas {
                    pending.insert(schema.schema_id(), schema);
                }
            }
            Ok(CoordinatorMessage::Error(err)) => self.errors.lock().push(err),
            Err(err) => warn!(%err, "failed to decode coordinator message"),
        }
    }

    pub fn network_info(&self) -> NetworkInfo {
        self.network_info.lock().clone()
    }

    pub fn pending_schema(&self, id: &str) -> Option<MessageSchema> {
        self.pending_schemas.lock().get(id).cloned()
    }

    /// Drains and returns every error the coordinator has sent back so
    /// far (e.g. "missing schemas: ...").
    pub fn take_errors(&self) -> Vec<String> {
        std::mem::take(&mut self.errors.lock())
    }

    pub fn send_transport_manager_info(&self, info: TransportManagerInfo) {
        self.send(&ClientToCoordinatorMessage::TransportManagerInfo(info));
    }

    pub fn send_schemas(&self, schemas: Vec<MessageSchema>) {
        if schemas.is_empty() {
            return;
        }
        self.send(&ClientToCoordinatorMessage::Schemas(schemas));
    }

    pub fn request_schemas(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        self.send(&ClientToCoordinatorMessage::RequestSchemas(ids));
    }

    fn send(&self, message: &ClientToCoordinatorMessage) {
        if !self.is_connected() {
            return;
        }
        let mut stream = self.stream.lock();
        if coordinator_wire::send(&mut stream, message).is_err() {
            self.connected.store(false, std::sync::atomic::Ordering::Relaxed);
        }
    }
}
