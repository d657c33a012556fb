//! The coordinator: a single well-known process that aggregates every
//! connected transport manager's published topics into one `NetworkInfo`
//! and serves a process-wide schema registry.
//!
//! Grounded in `coordinator.h`'s `Coordinator`: a listen socket, a
//! per-client table of `(connection, incomplete packet, last reported
//! info)`, and an `Update()` driven by the caller at a fixed cadence
//! (spec.md §5 suggests 50ms) rather than its own thread — matching the
//! original, which is pumped by the launcher's own loop, not a reactor.

use crate::coordinator_wire::{self};
use crate::packet::IncompleteMessagePacket;
use crate::protocol::{ClientToCoordinatorMessage, CoordinatorMessage};
use crate::publisher_info::{NetworkInfo, TransportManagerInfo};
use crate::schema::MessageSchema;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Default coordinator port, matching spec.md §6.2's "well-known constant
/// (compile-time)". Arbitrary but fixed so clients can connect with no
/// other configuration.
pub const DEFAULT_COORDINATOR_PORT: u16 = 17385;

type ClientId = u64;

struct ClientState {
    stream: TcpStream,
    peer: SocketAddr,
    incomplete: IncompleteMessagePacket,
    last_info: TransportManagerInfo,
}

/// Aggregates per-process topology reports into a network-wide view and
/// serves a schema registry. One instance per coordinator process.
pub struct Coordinator {
    listener: TcpListener,
    clients: Mutex<HashMap<ClientId, ClientState>>,
    known_schemas: Mutex<HashMap<String, MessageSchema>>,
    next_client_id: AtomicU64,
}

impl Coordinator {
    pub fn bind(port: u16) -> crate::error::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).map_err(|source| crate::error::Error::Bind { port, source })?;
        listener.set_nonblocking(true).map_err(|source| crate::error::Error::Bind { port, source })?;
        info!(port = listener.local_addr().map(|a| a.port()).unwrap_or(port), "coordinator listening");
        Ok(Self {
            listener,
            clients: Mutex::new(HashMap::new()),
            known_schemas: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    /// Pre-seeds the schema registry (used by tests and by a recorder
    /// replaying a session that knows its own schemas up front).
    pub fn seed_schema(&self, schema: MessageSchema) {
        self.known_schemas.lock().insert(schema.schema_id(), schema);
    }

    /// One non-blocking pass: accept new clients, drain whatever each
    /// existing client has sent, aggregate, and broadcast. Intended to be
    /// called in a loop at a fixed cadence by the owning binary.
    pub fn update(&self) {
        self.accept_pending();
        self.service_clients();
        let network_info = self.aggregate();
        self.broadcast(&CoordinatorMessage::NetworkInfo(network_info));
    }

    fn accept_pending(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(err) = stream.set_nonblocking(true) {
                        warn!(%peer, %err, "failed to set accepted client socket non-blocking");
                        continue;
                    }
                    let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
                    debug!(%peer, client_id = id, "client connected");
                    self.clients.lock().insert(
                        id,
                        ClientState {
                            stream,
                            peer,
                            incomplete: IncompleteMessagePacket::new(),
                            last_info: TransportManagerInfo::default(),
                        },
                    );
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(%err, "coordinator accept failed");
                    break;
                }
            }
        }
    }

    fn service_clients(&self) {
        let mut clients = self.clients.lock();
        let mut dead = Vec::new();
        let mut responses: Vec<(ClientId, CoordinatorMessage)> = Vec::new();

        for (id, client) in clients.iter_mut() {
            loop {
                match coordinator_wire::try_read_one(&mut client.stream, &mut client.incomplete) {
                    Ok(Some(payload)) => match coordinator_wire::decode::<ClientToCoordinatorMessage>(&payload) {
                        Ok(message) => {
                            for response in self.handle_client_message(client, message) {
                                responses.push((*id, response));
                            }
                        }
                        Err(err) => warn!(peer = %client.peer, %err, "failed to decode client message"),
                    },
                    Ok(None) => break,
                    Err(err) => {
                        debug!(peer = %client.peer, %err, "client disconnected");
                        dead.push(*id);
                        break;
                    }
                }
            }
        }

        for (id, response) in responses {
            if let Some(client) = clients.get_mut(&id) {
                if coordinator_wire::send(&mut client.stream, &response).is_err() {
                    dead.push(id);
                }
            }
        }

        for id in dead {
            clients.remove(&id);
        }
    }

    /// Returns zero, one, or two responses. `RequestSchemas` is the only
    /// variant that can produce two: a found batch and a missing-ids error
    /// are independent outcomes, not alternatives, so both go out when both
    /// apply rather than the error silently swallowing the found batch.
    fn handle_client_message(&self, client: &mut ClientState, message: ClientToCoordinatorMessage) -> Vec<CoordinatorMessage> {
        match message {
            ClientToCoordinatorMessage::TransportManagerInfo(info) => {
                client.last_info = info;
                Vec::new()
            }
            ClientToCoordinatorMessage::Schemas(schemas) => {
                let mut known = self.known_schemas.lock();
                for schema in schemas {
                    known.entry(schema.schema_id()).or_insert(schema);
                }
                Vec::new()
            }
            ClientToCoordinatorMessage::RequestSchemas(ids) => {
                let known = self.known_schemas.lock();
                let mut found = Vec::new();
                let mut missing = Vec::new();
                for id in ids {
                    match known.get(&id) {
                        Some(schema) => found.push(schema.clone()),
                        None => missing.push(id),
                    }
                }
                drop(known);

                let mut responses = Vec::new();
                if !found.is_empty() {
                    responses.push(CoordinatorMessage::Schemas(found));
                }
                if !missing.is_empty() {
                    responses.push(CoordinatorMessage::Error(format!("missing schemas: {}", missing.join(", "))));
                }
                responses
            }
        }
    }

    fn aggregate(&self) -> NetworkInfo {
        let clients = self.clients.lock();
        let mut network_info = NetworkInfo::default();
        for client in clients.values() {
            for publisher in &client.last_info.publishers {
                network_info.publishers_by_topic.entry(publisher.topic.clone()).or_default().push(publisher.clone());
            }
        }
        network_info
    }

    fn broadcast(&self, message: &CoordinatorMessage) {
        let mut clients = self.clients.lock();
        let mut dead = Vec::new();
        for (id, client) in clients.iter_mut() {
            if coordinator_wire::send(&mut client.stream, message).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            clients.remove(&id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator_connector::CoordinatorConnector;
    use crate::publisher_info::PublisherInfo;
    use std::time::Duration;

    fn pump(coordinator: &Coordinator, connectors: &[&CoordinatorConnector], rounds: usize) {
        for _ in 0..rounds {
            for c in connectors {
                c.update();
            }
            coordinator.update();
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn two_clients_converge_on_shared_topology() {
        let coordinator = Coordinator::bind(0).unwrap();
        let port = coordinator.local_port();

        let publisher_side = CoordinatorConnector::connect(("127.0.0.1", port)).unwrap();
        let subscriber_side = CoordinatorConnector::connect(("127.0.0.1", port)).unwrap();

        let info = TransportManagerInfo {
            publishers: vec![PublisherInfo {
                publisher_id: uuid::Uuid::new_v4(),
                topic: "/ping".into(),
                transport_info: [("tcp_addr".to_string(), "127.0.0.1:9".to_string())].into(),
            }],
            subscribers: vec![],
        };
        publisher_side.send_transport_manager_info(info);

        pump(&coordinator, &[&publisher_side, &subscriber_side], 5);

        let seen = subscriber_side.network_info();
        assert_eq!(seen.publishers_for("/ping").len(), 1);
    }

    #[test]
    fn schema_request_returns_found_and_missing_in_separate_messages() {
        let coordinator = Coordinator::bind(0).unwrap();
        coordinator.seed_schema(MessageSchema {
            serializer: "protobuf".into(),
            name: "example.Foo".into(),
            schema: "<descriptor>".into(),
            hash_id: "protobuf:example.Foo".into(),
        });
        let port = coordinator.local_port();
        let connector = CoordinatorConnector::connect(("127.0.0.1", port)).unwrap();

        connector.request_schemas(vec!["protobuf:example.Foo".to_string(), "protobuf:nope".to_string()]);
        pump(&coordinator, &[&connector], 5);

        assert!(connector.pending_schema("protobuf:example.Foo").is_some());
        let errors = connector.take_errors();
        assert!(errors.iter().any(|e| e.contains("nope")));
    }
}
