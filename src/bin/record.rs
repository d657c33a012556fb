//! `basis-record`: subscribes to every topic matching a set of regex
//! filters on a running transport graph and writes them to an MCAP file
//! (spec.md §4.13). Discovers topics dynamically as the coordinator reports
//! them — a topic that starts publishing after this binary is already
//! running still gets picked up on the next discovery pass.

use anyhow::{Context, Result};
use basis_rs::cli::RecordArgs;
use basis_rs::coordinator_connector::CoordinatorConnector;
use basis_rs::net::{Reactor, TcpTransport};
use basis_rs::recorder::Recorder;
use basis_rs::schema::{MessageSchema, MessageTypeInfo};
use basis_rs::transport_manager::TransportManager;
use clap::Parser;
use parking_lot::Mutex;
use regex::RegexSet;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Generic wire-format metadata for raw subscriptions: a recorder running
/// as its own process has no compile-time knowledge of a topic's message
/// type, so every recorded channel carries the same "raw" serializer tag
/// rather than the original per-message-type schema (schema discovery via
/// `RequestSchemas` is part of the out-of-scope CLI/tooling layer).
fn raw_type_info() -> (MessageTypeInfo, MessageSchema) {
    (
        MessageTypeInfo {
            serializer: "raw".into(),
            name: "raw.Bytes".into(),
            mcap_message_encoding: "raw".into(),
            mcap_schema_encoding: "raw".into(),
        },
        MessageSchema {
            serializer: "raw".into(),
            name: "raw.Bytes".into(),
            schema: String::new(),
            hash_id: "raw:raw.Bytes".into(),
        },
    )
}

fn main() -> Result<()> {
    let args = RecordArgs::parse();
    let _log_guard = basis_rs::logging::init(args.logging.verbose, args.logging.log_dir.as_deref());

    let mut transport_manager = TransportManager::new(false);
    let reactor = Reactor::new(num_cpus::get())?;
    transport_manager.register_transport("tcp", Arc::new(TcpTransport::new(reactor, "127.0.0.1")));
    let transport_manager = Arc::new(transport_manager);

    let coordinator = CoordinatorConnector::connect((args.coordinator_host.as_str(), args.coordinator_port)).context("failed to connect to coordinator")?;

    let recorder = Arc::new(Mutex::new(Recorder::create(&args.output, &args.topics).context("failed to create recording")?));
    let filters = RegexSet::new(&args.topics).context("invalid topic filter regex")?;
    let (type_info, schema) = raw_type_info();

    info!(output = %args.output.display(), filters = ?args.topics, "recording started");

    let mut subscribed = HashSet::new();
    let mut subscriptions = Vec::new();
    let mut split_index = 0u32;

    loop {
        coordinator.update();
        let network_info = coordinator.network_info();
        transport_manager.handle_network_info(network_info.clone());

        if args.split_size_bytes > 0 && recorder.lock().current_size_bytes() >= args.split_size_bytes {
            split_index += 1;
            let split_path = args.output.with_extension(format!("{split_index}.mcap"));
            match recorder.lock().split(&split_path) {
                Ok(()) => {
                    info!(path = %split_path.display(), "split to new recording file");
                    // `split` resets the recorder's channel table; every
                    // topic needs its channel re-registered in the new file
                    // before the next write, even if it was already
                    // subscribed in this process.
                    subscribed.clear();
                }
                Err(err) => warn!(%err, "failed to split recording file"),
            }
        }

        for topic in network_info.publishers_by_topic.keys() {
            if subscribed.contains(topic) || !filters.is_match(topic) {
                continue;
            }
            subscribed.insert(topic.clone());

            if let Err(err) = recorder.lock().register_topic(topic, &type_info, &schema) {
                warn!(%err, topic, "failed to register recorded topic");
                continue;
            }

            let write_recorder = recorder.clone();
            let write_topic = topic.clone();
            match transport_manager.subscribe_raw(topic, move |event| {
                if let Err(err) = write_recorder.lock().write_message(&write_topic, &event.message, event.send_time) {
                    warn!(%err, topic = %write_topic, "failed to write recorded message");
                }
            }) {
                Ok(subscriber) => {
                    info!(topic, "recording topic");
                    subscriptions.push(subscriber);
                }
                Err(err) => warn!(%err, topic, "failed to subscribe for recording"),
            }
        }

        transport_manager.update();
        std::thread::sleep(Duration::from_millis(50));
    }
}
