//! `basis-replay`: reads back an MCAP recording and republishes it onto a
//! running transport graph at the pace it was recorded (spec.md §4.14).

use anyhow::{Context, Result};
use basis_rs::cli::ReplayArgs;
use basis_rs::coordinator_connector::CoordinatorConnector;
use basis_rs::net::{Reactor, TcpTransport};
use basis_rs::replayer::{next_run_token, Replayer};
use basis_rs::transport_manager::TransportManager;
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn main() -> Result<()> {
    let args = ReplayArgs::parse();
    let _log_guard = basis_rs::logging::init(args.logging.verbose, args.logging.log_dir.as_deref());

    let replayer = Replayer::open(&args.input).context("failed to open recording")?;
    info!(path = %replayer.path().display(), channels = replayer.channel_count(), "loaded recording");

    let mut transport_manager = TransportManager::new(false);
    let reactor = Reactor::new(num_cpus::get())?;
    transport_manager.register_transport("tcp", Arc::new(TcpTransport::new(reactor, "127.0.0.1")));
    let transport_manager = Arc::new(transport_manager);

    let coordinator = Arc::new(
        CoordinatorConnector::connect((args.coordinator_host.as_str(), args.coordinator_port)).context("failed to connect to coordinator")?,
    );

    // Replaying is otherwise just a stream of `transport_manager.advertise`
    // + `publish` calls; the coordinator side needs its own heartbeat so
    // the replayed publishers actually become visible to the rest of the
    // network while `replay()` blocks for the duration of playback.
    let stop = Arc::new(AtomicBool::new(false));
    let pump_transport_manager = transport_manager.clone();
    let pump_coordinator = coordinator.clone();
    let pump_stop = stop.clone();
    let pump = std::thread::Builder::new()
        .name("basis-replay-coordinator-pump".into())
        .spawn(move || {
            while !pump_stop.load(Ordering::Relaxed) {
                pump_coordinator.update();
                pump_transport_manager.update();
                pump_coordinator.send_transport_manager_info(pump_transport_manager.transport_manager_info());
                std::thread::sleep(Duration::from_millis(50));
            }
        })
        .expect("failed to spawn coordinator pump thread");

    let run_token = next_run_token();
    let result = replayer.replay(&transport_manager, run_token, args.looping);

    stop.store(true, Ordering::Relaxed);
    pump.join().expect("coordinator pump thread panicked");

    result.context("replay failed")?;
    info!("replay finished");
    Ok(())
}
