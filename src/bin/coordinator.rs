//! `basis-coordinator`: the single well-known process that aggregates every
//! connected transport manager's topology into a `NetworkInfo` and serves
//! the schema registry (spec.md §4.10).

use anyhow::{Context, Result};
use basis_rs::cli::CoordinatorArgs;
use basis_rs::coordinator::Coordinator;
use clap::Parser;
use std::time::Duration;
use tracing::info;

fn main() -> Result<()> {
    let args = CoordinatorArgs::parse();
    let _log_guard = basis_rs::logging::init(args.logging.verbose, args.logging.log_dir.as_deref());

    let coordinator = Coordinator::bind(args.port).context("failed to start coordinator")?;
    info!(port = coordinator.local_port(), "basis-coordinator started");

    let period = Duration::from_millis(args.update_period_ms.max(1));
    loop {
        coordinator.update();
        std::thread::sleep(period);
    }
}
