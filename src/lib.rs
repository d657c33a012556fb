//! # basis-rs
//!
//! A pub/sub messaging and discovery fabric for robotics "units": in-process
//! and inter-process publish/subscribe, a coordinator that composes a
//! network-wide topic graph from per-process reports, message
//! synchronizers that align multi-topic inputs before invoking a handler,
//! and an MCAP-based recorder/replayer.
//!
//! The crate is organized the way the original implementation is, one
//! module per responsibility in the system overview: packet framing and the
//! TCP transport under [`net`], the in-process transport under [`inproc`],
//! the per-process [`transport_manager`], the [`coordinator`] and its
//! client-side [`coordinator_connector`], [`sync`] join operators, and the
//! [`recorder`]/[`replayer`] pair. [`unit`] ties these together into the
//! two runtime flavors applications build on.

pub mod cli;
pub mod coordinator;
pub mod coordinator_connector;
pub(crate) mod coordinator_wire;
pub mod error;
pub mod inproc;
pub mod logging;
pub mod net;
pub mod packet;
pub mod protocol;
pub mod publisher_info;
pub mod queue;
pub mod recorder;
pub mod replayer;
pub mod schema;
pub mod sync;
pub mod time;
pub mod transport;
pub mod transport_manager;
pub mod unit;

pub use error::{Error, Result};
pub use transport_manager::TransportManager;
pub use unit::{MultiThreadedUnit, SingleThreadedUnit};

/// The current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
