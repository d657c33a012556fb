//! Typed errors at module boundaries.
//!
//! Steady-state I/O (would-block, peer-closed, malformed packets on a live
//! connection) is logged and recovered locally per the error-handling design
//! — it never surfaces as an `Err` from an update loop. `Error` is reserved
//! for fallible construction (binding a port, connecting to a coordinator)
//! and for callers that explicitly ask for a decoded result (e.g. schema
//! lookups).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind listen socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("packet header had bad magic/version")]
    BadMagic,

    #[error("packet payload size {0} exceeds configured ceiling {1}")]
    PayloadTooLarge(u32, u32),

    #[error("peer closed connection")]
    Disconnected,

    #[error("failed to serialize message: {0}")]
    Serialize(#[source] Box<bincode::ErrorKind>),

    #[error("failed to deserialize message: {0}")]
    Deserialize(#[source] Box<bincode::ErrorKind>),

    #[error("mcap error: {0}")]
    Mcap(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
