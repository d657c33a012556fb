//! Framing helpers shared by [`crate::coordinator::Coordinator`] and
//! [`crate::coordinator_connector::CoordinatorConnector`]: both sides speak
//! the same thing — a `bincode`-encoded protocol enum inside a
//! `DataType::Message`-tagged [`MessagePacket`], over a non-blocking
//! `TcpStream`.

use crate::packet::{DataType, IncompleteMessagePacket, MessagePacket};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Attempts with a short retry loop so a momentarily-full send buffer
/// doesn't drop the message — mirrors the "short writes: loop until
/// complete" rule in the error-handling design, applied here to
/// `WouldBlock` on a non-blocking stream rather than a blocking partial
/// write.
const WRITE_RETRY_ATTEMPTS: u32 = 200;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(1);

pub(crate) fn encode<T: Serialize>(msg: &T) -> crate::error::Result<MessagePacket> {
    let bytes = bincode::serialize(msg).map_err(crate::error::Error::Serialize)?;
    Ok(MessagePacket::new(DataType::Message, &bytes))
}

/// Writes a full packet to `stream`, retrying on `WouldBlock`. Returns an
/// error (and the caller should drop the connection) on any other I/O
/// failure or if the retry budget is exhausted.
pub(crate) fn send_packet(stream: &mut TcpStream, packet: &MessagePacket) -> std::io::Result<()> {
    let bytes = packet.packet();
    let mut offset = 0;
    let mut attempts = 0;
    while offset < bytes.len() {
        match stream.write(&bytes[offset..]) {
            Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero)),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                attempts += 1;
                if attempts > WRITE_RETRY_ATTEMPTS {
                    return Err(std::io::Error::from(ErrorKind::WouldBlock));
                }
                std::thread::sleep(WRITE_RETRY_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

pub(crate) fn send<T: Serialize>(stream: &mut TcpStream, msg: &T) -> crate::error::Result<()> {
    let packet = encode(msg)?;
    send_packet(stream, &packet).map_err(crate::error::Error::Io)
}

/// One non-blocking read attempt, advancing `incomplete`. Returns:
/// - `Ok(Some(bytes))` once a full packet's payload has arrived,
/// - `Ok(None)` if the read would block (nothing new) or is still in
///   progress,
/// - `Err(_)` on peer-closed, framing error, or other I/O failure — the
///   caller should drop the connection.
pub(crate) fn try_read_one(stream: &mut TcpStream, incomplete: &mut IncompleteMessagePacket) -> crate::error::Result<Option<Vec<u8>>> {
    match stream.read(incomplete.current_buffer()) {
        Ok(0) => Err(crate::error::Error::Disconnected),
        Ok(n) => match incomplete.advance(n)? {
            true => Ok(Some(incomplete.take_completed().payload().to_vec())),
            false => Ok(None),
        },
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(err) => Err(crate::error::Error::Io(err)),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> crate::error::Result<T> {
    bincode::deserialize(bytes).map_err(crate::error::Error::Deserialize)
}
