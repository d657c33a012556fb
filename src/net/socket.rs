//! Thin wrappers over `mio`/`socket2` TCP primitives, plus the conversion
//! between a non-blocking `mio::net::TcpStream` (used on the reactor-driven
//! receive path) and a blocking `std::net::TcpStream` (used by the
//! dedicated per-connection sender thread).

use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;

/// Binds a TCP listen socket on `port` (0 for an ephemeral port), with
/// `SO_REUSEADDR` set the way the original's `TcpListenSocket::Create` does.
pub fn bind_listener(port: u16) -> crate::error::Result<mio::net::TcpListener> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().expect("valid socket addr");
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).map_err(|source| crate::error::Error::Bind { port, source })?;
    socket
        .set_reuse_address(true)
        .map_err(|source| crate::error::Error::Bind { port, source })?;
    socket
        .bind(&addr.into())
        .map_err(|source| crate::error::Error::Bind { port, source })?;
    socket
        .listen(128)
        .map_err(|source| crate::error::Error::Bind { port, source })?;
    socket
        .set_nonblocking(true)
        .map_err(|source| crate::error::Error::Bind { port, source })?;

    Ok(mio::net::TcpListener::from_std(socket.into()))
}

/// Connects (non-blocking-friendly via `mio`) to a remote publisher.
pub fn connect(addr: SocketAddr) -> crate::error::Result<mio::net::TcpStream> {
    mio::net::TcpStream::connect(addr).map_err(|source| crate::error::Error::Connect {
        addr: addr.to_string(),
        source,
    })
}

/// Clones the underlying fd of a `mio::net::TcpStream` into a blocking
/// `std::net::TcpStream`, for use by a dedicated sender thread that wants
/// ordinary blocking `write_all` semantics rather than polling for
/// writability itself.
#[cfg(unix)]
pub fn to_blocking_stream(stream: &mio::net::TcpStream) -> std::io::Result<std::net::TcpStream> {
    use std::mem::ManuallyDrop;
    use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};

    // Borrow the fd without taking ownership from `stream`: wrap it, clone
    // the underlying descriptor, then let the wrapper forget its copy so we
    // don't close the original out from under the caller.
    let borrowed = ManuallyDrop::new(unsafe { socket2::Socket::from_raw_fd(stream.as_raw_fd()) });
    let duplicated = borrowed.try_clone()?;
    duplicated.set_nonblocking(false)?;
    Ok(unsafe { std::net::TcpStream::from_raw_fd(duplicated.into_raw_fd()) })
}
