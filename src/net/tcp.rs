//! TCP transport primitives: a publisher listening for subscribers and
//! fanning out packets to each over its own sender thread, and a subscriber
//! driven by the shared [`Reactor`](super::reactor::Reactor) that assembles
//! packets off a non-blocking stream.
//!
//! Grounded in the original's `TcpPublisher`/`TcpSender`/`TcpReceiver`: a
//! listen socket accepts subscribers opportunistically (`CheckForNewSubscriptions`),
//! each subscriber gets its own send thread, and receiving is driven by
//! incremental reads into an [`IncompleteMessagePacket`].

use super::reactor::Reactor;
use super::sender::TcpSender;
use super::socket::{self};
use crate::packet::{IncompleteMessagePacket, MessagePacket};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);

fn next_token() -> usize {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Listens on a TCP port, fanning out every published packet to each
/// connected subscriber over its own [`TcpSender`] thread.
pub struct TcpPublisher {
    listener: Mutex<mio::net::TcpListener>,
    port: u16,
    reactor: Arc<Reactor>,
    token: usize,
    senders: Mutex<Vec<TcpSender>>,
}

impl TcpPublisher {
    pub fn bind(port: u16, reactor: Arc<Reactor>) -> crate::error::Result<Arc<Self>> {
        let listener = socket::bind_listener(port)?;
        let bound_port = listener.local_addr()?.port();
        let token = next_token();

        let publisher = Arc::new(Self {
            listener: Mutex::new(listener),
            port: bound_port,
            reactor: reactor.clone(),
            token,
            senders: Mutex::new(Vec::new()),
        });

        let accept_publisher = publisher.clone();
        reactor.add(token, &mut *publisher.listener.lock(), move || accept_publisher.accept_all())?;

        Ok(publisher)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn accept_all(&self) {
        loop {
            let accepted = self.listener.lock().accept();
            match accepted {
                Ok((stream, peer)) => self.on_accepted(stream, peer),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(%err, "accept failed");
                    break;
                }
            }
        }
        let mut listener = self.listener.lock();
        if let Err(err) = self.reactor.reactivate(self.token, &mut *listener) {
            warn!(%err, "failed to reactivate listen socket");
        }
    }

    fn on_accepted(&self, stream: mio::net::TcpStream, peer: SocketAddr) {
        debug!(%peer, "subscriber connected");
        match socket::to_blocking_stream(&stream) {
            Ok(blocking) => self.senders.lock().push(TcpSender::spawn(blocking, peer)),
            Err(err) => warn!(%err, "failed to convert accepted socket to a blocking sender stream"),
        }
    }

    /// Sends to every live subscriber, dropping senders whose connection
    /// has broken.
    pub fn send(&self, message: Arc<MessagePacket>) {
        let mut senders = self.senders.lock();
        senders.retain(|sender| !sender.is_stopped());
        for sender in senders.iter() {
            sender.send(message.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().len()
    }
}

impl Drop for TcpPublisher {
    fn drop(&mut self) {
        let mut listener = self.listener.lock();
        self.reactor.remove(self.token, &mut *listener);
    }
}

/// Connects to a remote publisher and assembles complete packets off the
/// stream as the reactor reports readability, invoking `on_message` for
/// each one.
pub struct TcpSubscriber {
    stream: Mutex<mio::net::TcpStream>,
    reactor: Arc<Reactor>,
    token: usize,
    incomplete: Mutex<IncompleteMessagePacket>,
}

impl TcpSubscriber {
    pub fn connect(
        addr: SocketAddr,
        reactor: Arc<Reactor>,
        on_message: impl Fn(MessagePacket) + Send + Sync + 'static,
    ) -> crate::error::Result<Arc<Self>> {
        let stream = socket::connect(addr)?;
        let token = next_token();

        let subscriber = Arc::new(Self {
            stream: Mutex::new(stream),
            reactor: reactor.clone(),
            token,
            incomplete: Mutex::new(IncompleteMessagePacket::new()),
        });

        let read_subscriber = subscriber.clone();
        reactor.add(token, &mut *subscriber.stream.lock(), move || read_subscriber.drain(&on_message))?;

        Ok(subscriber)
    }

    fn drain(&self, on_message: &(dyn Fn(MessagePacket) + Send + Sync)) {
        loop {
            let mut incomplete = self.incomplete.lock();
            let read_result = {
                let mut stream = self.stream.lock();
                stream.read(incomplete.current_buffer())
            };
            match read_result {
                Ok(0) => {
                    debug!("subscriber stream closed by peer");
                    let mut stream = self.stream.lock();
                    self.reactor.remove_from_callback(self.token, &mut *stream);
                    return;
                }
                Ok(n) => match incomplete.advance(n) {
                    Ok(true) => {
                        let packet = incomplete.take_completed();
                        drop(incomplete);
                        on_message(packet);
                    }
                    Ok(false) => continue,
                    Err(err) => {
                        warn!(%err, "bad packet framing, dropping connection");
                        let mut stream = self.stream.lock();
                        self.reactor.remove_from_callback(self.token, &mut *stream);
                        return;
                    }
                },
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    trace!(%err, "subscriber read failed");
                    let mut stream = self.stream.lock();
                    self.reactor.remove_from_callback(self.token, &mut *stream);
                    return;
                }
            }
        }

        let mut stream = self.stream.lock();
        if let Err(err) = self.reactor.reactivate(self.token, &mut *stream) {
            warn!(%err, "failed to reactivate subscriber socket");
        }
    }

    pub fn peer_fd(&self) -> i32 {
        self.stream.lock().as_raw_fd()
    }
}

impl Drop for TcpSubscriber {
    fn drop(&mut self) {
        let mut stream = self.stream.lock();
        self.reactor.remove(self.token, &mut *stream);
    }
}
