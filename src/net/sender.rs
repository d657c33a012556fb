//! Per-peer TCP send thread: a background thread owns a blocking stream and
//! drains an outbound queue, tolerating short writes (`write_all` handles
//! that for us) and stopping at the first write error — mirroring the
//! original's `TcpSender`.

use crate::packet::MessagePacket;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

struct Shared {
    queue: Mutex<VecDeque<Arc<MessagePacket>>>,
    cv: Condvar,
    stop: AtomicBool,
}

/// Owns a dedicated thread that writes queued packets to one peer, in
/// order, until the connection breaks or [`TcpSender::stop`] is called.
pub struct TcpSender {
    shared: Arc<Shared>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl TcpSender {
    pub fn spawn(mut stream: std::net::TcpStream, peer: std::net::SocketAddr) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name(format!("basis-tcp-send-{peer}"))
            .spawn(move || {
                loop {
                    let batch = {
                        let mut queue = thread_shared.queue.lock();
                        if !thread_shared.stop.load(Ordering::Relaxed) && queue.is_empty() {
                            thread_shared.cv.wait(&mut queue);
                        }
                        if thread_shared.stop.load(Ordering::Relaxed) {
                            return;
                        }
                        std::mem::take(&mut *queue)
                    };

                    for message in batch {
                        trace!(peer = %peer, len = message.packet().len(), "sending");
                        if let Err(err) = stream.write_all(message.packet()) {
                            debug!(peer = %peer, %err, "send failed, stopping sender thread");
                            thread_shared.stop.store(true, Ordering::Relaxed);
                            return;
                        }
                    }
                }
            })
            .expect("failed to spawn tcp sender thread");

        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// Queues a packet for send. Silently dropped once the sender has
    /// stopped (the peer is gone); the caller learns this by the
    /// publisher reaping dead senders, not by an error here.
    pub fn send(&self, message: Arc<MessagePacket>) {
        if self.shared.stop.load(Ordering::Relaxed) {
            return;
        }
        self.shared.queue.lock().push_back(message);
        self.shared.cv.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Relaxed)
    }
}

impl Drop for TcpSender {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        self.shared.cv.notify_one();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
