//! One-shot, level-triggered readiness reactor.
//!
//! Mirrors the original's `Epoll`: a single dedicated thread blocks in
//! `mio::Poll::poll`, and on each readable event looks up that fd's
//! callback and dispatches it to a worker pool rather than running it
//! inline on the poll thread. Interest is one-shot — a handler must call
//! [`Reactor::reactivate`] once it's drained a socket back to `WouldBlock`,
//! or the reactor won't notify it again. A per-fd mutex serializes
//! dispatches for that fd and lets [`Reactor::remove`] wait out an
//! in-flight callback before the caller closes the underlying socket.
//!
//! `add`/`reactivate`/`remove` go through a `Registry` cloned off the
//! `Poll` at construction time instead of through `self.poll.lock()`, so
//! registering or tearing down a socket never waits behind the dedicated
//! thread's up-to-1s blocking `poll()` call.

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type Callback = Box<dyn Fn() + Send + Sync>;

struct Registration {
    callback: Callback,
    /// Serializes dispatch of this fd's callback against `remove`.
    busy: Mutex<()>,
}

/// A single-threaded `mio` reactor dispatching readiness events to a worker
/// pool. One instance is shared by every socket a transport registers.
pub struct Reactor {
    poll: Mutex<Poll>,
    registry: Registry,
    registrations: Arc<Mutex<HashMap<usize, Arc<Registration>>>>,
    workers: ThreadPool,
    stop: Arc<AtomicBool>,
    main_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Reactor {
    pub fn new(worker_threads: usize) -> std::io::Result<Arc<Self>> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let workers = ThreadPoolBuilder::new()
            .num_threads(worker_threads.max(1))
            .thread_name(|i| format!("basis-reactor-worker-{i}"))
            .build()
            .expect("failed to build reactor worker pool");

        let reactor = Arc::new(Self {
            poll: Mutex::new(poll),
            registry,
            registrations: Arc::new(Mutex::new(HashMap::new())),
            workers,
            stop: Arc::new(AtomicBool::new(false)),
            main_thread: Mutex::new(None),
        });

        let main_loop_reactor = reactor.clone();
        let handle = std::thread::Builder::new()
            .name("basis-reactor".into())
            .spawn(move || main_loop_reactor.main_thread_loop())
            .expect("failed to spawn reactor thread");
        *reactor.main_thread.lock() = Some(handle);

        Ok(reactor)
    }

    /// Registers `source` for one-shot readable events, keyed by `token`
    /// (typically the raw fd). `callback` runs on a worker thread whenever
    /// the fd becomes readable; it must call [`Reactor::reactivate`] to
    /// keep receiving events once it has drained the socket to `WouldBlock`.
    pub fn add<S: Source>(
        &self,
        token: usize,
        source: &mut S,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> std::io::Result<()> {
        self.registry.register(source, Token(token), Interest::READABLE)?;

        self.registrations.lock().insert(
            token,
            Arc::new(Registration {
                callback: Box::new(callback),
                busy: Mutex::new(()),
            }),
        );
        Ok(())
    }

    /// Re-arms one-shot interest for `token` after its handler drained the
    /// socket to `WouldBlock`.
    pub fn reactivate<S: Source>(&self, token: usize, source: &mut S) -> std::io::Result<()> {
        self.registry.reregister(source, Token(token), Interest::READABLE)
    }

    /// Deregisters `token` and blocks until any in-flight dispatch for it
    /// has finished, so the caller can safely close the socket right after.
    ///
    /// For use from any thread other than the reactor's own dispatch of
    /// `token`'s callback — typically a `Drop` impl tearing down the
    /// socket after the fact. Calling this from inside that callback
    /// deadlocks on `busy`, which the dispatch already holds for the
    /// duration of the call; use [`Reactor::remove_from_callback`] there.
    pub fn remove<S: Source>(&self, token: usize, source: &mut S) {
        let registration = self.registrations.lock().remove(&token);
        let _ = self.registry.deregister(source);
        if let Some(registration) = registration {
            let _guard = registration.busy.lock();
        }
    }

    /// Deregisters `token` without waiting on its `busy` lock.
    ///
    /// Only safe to call from within `token`'s own callback: the dispatch
    /// that invoked it already holds `busy` for the call's duration, so no
    /// concurrent dispatch of this fd can be in flight. Any other caller
    /// must use [`Reactor::remove`].
    pub fn remove_from_callback<S: Source>(&self, token: usize, source: &mut S) {
        self.registrations.lock().remove(&token);
        let _ = self.registry.deregister(source);
    }

    fn main_thread_loop(&self) {
        let mut events = Events::with_capacity(128);
        while !self.stop.load(Ordering::Relaxed) {
            let poll_result = self.poll.lock().poll(&mut events, Some(Duration::from_secs(1)));
            if let Err(err) = poll_result {
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                warn!(%err, "reactor poll failed");
                return;
            }

            for event in events.iter() {
                let token = event.token().0;
                let registrations = self.registrations.clone();
                self.workers.spawn(move || {
                    let registration = {
                        let map = registrations.lock();
                        map.get(&token).cloned()
                    };
                    let Some(registration) = registration else {
                        debug!(token, "event for already-removed fd, dropping");
                        return;
                    };
                    let _guard = registration.busy.lock();
                    (registration.callback)();
                });
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.main_thread.lock().take() {
            let _ = handle.join();
        }
    }
}
