//! Unit runtime: the process-level container applications build on top of
//! a [`TransportManager`] and, optionally, a [`CoordinatorConnector`].
//!
//! Grounded in `unit.h`'s `Unit`/`SingleThreadedUnit`/`MultiThreadedUnit`.
//! The original also generates per-unit subscribe/advertise/synchronizer
//! wiring from a YAML handler description; that code generator is outside
//! this crate's scope (spec.md names the runtime pieces it would call, not
//! the generator itself), so [`wire_all2`] and [`wire_field_equal2`] stand
//! in as the hand-written equivalent of what generated glue would produce.

use crate::publisher_info::TransportManagerInfo;
use crate::queue::{SubscriberOverallQueue, SubscriberQueue};
use crate::sync::{All2, FieldEqual2, SlotConfig};
use crate::time::MonotonicTime;
use crate::transport::{MessageSerializer, Publisher, Subscriber};
use crate::transport_manager::TransportManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Pumps a [`CoordinatorConnector`](crate::coordinator_connector::CoordinatorConnector)
/// if present: receive whatever it has buffered, hand its `NetworkInfo` to
/// the transport manager, then publish this process's own topology and any
/// newly-registered schemas back out.
fn pump_coordinator(transport_manager: &TransportManager, coordinator: &crate::coordinator_connector::CoordinatorConnector) {
    coordinator.update();
    if !coordinator.is_connected() {
        return;
    }
    transport_manager.handle_network_info(coordinator.network_info());

    let info: TransportManagerInfo = transport_manager.transport_manager_info();
    coordinator.send_transport_manager_info(info);

    let schemas = transport_manager.schema_manager().lock().consume_schemas_to_send();
    coordinator.send_schemas(schemas);
}

/// Single-threaded unit: every subscriber callback is queued rather than
/// run inline, and `update()` is the only place user code actually runs.
/// This gives handlers a single-threaded illusion — no two handlers, and
/// no handler and `update()`'s own bookkeeping, ever run concurrently —
/// at the cost of a bounded delivery latency of one `update()` cycle.
pub struct SingleThreadedUnit {
    transport_manager: Arc<TransportManager>,
    coordinator: Option<Arc<crate::coordinator_connector::CoordinatorConnector>>,
    output_queue: Arc<SubscriberOverallQueue>,
}

impl SingleThreadedUnit {
    pub fn new(transport_manager: Arc<TransportManager>, coordinator: Option<Arc<crate::coordinator_connector::CoordinatorConnector>>) -> Self {
        Self {
            transport_manager,
            coordinator,
            output_queue: SubscriberOverallQueue::new(),
        }
    }

    pub fn transport_manager(&self) -> &Arc<TransportManager> {
        &self.transport_manager
    }

    /// Advertises `topic` directly through the transport manager — publish
    /// calls don't go through the output queue, only deliveries do.
    pub fn advertise<T, S>(&self, topic: &str) -> crate::error::Result<Arc<Publisher<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        S: MessageSerializer<T>,
    {
        self.transport_manager.advertise::<T, S>(topic)
    }

    /// Subscribes to `topic`. `handler` never runs on the delivering
    /// transport's own thread: the delivery instead becomes one entry in
    /// this unit's output queue, and `handler` only actually runs inside a
    /// later [`Self::update`] call. `queue_limit` bounds how many
    /// undelivered messages this particular subscription may accumulate
    /// before the oldest is dropped (`0` = unbounded).
    pub fn subscribe<T, S>(
        &self,
        topic: &str,
        handler: impl Fn(Arc<T>) + Send + Sync + 'static,
        queue_limit: usize,
    ) -> crate::error::Result<Arc<Subscriber<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        S: MessageSerializer<T>,
    {
        let handler = Arc::new(handler);
        let queue = SubscriberQueue::new(self.output_queue.clone(), queue_limit);
        self.transport_manager.subscribe::<T, S>(topic, move |msg| {
            let handler = handler.clone();
            queue.add_callback(move || handler(msg));
        })
    }

    /// One update cycle: pump the coordinator connector (if any), sweep
    /// the transport manager's publisher registry, then drain the output
    /// queue, blocking up to `sleep_time_s` for the first delivery if the
    /// queue is currently empty.
    pub fn update(&self, sleep_time_s: f64) {
        if let Some(coordinator) = &self.coordinator {
            pump_coordinator(&self.transport_manager, coordinator);
        }
        self.transport_manager.update();
        self.output_queue.process_callbacks(Duration::from_secs_f64(sleep_time_s.max(0.0)));
    }
}

/// Multi-threaded unit: subscriber callbacks run inline, on whatever
/// thread the delivering transport dispatches on (a reactor worker for
/// TCP, the publishing thread itself for in-process). `update()` only
/// does the coordinator/transport-manager bookkeeping; there's no output
/// queue to drain. User handlers registered here must be `Send + Sync`
/// and safe to call concurrently with themselves and each other.
pub struct MultiThreadedUnit {
    transport_manager: Arc<TransportManager>,
    coordinator: Option<Arc<crate::coordinator_connector::CoordinatorConnector>>,
}

impl MultiThreadedUnit {
    pub fn new(transport_manager: Arc<TransportManager>, coordinator: Option<Arc<crate::coordinator_connector::CoordinatorConnector>>) -> Self {
        Self { transport_manager, coordinator }
    }

    pub fn transport_manager(&self) -> &Arc<TransportManager> {
        &self.transport_manager
    }

    pub fn advertise<T, S>(&self, topic: &str) -> crate::error::Result<Arc<Publisher<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        S: MessageSerializer<T>,
    {
        self.transport_manager.advertise::<T, S>(topic)
    }

    pub fn subscribe<T, S>(&self, topic: &str, handler: impl Fn(Arc<T>) + Send + Sync + 'static) -> crate::error::Result<Arc<Subscriber<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        S: MessageSerializer<T>,
    {
        self.transport_manager.subscribe::<T, S>(topic, handler)
    }

    pub fn update(&self) {
        if let Some(coordinator) = &self.coordinator {
            pump_coordinator(&self.transport_manager, coordinator);
        }
        self.transport_manager.update();
    }
}

/// Wires two topics through an [`All2`] synchronizer on a single-threaded
/// unit: each topic's delivery feeds the matching slot, and `callback`
/// runs (on a later `update()`) once the join's readiness rule is
/// satisfied. Stands in for the per-handler glue a YAML-driven code
/// generator would otherwise emit.
pub fn wire_all2<A, B, SA, SB>(
    unit: &SingleThreadedUnit,
    topic_a: &str,
    topic_b: &str,
    cfg_a: SlotConfig,
    cfg_b: SlotConfig,
    callback: impl Fn(MonotonicTime, Option<Arc<A>>, Option<Arc<B>>) + Send + Sync + 'static,
) -> crate::error::Result<(Arc<Subscriber<A>>, Arc<Subscriber<B>>)>
where
    A: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: Serialize + DeserializeOwned + Send + Sync + 'static,
    SA: MessageSerializer<A>,
    SB: MessageSerializer<B>,
{
    let sync = Arc::new(All2::<A, B>::new(cfg_a, cfg_b, callback));
    let sync_a = sync.clone();
    let sub_a = unit.subscribe::<A, SA>(topic_a, move |msg| sync_a.on_message_a(msg), 0)?;
    let sync_b = sync;
    let sub_b = unit.subscribe::<B, SB>(topic_b, move |msg| sync_b.on_message_b(msg), 0)?;
    Ok((sub_a, sub_b))
}

/// Like [`wire_all2`], but joins on an extracted field via
/// [`FieldEqual2`] instead of plain slot-fullness.
#[allow(clippy::too_many_arguments)]
pub fn wire_field_equal2<A, B, K, SA, SB>(
    unit: &SingleThreadedUnit,
    topic_a: &str,
    topic_b: &str,
    key_a: Option<Box<dyn Fn(&A) -> K + Send + Sync>>,
    key_b: Option<Box<dyn Fn(&B) -> K + Send + Sync>>,
    callback: impl Fn(MonotonicTime, Arc<A>, Arc<B>) + Send + Sync + 'static,
) -> crate::error::Result<(Arc<Subscriber<A>>, Arc<Subscriber<B>>)>
where
    A: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: Serialize + DeserializeOwned + Send + Sync + 'static,
    K: PartialEq + PartialOrd + Copy + Send + Sync + 'static,
    SA: MessageSerializer<A>,
    SB: MessageSerializer<B>,
{
    let sync = Arc::new(FieldEqual2::<A, B, K>::new(key_a, key_b, callback));
    let sync_a = sync.clone();
    let sub_a = unit.subscribe::<A, SA>(topic_a, move |msg| sync_a.on_message_a(msg), 0)?;
    let sync_b = sync;
    let sub_b = unit.subscribe::<B, SB>(topic_b, move |msg| sync_b.on_message_b(msg), 0)?;
    Ok((sub_a, sub_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BincodeSerializer;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn single_threaded_unit_delivers_only_on_update() {
        let transport_manager = Arc::new(TransportManager::new(true));
        let unit = SingleThreadedUnit::new(transport_manager.clone(), None);

        let received = Arc::new(AtomicU32::new(0));
        let received_clone = received.clone();
        let _subscriber = unit
            .subscribe::<u32, BincodeSerializer<u32>>(
                "/count",
                move |msg| {
                    received_clone.store(*msg, Ordering::SeqCst);
                },
                0,
            )
            .unwrap();

        let publisher = unit.advertise::<u32, BincodeSerializer<u32>>("/count").unwrap();
        unit.update(0.0);
        publisher.publish::<BincodeSerializer<u32>>(7).unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 0, "delivery must wait for update()");
        unit.update(0.1);
        assert_eq!(received.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn wire_all2_fires_once_both_topics_have_delivered() {
        let transport_manager = Arc::new(TransportManager::new(true));
        let unit = SingleThreadedUnit::new(transport_manager, None);

        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = fired.clone();
        let _subs = wire_all2::<u32, u32, BincodeSerializer<u32>, BincodeSerializer<u32>>(
            &unit,
            "/a",
            "/b",
            SlotConfig::REQUIRED,
            SlotConfig::REQUIRED,
            move |_, a, b| {
                assert!(a.is_some() && b.is_some());
                fired_clone.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        let pub_a = unit.advertise::<u32, BincodeSerializer<u32>>("/a").unwrap();
        let pub_b = unit.advertise::<u32, BincodeSerializer<u32>>("/b").unwrap();
        unit.update(0.0);

        pub_a.publish::<BincodeSerializer<u32>>(1).unwrap();
        unit.update(0.1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        pub_b.publish::<BincodeSerializer<u32>>(2).unwrap();
        unit.update(0.1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
