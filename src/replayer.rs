//! Replays a recorded MCAP file by re-advertising its channels as raw
//! publishers and re-publishing each message at the wall-clock pace it was
//! originally recorded at.
//!
//! Grounded in `recording/mcap_replayer.h`'s `Replayer`: scan the file's
//! channels, advertise one raw publisher per channel (plus a synthetic
//! `/time` channel), then walk messages in log-time order, sleeping
//! between them so playback runs at real speed rather than as fast as the
//! disk can deliver.

use crate::schema::MessageSchema;
use crate::time::MonotonicTime;
use crate::transport::{Publisher, RawSerializer};
use crate::transport_manager::TransportManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Published on `/time` once per playback tick (spec.md §4.14).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedTimeTick {
    pub nsecs: u64,
    pub run_token: u64,
}

/// Playback tick period: how often `/time` is published and progress is
/// re-checked, regardless of message density.
const TICK: Duration = Duration::from_millis(10);

struct RecordedMessage {
    topic: String,
    log_time: u64,
    payload: Vec<u8>,
}

struct Channel {
    schema: MessageSchema,
}

/// Reads an MCAP recording and republishes it through a
/// [`TransportManager`], at the pace it was recorded.
pub struct Replayer {
    path: PathBuf,
    channels: HashMap<String, Channel>,
    messages: Vec<RecordedMessage>,
}

impl Replayer {
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(crate::error::Error::Io)?;

        let mut channels = HashMap::new();
        let mut messages = Vec::new();

        for message in mcap::MessageStream::new(&bytes).map_err(|err| crate::error::Error::Mcap(err.to_string()))? {
            let message = message.map_err(|err| crate::error::Error::Mcap(err.to_string()))?;
            let topic = message.channel.topic.clone();

            channels.entry(topic.clone()).or_insert_with(|| channel_info(&message.channel));

            messages.push(RecordedMessage {
                topic,
                log_time: message.log_time,
                payload: message.data.to_vec(),
            });
        }
        messages.sort_by_key(|m| m.log_time);

        info!(path = %path.display(), channels = channels.len(), messages = messages.len(), "opened recording for replay");
        Ok(Self { path, channels, messages })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Advertises one raw publisher per recorded channel, plus `/time`,
    /// then republishes every message in log-time order at wall-clock
    /// pace. Ticks every [`TICK`], publishing `/time` and advancing the
    /// global simulated clock each tick regardless of whether a message is
    /// due, so other units in the process see the same time axis the
    /// recording was made on. Loops indefinitely if `looping`.
    pub fn replay(&self, transport_manager: &TransportManager, run_token: u64, looping: bool) -> crate::error::Result<()> {
        let mut publishers = HashMap::new();
        for (topic, channel) in &self.channels {
            transport_manager.schema_manager().lock().register(channel.schema.clone());
            let publisher = transport_manager.advertise::<Vec<u8>, RawSerializer>(topic)?;
            publishers.insert(topic.clone(), publisher);
        }
        let time_publisher = transport_manager.advertise::<SimulatedTimeTick, crate::transport::BincodeSerializer<SimulatedTimeTick>>("/time")?;

        loop {
            self.replay_once(&publishers, &time_publisher, run_token)?;
            if !looping {
                break;
            }
        }
        MonotonicTime::clear_simulated_time();
        Ok(())
    }

    fn replay_once(
        &self,
        publishers: &HashMap<String, Arc<Publisher<Vec<u8>>>>,
        time_publisher: &Publisher<SimulatedTimeTick>,
        run_token: u64,
    ) -> crate::error::Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }
        let start_log_time = self.messages[0].log_time;
        let wall_start = Instant::now();
        let mut next_index = 0;

        loop {
            let elapsed = wall_start.elapsed().as_nanos() as u64;
            let target_log_time = start_log_time + elapsed;

            MonotonicTime::set_simulated_time(target_log_time, run_token);
            let tick = SimulatedTimeTick {
                nsecs: target_log_time,
                run_token,
            };
            time_publisher.publish::<crate::transport::BincodeSerializer<SimulatedTimeTick>>(tick)?;

            while next_index < self.messages.len() && self.messages[next_index].log_time <= target_log_time {
                let message = &self.messages[next_index];
                if let Some(publisher) = publishers.get(&message.topic) {
                    publisher.publish::<RawSerializer>(message.payload.clone())?;
                } else {
                    debug!(topic = %message.topic, "no publisher for recorded message's topic");
                }
                next_index += 1;
            }

            if next_index >= self.messages.len() {
                return Ok(());
            }
            std::thread::sleep(TICK);
        }
    }

    /// Synthesizes a [`TransportManagerInfo`] as if every replayed channel
    /// were actively published — useful for a `topic ls`-style tool that
    /// wants to see a recording's shape without starting playback.
    pub fn topics(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }
}

fn channel_info(channel: &mcap::Channel<'_>) -> Channel {
    let serializer = channel.metadata.get("serializer").cloned().unwrap_or_else(|| "raw".to_string());
    let hash_id = channel.metadata.get("hash_id").cloned().unwrap_or_default();
    let readable_schema = channel.metadata.get("readable_schema").cloned().unwrap_or_default();

    Channel {
        schema: MessageSchema {
            serializer,
            name: channel.topic.clone(),
            schema: readable_schema,
            hash_id,
        },
    }
}

static REPLAYER_RUN_TOKENS: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh run token for one replay invocation (spec.md §3's
/// "each simulation run has a distinct run_token").
pub fn next_run_token() -> u64 {
    REPLAYER_RUN_TOKENS.fetch_add(1, Ordering::Relaxed)
}
