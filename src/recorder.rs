//! MCAP-backed recording: writes published wire payloads to disk with
//! channel/schema metadata a [`crate::replayer::Replayer`] (or any other
//! MCAP reader) can use to reconstruct what was recorded.
//!
//! Grounded in `recording/mcap_writer.h`'s `McapWriter`/`Recorder`. The
//! original wraps the C++ `mcap` library directly; here that's the `mcap`
//! crate, with the same topic→channel / schema-hash dedupe tables.

use crate::schema::{MessageSchema, MessageTypeInfo};
use crate::time::MonotonicTime;
use regex::RegexSet;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// MCAP profile string every file this crate writes carries (spec.md
/// §6.3).
pub const PROFILE: &str = "basis";

type McapWriter = mcap::Writer<BufWriter<File>>;

/// Per-topic registration outcome: either the topic matched a record
/// filter and got a channel, or it didn't and future writes for it are
/// silently skipped.
enum TopicChannel {
    Recorded { channel: Arc<mcap::Channel<'static>>, sequence: u32 },
    Filtered,
}

/// Synchronous MCAP sink. `write_message` blocks for the duration of the
/// underlying file write; see [`AsyncRecorder`] for a non-blocking front.
pub struct Recorder {
    path: PathBuf,
    filters: RegexSet,
    writer: McapWriter,
    channels: HashMap<String, TopicChannel>,
    schemas: HashMap<String, Arc<mcap::Schema<'static>>>,
}

impl Recorder {
    /// `topic_filters` are regexes; a topic recorded only if it matches at
    /// least one (an empty filter set matches nothing, per
    /// `RegexSet`'s semantics — pass `["."]`/`[".*"]` to record everything).
    pub fn create(path: impl AsRef<Path>, topic_filters: &[String]) -> crate::error::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(crate::error::Error::Io)?;
        let writer = mcap::WriteOptions::new()
            .profile(PROFILE)
            .create(BufWriter::new(file))
            .map_err(|err| crate::error::Error::Mcap(err.to_string()))?;
        let filters = RegexSet::new(topic_filters).map_err(|err| crate::error::Error::Mcap(err.to_string()))?;
        Ok(Self {
            path,
            filters,
            writer,
            channels: HashMap::new(),
            schemas: HashMap::new(),
        })
    }

    /// Registers `topic` if it matches a configured filter, creating its
    /// MCAP channel (and schema, deduped by hash) eagerly. Topics that
    /// don't match still get an entry so `write_message` can skip them in
    /// O(1) rather than re-testing the filters on every call.
    pub fn register_topic(&mut self, topic: &str, type_info: &MessageTypeInfo, schema: &MessageSchema) -> crate::error::Result<()> {
        if self.channels.contains_key(topic) {
            return Ok(());
        }
        if !self.filters.is_match(topic) {
            self.channels.insert(topic.to_string(), TopicChannel::Filtered);
            return Ok(());
        }

        let schema_arc = match self.schemas.get(&schema.content_hash_key()) {
            Some(existing) => existing.clone(),
            None => {
                let built = Arc::new(mcap::Schema {
                    name: schema.name.clone(),
                    encoding: type_info.mcap_schema_encoding.clone(),
                    data: Cow::Owned(schema.schema.clone().into_bytes()),
                });
                self.schemas.insert(schema.content_hash_key(), built.clone());
                built
            }
        };

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("serializer".to_string(), type_info.serializer.clone());
        metadata.insert("hash_id".to_string(), schema.hash_id.clone());
        metadata.insert("readable_schema".to_string(), schema.schema.clone());

        let channel = Arc::new(mcap::Channel {
            topic: topic.to_string(),
            schema: Some(schema_arc),
            message_encoding: type_info.mcap_message_encoding.clone(),
            metadata,
        });
        self.writer.add_channel(&channel).map_err(|err| crate::error::Error::Mcap(err.to_string()))?;

        self.channels.insert(topic.to_string(), TopicChannel::Recorded { channel, sequence: 0 });
        Ok(())
    }

    /// Writes one message verbatim to `topic`'s channel. Silently skipped
    /// if the topic never matched a filter, or was never registered.
    pub fn write_message(&mut self, topic: &str, payload: &[u8], time: MonotonicTime) -> crate::error::Result<()> {
        let Some(entry) = self.channels.get_mut(topic) else {
            warn!(topic, "write_message for a topic that was never registered");
            return Ok(());
        };
        let TopicChannel::Recorded { channel, sequence } = entry else {
            return Ok(());
        };

        let message = mcap::Message {
            channel: channel.clone(),
            sequence: *sequence,
            log_time: time.nsecs,
            publish_time: time.nsecs,
            data: Cow::Borrowed(payload),
        };
        *sequence += 1;
        self.writer.write(&message).map_err(|err| crate::error::Error::Mcap(err.to_string()))
    }

    /// Closes the current file and opens a fresh one at `new_path`,
    /// resetting the channel/schema tables (a split file re-declares its
    /// own channels, same as starting a brand new recording).
    pub fn split(&mut self, new_path: impl AsRef<Path>) -> crate::error::Result<()> {
        self.finish()?;

        let new_path = new_path.as_ref().to_path_buf();
        let file = File::create(&new_path).map_err(crate::error::Error::Io)?;
        self.writer = mcap::WriteOptions::new()
            .profile(PROFILE)
            .create(BufWriter::new(file))
            .map_err(|err| crate::error::Error::Mcap(err.to_string()))?;
        self.path = new_path;
        self.channels.clear();
        self.schemas.clear();
        Ok(())
    }

    pub fn finish(&mut self) -> crate::error::Result<()> {
        self.writer.finish().map_err(|err| crate::error::Error::Mcap(err.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current on-disk size of the file being written, for a caller that
    /// wants to trigger [`Self::split`] once it crosses some threshold.
    /// `0` if the size can't be read (e.g. the file was removed out from
    /// under us).
    pub fn current_size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}

/// Queue entry for [`AsyncRecorder`]'s writer thread.
enum RecordEvent {
    RegisterTopic {
        topic: String,
        type_info: MessageTypeInfo,
        schema: MessageSchema,
    },
    Write {
        topic: String,
        payload: Vec<u8>,
        time: MonotonicTime,
    },
}

/// Fronts a [`Recorder`] with a bounded multi-producer queue serviced by a
/// dedicated writer thread, so publishers recording their own traffic
/// never block on disk I/O. Overflow drops the oldest queued event, same
/// policy as the subscriber callback queue (spec.md §4.7).
pub struct AsyncRecorder {
    shared: Arc<AsyncRecorderShared>,
    thread: Option<std::thread::JoinHandle<()>>,
}

struct AsyncRecorderShared {
    queue: parking_lot::Mutex<std::collections::VecDeque<RecordEvent>>,
    cv: parking_lot::Condvar,
    capacity: usize,
    stop: std::sync::atomic::AtomicBool,
}

impl AsyncRecorder {
    pub fn spawn(mut recorder: Recorder, capacity: usize) -> Self {
        let shared = Arc::new(AsyncRecorderShared {
            queue: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            cv: parking_lot::Condvar::new(),
            capacity,
            stop: std::sync::atomic::AtomicBool::new(false),
        });

        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("basis-recorder-writer".into())
            .spawn(move || loop {
                let batch = {
                    let mut queue = thread_shared.queue.lock();
                    if !thread_shared.stop.load(std::sync::atomic::Ordering::Relaxed) && queue.is_empty() {
                        thread_shared.cv.wait(&mut queue);
                    }
                    if queue.is_empty() && thread_shared.stop.load(std::sync::atomic::Ordering::Relaxed) {
                        return;
                    }
                    std::mem::take(&mut *queue)
                };
                for event in batch {
                    if let Err(err) = apply_event(&mut recorder, event) {
                        warn!(%err, "async recorder write failed");
                    }
                }
                if thread_shared.stop.load(std::sync::atomic::Ordering::Relaxed) {
                    let _ = recorder.finish();
                    return;
                }
            })
            .expect("failed to spawn async recorder writer thread");

        Self {
            shared,
            thread: Some(thread),
        }
    }

    fn push(&self, event: RecordEvent) {
        let mut queue = self.shared.queue.lock();
        queue.push_back(event);
        if queue.len() > self.shared.capacity {
            debug!(len = queue.len(), capacity = self.shared.capacity, "async recorder queue full, dropping oldest");
            queue.pop_front();
        }
        drop(queue);
        self.shared.cv.notify_one();
    }

    pub fn register_topic(&self, topic: &str, type_info: MessageTypeInfo, schema: MessageSchema) {
        self.push(RecordEvent::RegisterTopic {
            topic: topic.to_string(),
            type_info,
            schema,
        });
    }

    pub fn write_message(&self, topic: &str, payload: &[u8], time: MonotonicTime) {
        self.push(RecordEvent::Write {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            time,
        });
    }
}

fn apply_event(recorder: &mut Recorder, event: RecordEvent) -> crate::error::Result<()> {
    match event {
        RecordEvent::RegisterTopic { topic, type_info, schema } => recorder.register_topic(&topic, &type_info, &schema),
        RecordEvent::Write { topic, payload, time } => recorder.write_message(&topic, &payload, time),
    }
}

impl Drop for AsyncRecorder {
    fn drop(&mut self) {
        self.shared.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        self.shared.cv.notify_one();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn type_info() -> MessageTypeInfo {
        MessageTypeInfo {
            serializer: "raw".into(),
            name: "raw.Bytes".into(),
            mcap_message_encoding: "raw".into(),
            mcap_schema_encoding: "raw".into(),
        }
    }

    fn schema() -> MessageSchema {
        MessageSchema {
            serializer: "raw".into(),
            name: "raw.Bytes".into(),
            schema: String::new(),
            hash_id: "raw:raw.Bytes".into(),
        }
    }

    /// Scenario E: register `/t`, write three payloads at three times, read
    /// the file back and find exactly one channel and three matching
    /// messages.
    #[test]
    fn recorder_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mcap");

        let mut recorder = Recorder::create(&path, &[".*".to_string()]).unwrap();
        recorder.register_topic("/t", &type_info(), &schema()).unwrap();
        recorder.write_message("/t", &[0x01], MonotonicTime::from_nanos(100)).unwrap();
        recorder.write_message("/t", &[0x02, 0x03], MonotonicTime::from_nanos(200)).unwrap();
        recorder.write_message("/t", &[0x04], MonotonicTime::from_nanos(300)).unwrap();
        recorder.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let messages: Vec<_> = mcap::MessageStream::new(&bytes).unwrap().collect::<Result<Vec<_>, _>>().unwrap();

        assert_eq!(messages.len(), 3);
        let topics: std::collections::HashSet<_> = messages.iter().map(|m| m.channel.topic.clone()).collect();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics.into_iter().next().unwrap(), "/t");

        let payloads: Vec<Vec<u8>> = messages.iter().map(|m| m.data.to_vec()).collect();
        assert_eq!(payloads, vec![vec![0x01], vec![0x02, 0x03], vec![0x04]]);
        let times: Vec<u64> = messages.iter().map(|m| m.log_time).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn unmatched_topic_is_skipped_silently() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mcap");
        let mut recorder = Recorder::create(&path, &["^/keep$".to_string()]).unwrap();
        recorder.register_topic("/drop", &type_info(), &schema()).unwrap();
        recorder.write_message("/drop", &[0xAA], MonotonicTime::from_nanos(1)).unwrap();
        recorder.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let messages: Vec<_> = mcap::MessageStream::new(&bytes).unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        assert!(messages.is_empty());
    }
}
