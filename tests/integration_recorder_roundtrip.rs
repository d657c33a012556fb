//! Registers one topic, writes three raw payloads at three distinct
//! times, and reads the resulting MCAP file back to confirm exactly one
//! channel and three messages with matching bytes and timestamps.

use basis_rs::recorder::Recorder;
use basis_rs::schema::{MessageSchema, MessageTypeInfo};
use basis_rs::time::MonotonicTime;

fn raw_type_info() -> MessageTypeInfo {
    MessageTypeInfo {
        serializer: "raw".into(),
        name: "raw.Bytes".into(),
        mcap_message_encoding: "raw".into(),
        mcap_schema_encoding: "raw".into(),
    }
}

fn raw_schema() -> MessageSchema {
    MessageSchema {
        serializer: "raw".into(),
        name: "raw.Bytes".into(),
        schema: String::new(),
        hash_id: "raw:raw.Bytes".into(),
    }
}

#[test]
fn three_payloads_roundtrip_through_one_channel() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.mcap");

    let mut recorder = Recorder::create(&path, &[".*".to_string()]).expect("create recorder");
    recorder.register_topic("/t", &raw_type_info(), &raw_schema()).expect("register topic");
    recorder.write_message("/t", &[0x01], MonotonicTime::from_nanos(100)).expect("write 1");
    recorder.write_message("/t", &[0x02, 0x03], MonotonicTime::from_nanos(200)).expect("write 2");
    recorder.write_message("/t", &[0x04], MonotonicTime::from_nanos(300)).expect("write 3");
    recorder.finish().expect("finish");

    let bytes = std::fs::read(&path).expect("read back recording");
    let messages: Vec<_> = mcap::MessageStream::new(&bytes)
        .expect("open message stream")
        .collect::<Result<Vec<_>, _>>()
        .expect("decode messages");

    assert_eq!(messages.len(), 3);

    let channels: std::collections::HashSet<_> = messages.iter().map(|m| m.channel.topic.clone()).collect();
    assert_eq!(channels.len(), 1);
    assert!(channels.contains("/t"));

    let payloads: Vec<Vec<u8>> = messages.iter().map(|m| m.data.to_vec()).collect();
    assert_eq!(payloads, vec![vec![0x01], vec![0x02, 0x03], vec![0x04]]);

    let times: Vec<u64> = messages.iter().map(|m| m.log_time).collect();
    assert_eq!(times, vec![100, 200, 300]);
}
