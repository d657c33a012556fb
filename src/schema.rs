//! Message type metadata and the per-process schema registry.
//!
//! `MessageTypeInfo` and `MessageSchema` mirror the original's
//! `core::serialization` structs, extended with the MCAP encoding fields the
//! recorder and replayer need (see SPEC_FULL §11). `SchemaManager` tracks
//! which schemas have already been seen so a transport manager only ever
//! advertises a schema to the coordinator once.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifies the wire shape of a message type, independent of any one
/// schema's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTypeInfo {
    pub serializer: String,
    pub name: String,
    /// MCAP `messageEncoding` for this type's channel (e.g. `"json"`).
    pub mcap_message_encoding: String,
    /// MCAP `Schema::encoding` (e.g. `"jsonschema"`).
    pub mcap_schema_encoding: String,
}

impl MessageTypeInfo {
    pub fn new(serializer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            serializer: serializer.into(),
            name: name.into(),
            mcap_message_encoding: "json".to_string(),
            mcap_schema_encoding: "jsonschema".to_string(),
        }
    }
}

/// A schema document plus the metadata needed to look it up and to write it
/// to an MCAP file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSchema {
    pub serializer: String,
    pub name: String,
    pub schema: String,
    pub hash_id: String,
}

impl MessageSchema {
    /// The coordinator's schema-store key, per spec.md's glossary:
    /// `"<serializer>:<message_name>"`. Independent of `hash_id`, which is a
    /// separate field carried through to the recorder's MCAP channel
    /// metadata rather than used for registry lookups.
    pub fn schema_id(&self) -> String {
        format!("{}:{}", self.serializer, self.name)
    }

    /// Dedupe key for the recorder's `{schema_hash -> mcap_schema}` table
    /// (spec.md §4.13): prefers the content hash when the serializer
    /// supplied one, falling back to the registry key for serializers (like
    /// `"raw"`) that never populate `hash_id`.
    pub fn content_hash_key(&self) -> String {
        if self.hash_id.is_empty() {
            self.schema_id()
        } else {
            self.hash_id.clone()
        }
    }
}

/// Tracks which schemas a transport manager has already registered, and
/// buffers newly-seen ones until a caller drains them to forward onward.
#[derive(Default)]
pub struct SchemaManager {
    known: HashSet<String>,
    schemas_to_send: Vec<MessageSchema>,
}

impl SchemaManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema if it hasn't been seen before. Returns `true` if
    /// this call was the first registration (i.e. it was queued to send).
    pub fn register(&mut self, schema: MessageSchema) -> bool {
        let id = schema.schema_id();
        if self.known.insert(id) {
            self.schemas_to_send.push(schema);
            true
        } else {
            false
        }
    }

    /// Drains and returns every schema registered since the last drain.
    pub fn consume_schemas_to_send(&mut self) -> Vec<MessageSchema> {
        std::mem::take(&mut self.schemas_to_send)
    }

    pub fn known_schema_ids(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(hash: &str) -> MessageSchema {
        MessageSchema {
            serializer: "json".into(),
            name: "my.Message".into(),
            schema: "{}".into(),
            hash_id: hash.into(),
        }
    }

    #[test]
    fn registering_twice_only_queues_once() {
        let mut mgr = SchemaManager::new();
        assert!(mgr.register(schema("abc")));
        assert!(!mgr.register(schema("abc")));
        assert_eq!(mgr.consume_schemas_to_send().len(), 1);
    }

    #[test]
    fn consume_drains_and_resets() {
        let mut mgr = SchemaManager::new();
        mgr.register(schema("a"));
        mgr.register(schema("b"));
        assert_eq!(mgr.consume_schemas_to_send().len(), 2);
        assert!(mgr.consume_schemas_to_send().is_empty());
    }
}
