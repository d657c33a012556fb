//! The coordinator wire protocol (spec.md §6.2): what a transport manager's
//! coordinator connector sends, and what the coordinator sends back.

use crate::publisher_info::{NetworkInfo, TransportManagerInfo};
use crate::schema::MessageSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientToCoordinatorMessage {
    TransportManagerInfo(TransportManagerInfo),
    Schemas(Vec<MessageSchema>),
    RequestSchemas(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoordinatorMessage {
    NetworkInfo(NetworkInfo),
    Schemas(Vec<MessageSchema>),
    Error(String),
}
