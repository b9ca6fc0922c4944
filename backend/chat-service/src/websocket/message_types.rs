use serde::{Deserialize, Serialize};

/// Control frames a client may send over the socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsInboundEvent {
    Ping,
    /// Re-resolve this connection's channels from the store
    Resync,
}

/// Replies to inbound control frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsControlReply {
    Pong,
    Resynced {
        #[serde(rename = "channelCount")]
        channel_count: usize,
    },
    Error {
        code: String,
        message: String,
    },
}
