//! Events pushed to live connections
//!
//! Every frame uses one wire shape, `{fromId, toId, msgId, details}`:
//! - `msgId != 0`: `details` is the serialized [`ChatMessage`] (with its
//!   `kind` and `isDeleted` flag)
//! - `msgId == 0`: no specific message; `details` describes a membership
//!   change and the client should re-fetch its lists

use crate::models::{ChatMessage, GroupId, PrincipalId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MembershipChange {
    #[serde(rename = "friend-removed")]
    FriendRemoved {
        #[serde(rename = "friendA")]
        friend_a: UserId,
        #[serde(rename = "friendB")]
        friend_b: UserId,
    },
    #[serde(rename = "group-removed")]
    GroupRemoved {
        #[serde(rename = "groupId")]
        group_id: GroupId,
    },
    #[serde(rename = "reload")]
    Reload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    NewMessage(ChatMessage),
    MessageDeleted(ChatMessage),
    MembershipChanged {
        from: PrincipalId,
        to: PrincipalId,
        change: MembershipChange,
    },
}

/// Frame serialized onto the socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub from_id: i64,
    pub to_id: i64,
    pub msg_id: i64,
    pub details: String,
}

impl ChatEvent {
    /// Event type name for logs and metrics
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::NewMessage(_) => "message.new",
            ChatEvent::MessageDeleted(_) => "message.deleted",
            ChatEvent::MembershipChanged { .. } => "membership.changed",
        }
    }

    pub fn to_wire(&self) -> Result<WireEvent, serde_json::Error> {
        match self {
            ChatEvent::NewMessage(message) | ChatEvent::MessageDeleted(message) => {
                Ok(WireEvent {
                    from_id: message.sender_id.map(|s| s.0).unwrap_or(0),
                    to_id: message.receiver_id.0,
                    msg_id: message.id.0,
                    details: serde_json::to_string(message)?,
                })
            }
            ChatEvent::MembershipChanged { from, to, change } => Ok(WireEvent {
                from_id: from.0,
                to_id: to.0,
                msg_id: 0,
                details: serde_json::to_string(change)?,
            }),
        }
    }
}
