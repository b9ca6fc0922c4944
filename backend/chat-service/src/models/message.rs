//! Chat messages and history pagination

use super::{GroupId, MessageId, PrincipalId, UserId};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use error_types::error_codes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message content kind
///
/// Deserializing accepts any string; unrecognized names become `Unknown`,
/// which [`MessageKind::require_client_kind`] rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum MessageKind {
    Unknown,
    PlainText,
    Image,
    File,
    RichXml,
    /// Generated by the server on membership changes
    System,
}

impl MessageKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "PlainText" => Self::PlainText,
            "Image" => Self::Image,
            "File" => Self::File,
            "RichXml" => Self::RichXml,
            "System" => Self::System,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::PlainText => "PlainText",
            Self::Image => "Image",
            Self::File => "File",
            Self::RichXml => "RichXml",
            Self::System => "System",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match Self::parse(s) {
            Self::Unknown => None,
            kind => Some(kind),
        }
    }

    pub fn to_db(&self) -> &'static str {
        self.as_str()
    }

    /// Kinds a client may send; `System` is server-only
    pub fn require_client_kind(self) -> Result<Self, AppError> {
        match self {
            Self::PlainText | Self::Image | Self::File | Self::RichXml => Ok(self),
            Self::System | Self::Unknown => Err(AppError::BadRequest {
                code: error_codes::INVALID_MESSAGE_KIND,
                message: "kind must be one of PlainText, Image, File, RichXml".into(),
            }),
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable once stored; deletion only sets the tombstone fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: Option<UserId>,
    pub receiver_id: PrincipalId,
    pub kind: MessageKind,
    pub content: String,
    pub send_time: DateTime<Utc>,
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: Option<UserId>,
    pub receiver_id: PrincipalId,
    pub kind: MessageKind,
    pub content: String,
}

impl NewMessage {
    pub fn system(sender_id: UserId, receiver_id: impl Into<PrincipalId>, content: String) -> Self {
        Self {
            sender_id: Some(sender_id),
            receiver_id: receiver_id.into(),
            kind: MessageKind::System,
            content,
        }
    }
}

/// Which history a query reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversation {
    /// Messages exchanged between two users, in both directions
    Direct(UserId, UserId),
    Group(GroupId),
}

impl Conversation {
    pub fn contains(&self, message: &ChatMessage) -> bool {
        match *self {
            Conversation::Direct(a, b) => {
                let (pa, pb) = (PrincipalId::from(a), PrincipalId::from(b));
                match message.sender_id.map(PrincipalId::from) {
                    Some(sender) => {
                        (sender == pa && message.receiver_id == pb)
                            || (sender == pb && message.receiver_id == pa)
                    }
                    None => false,
                }
            }
            Conversation::Group(group) => message.receiver_id == PrincipalId::from(group),
        }
    }
}

/// Every conversation a message search reads, all seen from `user`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageScope {
    pub user: UserId,
    /// Direct conversations between `user` and each peer
    pub peers: Vec<UserId>,
    pub groups: Vec<GroupId>,
}

impl MessageScope {
    /// Exactly one conversation of `user`
    pub fn of(user: UserId, conversation: Conversation) -> Self {
        match conversation {
            Conversation::Direct(a, b) => Self {
                user,
                peers: vec![if a == user { b } else { a }],
                groups: Vec::new(),
            },
            Conversation::Group(group) => Self {
                user,
                peers: Vec::new(),
                groups: vec![group],
            },
        }
    }

    pub fn contains(&self, message: &ChatMessage) -> bool {
        self.peers
            .iter()
            .any(|peer| Conversation::Direct(self.user, *peer).contains(message))
            || self
                .groups
                .iter()
                .any(|group| Conversation::Group(*group).contains(message))
    }
}

/// Cursor direction; both bounds are inclusive of the cursor id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Before,
    After,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            other => Err(AppError::bad_request(format!(
                "direction must be before or after, got {other:?}"
            ))),
        }
    }
}

/// One page of history in ascending id order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}

impl MessagePage {
    /// Build a page from up to `limit + 1` rows fetched in cursor order
    /// (descending for `Before`, ascending for `After`)
    pub fn from_overfetch(mut rows: Vec<ChatMessage>, limit: usize, direction: Direction) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        if direction == Direction::Before {
            rows.reverse();
        }
        Self {
            messages: rows,
            has_more,
        }
    }
}

/// One page of search hits, newest first
///
/// `total_count` is only computed for the first page (no cursor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSearchPage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    pub total_count: Option<i64>,
}

impl MessageSearchPage {
    pub fn from_overfetch(mut rows: Vec<ChatMessage>, limit: usize, total_count: Option<i64>) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        Self {
            messages: rows,
            has_more,
            total_count,
        }
    }
}
