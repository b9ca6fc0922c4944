//! Users, principals and friend requests

use super::{PrincipalId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "group" => Some(Self::Group),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendRequestState {
    Pending,
    Accepted,
    Rejected,
}

impl FriendRequestState {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for FriendRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: i64,
    pub from_id: UserId,
    pub to_id: UserId,
    pub message: String,
    pub state: FriendRequestState,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub user_name: String,
    pub nickname: String,
}

/// Search hit: a user or a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalSummary {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_round_trip_of_enums() {
        for state in [
            FriendRequestState::Pending,
            FriendRequestState::Accepted,
            FriendRequestState::Rejected,
        ] {
            assert_eq!(FriendRequestState::from_db(state.to_db()), Some(state));
        }
        assert_eq!(PrincipalKind::from_db("group"), Some(PrincipalKind::Group));
        assert_eq!(PrincipalKind::from_db("robot"), None);
    }
}
