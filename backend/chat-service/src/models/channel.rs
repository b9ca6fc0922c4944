use super::{GroupId, PrincipalId, UserId};
use std::fmt;

/// Broadcast topic keyed by a principal id
///
/// `User(id)` is both the self channel of `id` and the channel its friends
/// subscribe to; `Group(id)` carries group traffic to members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    User(UserId),
    Group(GroupId),
}

impl Channel {
    pub fn principal(&self) -> PrincipalId {
        match self {
            Channel::User(id) => (*id).into(),
            Channel::Group(id) => (*id).into(),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::User(id) => write!(f, "user:{id}"),
            Channel::Group(id) => write!(f, "group:{id}"),
        }
    }
}

impl From<UserId> for Channel {
    fn from(id: UserId) -> Self {
        Channel::User(id)
    }
}

impl From<GroupId> for Channel {
    fn from(id: GroupId) -> Self {
        Channel::Group(id)
    }
}
