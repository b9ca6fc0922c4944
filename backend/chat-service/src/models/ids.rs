//! Integer identifiers
//!
//! Users and groups share one principal id sequence, so a `PrincipalId`
//! names exactly one user or one group for its whole lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Account identity, stable for the account's lifetime
    UserId
);
id_type!(GroupId);
id_type!(
    /// A user or a group
    PrincipalId
);
id_type!(
    /// Monotonically increasing message id
    MessageId
);

impl From<UserId> for PrincipalId {
    fn from(id: UserId) -> Self {
        PrincipalId(id.0)
    }
}

impl From<GroupId> for PrincipalId {
    fn from(id: GroupId) -> Self {
        PrincipalId(id.0)
    }
}

impl From<actix_middleware::UserId> for UserId {
    fn from(id: actix_middleware::UserId) -> Self {
        UserId(id.0)
    }
}
