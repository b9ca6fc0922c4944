use crate::models::UserId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub mod broadcast;
pub mod events;
pub mod hub;
pub mod message_types;

pub use broadcast::{Audience, EventBroadcaster};
pub use events::{ChatEvent, MembershipChange, WireEvent};
pub use hub::{ConnectionState, RealtimeHub};

/// Opaque id issued to one live connection
///
/// A user may hold several handles at once (one per device or tab); a
/// reconnect always gets a fresh handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(Uuid);

impl ConnectionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct UserConnections {
    handles: HashSet<ConnectionHandle>,
    // Serializes subscription updates for this user (connect-time resolve
    // vs. membership mutations)
    sync: Arc<Mutex<()>>,
}

/// Tracks which live connections belong to which user
///
/// Entries are keyed per user; every add/remove runs inside that key's
/// entry lock, so unrelated users never contend on a shared lock. A user
/// has an entry exactly while it has at least one live connection.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<UserId, UserConnections>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the handle was already registered
    pub fn add(&self, user: UserId, handle: ConnectionHandle) -> bool {
        let mut entry = self.inner.entry(user).or_insert_with(|| UserConnections {
            handles: HashSet::new(),
            sync: Arc::new(Mutex::new(())),
        });
        let added = entry.handles.insert(handle);

        tracing::debug!(
            user_id = %user,
            connection = %handle,
            connections = entry.handles.len(),
            "Registered connection"
        );
        added
    }

    /// Removes the user's entry together with its last connection
    pub fn remove(&self, user: UserId, handle: ConnectionHandle) -> bool {
        match self.inner.entry(user) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().handles.remove(&handle);
                if entry.get().handles.is_empty() {
                    entry.remove();
                    tracing::debug!(user_id = %user, "User has no live connections left");
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Empty for users without live connections
    pub fn connections_of(&self, user: UserId) -> HashSet<ConnectionHandle> {
        self.inner
            .get(&user)
            .map(|entry| entry.handles.clone())
            .unwrap_or_default()
    }

    pub fn is_connected(&self, user: UserId) -> bool {
        self.inner.contains_key(&user)
    }

    /// Number of users with at least one live connection
    pub fn user_count(&self) -> usize {
        self.inner.len()
    }

    /// Per-user lock guarding subscription updates; `None` when offline
    pub(crate) fn membership_lock(&self, user: UserId) -> Option<Arc<Mutex<()>>> {
        self.inner.get(&user).map(|entry| entry.sync.clone())
    }
}
