//! Connection lifecycle and the channel subscription table
//!
//! Lock order: a `connections` entry may be held while touching a `channels`
//! entry, never the reverse. The registry is only touched with no hub guard
//! held.

use super::{ConnectionHandle, ConnectionRegistry};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{Channel, UserId};
use crate::services::channel_resolver::ChannelMembershipResolver;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    /// Terminal; the handle is never reused
    Disconnected,
}

struct LiveConnection {
    user: UserId,
    state: ConnectionState,
    sender: UnboundedSender<String>,
    channels: HashSet<Channel>,
}

struct Subscriber {
    handle: ConnectionHandle,
    user: UserId,
    sender: UnboundedSender<String>,
}

struct HubInner {
    registry: ConnectionRegistry,
    resolver: ChannelMembershipResolver,
    connections: DashMap<ConnectionHandle, LiveConnection>,
    channels: DashMap<Channel, Vec<Subscriber>>,
}

/// Owns every live connection and the channel -> connections table
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

impl RealtimeHub {
    pub fn new(registry: ConnectionRegistry, resolver: ChannelMembershipResolver) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry,
                resolver,
                connections: DashMap::new(),
                channels: DashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    /// Register a new connection for `user` and subscribe it to every
    /// channel the user currently belongs to
    ///
    /// Returns the handle and the receiving end of the connection's outbound
    /// queue. If membership cannot be resolved the connection is torn down
    /// and the error returned; it is never left half-subscribed.
    pub async fn connect(
        &self,
        user: UserId,
    ) -> AppResult<(ConnectionHandle, UnboundedReceiver<String>)> {
        let handle = ConnectionHandle::new();
        let (sender, receiver) = unbounded_channel();

        self.inner.connections.insert(
            handle,
            LiveConnection {
                user,
                state: ConnectionState::Connecting,
                sender,
                channels: HashSet::new(),
            },
        );
        self.inner.registry.add(user, handle);

        let channel_count = match self.sync_subscriptions(handle, user).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    user_id = %user,
                    connection = %handle,
                    error = %e,
                    "Channel resolution failed, tearing connection down"
                );
                self.disconnect(handle);
                metrics::CONNECT_ATTEMPTS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                return Err(e);
            }
        };

        let activated = match self.inner.connections.get_mut(&handle) {
            Some(mut conn) => {
                conn.state = ConnectionState::Active;
                true
            }
            None => false,
        };
        if !activated {
            // Closed by the transport while subscribing
            metrics::CONNECT_ATTEMPTS_TOTAL
                .with_label_values(&["failed"])
                .inc();
            return Err(AppError::Internal);
        }

        metrics::CONNECT_ATTEMPTS_TOTAL
            .with_label_values(&["accepted"])
            .inc();
        metrics::LIVE_CONNECTIONS.inc();
        tracing::info!(
            user_id = %user,
            connection = %handle,
            channels = channel_count,
            "Connection active"
        );
        Ok((handle, receiver))
    }

    /// Drop the connection and all of its subscriptions
    ///
    /// Idempotent; returns false when the handle was not live.
    pub fn disconnect(&self, handle: ConnectionHandle) -> bool {
        let Some((_, conn)) = self.inner.connections.remove(&handle) else {
            return false;
        };

        for channel in &conn.channels {
            self.detach(*channel, handle);
        }
        self.inner.registry.remove(conn.user, handle);

        if conn.state == ConnectionState::Active {
            metrics::LIVE_CONNECTIONS.dec();
        }
        tracing::info!(
            user_id = %conn.user,
            connection = %handle,
            "Connection closed"
        );
        true
    }

    /// Recompute the connection's subscriptions from the store
    pub async fn resync(&self, handle: ConnectionHandle) -> AppResult<usize> {
        let user = self
            .inner
            .connections
            .get(&handle)
            .map(|conn| conn.user)
            .ok_or(AppError::Internal)?;
        self.sync_subscriptions(handle, user).await
    }

    async fn sync_subscriptions(&self, handle: ConnectionHandle, user: UserId) -> AppResult<usize> {
        let lock = self.inner.registry.membership_lock(user);
        let _guard = match lock.as_ref() {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let wanted = self.inner.resolver.channels_for(user).await?;
        let current = self.channels_of(handle);
        for stale in current.difference(&wanted) {
            self.unsubscribe(handle, *stale);
        }
        for channel in &wanted {
            self.subscribe(handle, *channel);
        }
        Ok(wanted.len())
    }

    /// Returns false when the connection is gone or already subscribed
    pub fn subscribe(&self, handle: ConnectionHandle, channel: Channel) -> bool {
        let Some(mut conn) = self.inner.connections.get_mut(&handle) else {
            return false;
        };
        if conn.state == ConnectionState::Disconnected || !conn.channels.insert(channel) {
            return false;
        }

        self.inner
            .channels
            .entry(channel)
            .or_default()
            .push(Subscriber {
                handle,
                user: conn.user,
                sender: conn.sender.clone(),
            });

        tracing::debug!(connection = %handle, channel = %channel, "Subscribed");
        true
    }

    /// Returns false when the connection was not subscribed
    pub fn unsubscribe(&self, handle: ConnectionHandle, channel: Channel) -> bool {
        let Some(mut conn) = self.inner.connections.get_mut(&handle) else {
            return false;
        };
        if !conn.channels.remove(&channel) {
            return false;
        }
        self.detach(channel, handle);

        tracing::debug!(connection = %handle, channel = %channel, "Unsubscribed");
        true
    }

    /// Subscribe every live connection of `user`, serialized with the
    /// user's other subscription updates
    pub async fn subscribe_user(&self, user: UserId, channel: Channel) -> usize {
        let Some(lock) = self.inner.registry.membership_lock(user) else {
            return 0;
        };
        let _guard = lock.lock().await;
        self.inner
            .registry
            .connections_of(user)
            .into_iter()
            .filter(|handle| self.subscribe(*handle, channel))
            .count()
    }

    pub async fn unsubscribe_user(&self, user: UserId, channel: Channel) -> usize {
        let Some(lock) = self.inner.registry.membership_lock(user) else {
            return 0;
        };
        let _guard = lock.lock().await;
        self.inner
            .registry
            .connections_of(user)
            .into_iter()
            .filter(|handle| self.unsubscribe(*handle, channel))
            .count()
    }

    /// Unsubscribe every remaining subscriber of a channel that no longer exists
    pub fn close_channel(&self, channel: Channel) -> usize {
        self.subscribers_of(channel)
            .into_iter()
            .filter(|handle| self.unsubscribe(*handle, channel))
            .count()
    }

    pub fn channels_of(&self, handle: ConnectionHandle) -> HashSet<Channel> {
        self.inner
            .connections
            .get(&handle)
            .map(|conn| conn.channels.clone())
            .unwrap_or_default()
    }

    pub fn subscribers_of(&self, channel: Channel) -> Vec<ConnectionHandle> {
        self.inner
            .channels
            .get(&channel)
            .map(|subs| subs.iter().map(|s| s.handle).collect())
            .unwrap_or_default()
    }

    pub fn state_of(&self, handle: ConnectionHandle) -> ConnectionState {
        self.inner
            .connections
            .get(&handle)
            .map(|conn| conn.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Send `payload` to the channel's subscribers in one pass
    ///
    /// The channel entry stays locked for the whole pass, so two publishes
    /// on one channel reach every subscriber in the same order. Connections
    /// already in `delivered` are skipped; dead senders are dropped.
    pub(crate) fn fan_out(
        &self,
        channel: Channel,
        payload: &str,
        audience: Option<&HashSet<UserId>>,
        delivered: &mut HashSet<ConnectionHandle>,
    ) -> usize {
        let Some(mut subscribers) = self.inner.channels.get_mut(&channel) else {
            return 0;
        };

        let mut sent = 0;
        subscribers.retain(|sub| {
            if audience.is_some_and(|users| !users.contains(&sub.user))
                || delivered.contains(&sub.handle)
            {
                return true;
            }
            match sub.sender.send(payload.to_string()) {
                Ok(()) => {
                    delivered.insert(sub.handle);
                    sent += 1;
                    true
                }
                Err(_) => {
                    tracing::debug!(
                        connection = %sub.handle,
                        channel = %channel,
                        "Dropping subscriber with closed outbound queue"
                    );
                    false
                }
            }
        });
        sent
    }

    fn detach(&self, channel: Channel, handle: ConnectionHandle) {
        if let Entry::Occupied(mut entry) = self.inner.channels.entry(channel) {
            entry.get_mut().retain(|sub| sub.handle != handle);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroupId;
    use crate::store::{MemoryStore, RelationshipStore, SharedStore};

    async fn hub_with_users(names: &[&str]) -> (RealtimeHub, Arc<MemoryStore>, Vec<UserId>) {
        let store = Arc::new(MemoryStore::new());
        let mut ids = Vec::new();
        for name in names {
            ids.push(store.add_user(name).await.id);
        }
        let shared: SharedStore = store.clone();
        let hub = RealtimeHub::new(
            ConnectionRegistry::new(),
            ChannelMembershipResolver::new(shared),
        );
        (hub, store, ids)
    }

    #[tokio::test]
    async fn test_connect_subscribes_self_channel_and_activates() {
        let (hub, _store, ids) = hub_with_users(&["alice"]).await;
        let (handle, _rx) = hub.connect(ids[0]).await.unwrap();

        assert_eq!(hub.state_of(handle), ConnectionState::Active);
        assert!(hub.channels_of(handle).contains(&Channel::User(ids[0])));
        assert!(hub.registry().connections_of(ids[0]).contains(&handle));
    }

    #[tokio::test]
    async fn test_failed_resolution_leaves_nothing_behind() {
        let (hub, store, ids) = hub_with_users(&["alice"]).await;
        store.set_available(false);

        let result = hub.connect(ids[0]).await;
        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.registry().is_connected(ids[0]));
        assert!(hub.subscribers_of(Channel::User(ids[0])).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_clears_subscriptions() {
        let (hub, store, ids) = hub_with_users(&["alice"]).await;
        let (group, _) = store.create_group(ids[0], "g", "", "created").await.unwrap();
        let (handle, _rx) = hub.connect(ids[0]).await.unwrap();
        assert_eq!(hub.subscribers_of(Channel::Group(group.id)), vec![handle]);

        assert!(hub.disconnect(handle));
        assert!(!hub.disconnect(handle));
        assert_eq!(hub.state_of(handle), ConnectionState::Disconnected);
        assert!(hub.subscribers_of(Channel::Group(group.id)).is_empty());
        assert!(!hub.registry().is_connected(ids[0]));
    }

    #[tokio::test]
    async fn test_fan_out_reaches_each_connection_once_in_order() {
        let (hub, _store, ids) = hub_with_users(&["alice"]).await;
        let (phone, mut phone_rx) = hub.connect(ids[0]).await.unwrap();
        let (laptop, mut laptop_rx) = hub.connect(ids[0]).await.unwrap();
        let channel = Channel::Group(GroupId(99));
        assert!(hub.subscribe(phone, channel));
        assert!(hub.subscribe(laptop, channel));
        assert!(!hub.subscribe(laptop, channel));

        for payload in ["one", "two"] {
            let mut delivered = HashSet::new();
            assert_eq!(hub.fan_out(channel, payload, None, &mut delivered), 2);
            // a second channel in the same publish does not duplicate
            assert_eq!(
                hub.fan_out(Channel::User(ids[0]), payload, None, &mut delivered),
                0
            );
        }

        assert_eq!(phone_rx.recv().await.unwrap(), "one");
        assert_eq!(phone_rx.recv().await.unwrap(), "two");
        assert_eq!(laptop_rx.recv().await.unwrap(), "one");
        assert_eq!(laptop_rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_dead_receivers_are_pruned() {
        let (hub, _store, ids) = hub_with_users(&["alice"]).await;
        let (handle, rx) = hub.connect(ids[0]).await.unwrap();
        drop(rx);

        let mut delivered = HashSet::new();
        assert_eq!(
            hub.fan_out(Channel::User(ids[0]), "lost", None, &mut delivered),
            0
        );
        assert!(hub.subscribers_of(Channel::User(ids[0])).is_empty());
        assert!(hub.disconnect(handle));
    }

    #[tokio::test]
    async fn test_resync_picks_up_new_groups() {
        let (hub, store, ids) = hub_with_users(&["alice"]).await;
        let (handle, _rx) = hub.connect(ids[0]).await.unwrap();
        let (group, _) = store.create_group(ids[0], "g", "", "created").await.unwrap();

        assert!(!hub.channels_of(handle).contains(&Channel::Group(group.id)));
        assert_eq!(hub.resync(handle).await.unwrap(), 2);
        assert!(hub.channels_of(handle).contains(&Channel::Group(group.id)));

        store.delete_group(group.id).await.unwrap();
        hub.resync(handle).await.unwrap();
        assert!(!hub.channels_of(handle).contains(&Channel::Group(group.id)));
        assert!(store.groups_of(ids[0]).await.unwrap().is_empty());
    }
}
