//! Serialize-once fan-out of [`ChatEvent`]s to channel subscribers

use super::{ChatEvent, ConnectionHandle, RealtimeHub};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{Channel, UserId};
use std::collections::HashSet;

/// Which subscribers of the targeted channels receive an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every connection subscribed to any targeted channel
    Subscribers,
    /// Only connections owned by these users
    Only(HashSet<UserId>),
}

impl Audience {
    pub fn only(users: impl IntoIterator<Item = UserId>) -> Self {
        Audience::Only(users.into_iter().collect())
    }

    fn users(&self) -> Option<&HashSet<UserId>> {
        match self {
            Audience::Subscribers => None,
            Audience::Only(users) => Some(users),
        }
    }
}

#[derive(Clone)]
pub struct EventBroadcaster {
    hub: RealtimeHub,
}

impl EventBroadcaster {
    pub fn new(hub: RealtimeHub) -> Self {
        Self { hub }
    }

    /// Deliver to every subscriber of one channel
    pub fn publish(&self, channel: Channel, event: &ChatEvent) -> AppResult<usize> {
        self.publish_to(&[channel], Audience::Subscribers, event)
    }

    /// Deliver to the subscribers of several channels
    ///
    /// A connection subscribed to more than one of the channels gets the
    /// event once. Returns the number of connections reached; zero is not
    /// an error.
    pub fn publish_to(
        &self,
        channels: &[Channel],
        audience: Audience,
        event: &ChatEvent,
    ) -> AppResult<usize> {
        let wire = event.to_wire().map_err(|e| {
            tracing::error!(event_type = event.event_type(), error = %e, "Failed to encode event");
            AppError::Internal
        })?;
        let payload = serde_json::to_string(&wire).map_err(|e| {
            tracing::error!(event_type = event.event_type(), error = %e, "Failed to encode frame");
            AppError::Internal
        })?;

        let mut delivered: HashSet<ConnectionHandle> = HashSet::new();
        let sent: usize = channels
            .iter()
            .map(|channel| {
                self.hub
                    .fan_out(*channel, &payload, audience.users(), &mut delivered)
            })
            .sum();

        metrics::EVENTS_PUBLISHED_TOTAL
            .with_label_values(&[event.event_type()])
            .inc();
        metrics::EVENT_DELIVERIES_TOTAL
            .with_label_values(&[event.event_type()])
            .inc_by(sent as u64);

        tracing::debug!(
            event_type = event.event_type(),
            channels = channels.len(),
            delivered = sent,
            "Published event"
        );
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, GroupId, MessageId, MessageKind, PrincipalId};
    use crate::services::channel_resolver::ChannelMembershipResolver;
    use crate::store::{MemoryStore, SharedStore};
    use crate::websocket::{ConnectionRegistry, MembershipChange, WireEvent};
    use chrono::Utc;
    use std::sync::Arc;

    fn text(id: i64, from: UserId, to: PrincipalId) -> ChatEvent {
        ChatEvent::NewMessage(ChatMessage {
            id: MessageId(id),
            sender_id: Some(from),
            receiver_id: to,
            kind: MessageKind::PlainText,
            content: "hi".into(),
            send_time: Utc::now(),
            is_deleted: false,
            deleted_at: None,
        })
    }

    async fn setup() -> (EventBroadcaster, RealtimeHub, UserId, UserId) {
        let store = Arc::new(MemoryStore::new());
        let alice = store.add_user("alice").await.id;
        let bob = store.add_user("bob").await.id;
        let shared: SharedStore = store;
        let hub = RealtimeHub::new(
            ConnectionRegistry::new(),
            ChannelMembershipResolver::new(shared),
        );
        (EventBroadcaster::new(hub.clone()), hub, alice, bob)
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_not_an_error() {
        let (broadcaster, _hub, alice, _bob) = setup().await;
        let sent = broadcaster
            .publish(Channel::Group(GroupId(500)), &text(1, alice, GroupId(500).into()))
            .unwrap();
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_overlapping_channels_deliver_once() {
        let (broadcaster, hub, alice, bob) = setup().await;
        let (handle, mut rx) = hub.connect(alice).await.unwrap();
        hub.subscribe(handle, Channel::User(bob));

        let sent = broadcaster
            .publish_to(
                &[Channel::User(alice), Channel::User(bob)],
                Audience::Subscribers,
                &text(3, bob, alice.into()),
            )
            .unwrap();
        assert_eq!(sent, 1);

        let frame: WireEvent = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame.msg_id, 3);
        assert_eq!(frame.from_id, bob.0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_audience_filters_by_owner() {
        let (broadcaster, hub, alice, bob) = setup().await;
        let (a, mut alice_rx) = hub.connect(alice).await.unwrap();
        let (b, mut bob_rx) = hub.connect(bob).await.unwrap();
        let channel = Channel::Group(GroupId(77));
        hub.subscribe(a, channel);
        hub.subscribe(b, channel);

        let event = ChatEvent::MembershipChanged {
            from: GroupId(77).into(),
            to: bob.into(),
            change: MembershipChange::GroupRemoved {
                group_id: GroupId(77),
            },
        };
        let sent = broadcaster
            .publish_to(&[channel], Audience::only([bob]), &event)
            .unwrap();
        assert_eq!(sent, 1);

        let frame: WireEvent = serde_json::from_str(&bob_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame.msg_id, 0);
        assert!(alice_rx.try_recv().is_err());
    }
}
