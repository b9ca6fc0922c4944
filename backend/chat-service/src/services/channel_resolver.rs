use crate::error::AppResult;
use crate::models::{Channel, UserId};
use crate::store::SharedStore;
use std::collections::HashSet;

/// Computes the channels a user must be subscribed to
///
/// Always reads the store; membership is never cached here.
#[derive(Clone)]
pub struct ChannelMembershipResolver {
    store: SharedStore,
}

impl ChannelMembershipResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// The user's own channel, one per friend, one per group
    pub async fn channels_for(&self, user: UserId) -> AppResult<HashSet<Channel>> {
        let friends = self.store.friends_of(user).await?;
        let groups = self.store.groups_of(user).await?;

        let mut channels = HashSet::with_capacity(friends.len() + groups.len() + 1);
        channels.insert(Channel::User(user));
        channels.extend(friends.into_iter().map(Channel::User));
        channels.extend(groups.into_iter().map(Channel::Group));
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::NewMessage;
    use crate::store::{MemoryStore, RelationshipStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lone_user_resolves_to_own_channel() {
        let store = Arc::new(MemoryStore::new());
        let alice = store.add_user("alice").await.id;
        let resolver = ChannelMembershipResolver::new(store);

        let channels = resolver.channels_for(alice).await.unwrap();
        assert_eq!(channels, HashSet::from([Channel::User(alice)]));
    }

    #[tokio::test]
    async fn test_friends_and_groups_are_included() {
        let store = Arc::new(MemoryStore::new());
        let alice = store.add_user("alice").await.id;
        let bob = store.add_user("bob").await.id;
        let request = store.create_friend_request(bob, alice, "hi").await.unwrap();
        store
            .accept_friend_request(
                request.id,
                NewMessage::system(alice, bob, "We are friends now".into()),
            )
            .await
            .unwrap();
        let (group, _) = store.create_group(alice, "g", "", "created").await.unwrap();

        let resolver = ChannelMembershipResolver::new(store.clone());
        let channels = resolver.channels_for(alice).await.unwrap();
        assert_eq!(
            channels,
            HashSet::from([
                Channel::User(alice),
                Channel::User(bob),
                Channel::Group(group.id)
            ])
        );

        store.set_available(false);
        assert!(matches!(
            resolver.channels_for(alice).await,
            Err(AppError::Database(_))
        ));
    }
}
