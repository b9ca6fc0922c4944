//! Live side effects of friendship and group membership changes
//!
//! Every mutation commits to the store first. Only then are the affected
//! users' live connections re-subscribed, each under that user's
//! membership lock, and the resulting event published. A store failure
//! therefore leaves both the data and the subscription table untouched.

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::guards::{require_friends, GroupAccess};
use crate::models::{Channel, ChatMessage, Group, GroupId, NewMessage, UserId};
use crate::store::SharedStore;
use crate::websocket::{Audience, ChatEvent, EventBroadcaster, MembershipChange, RealtimeHub};
use error_types::error_codes;

const FRIEND_ACCEPTED_GREETING: &str = "We are friends now, let's start chatting!";
const GROUP_CREATED_GREETING: &str = "group created";
const MAX_GROUP_NAME_LEN: usize = 64;

#[derive(Clone)]
pub struct MembershipCoordinator {
    store: SharedStore,
    hub: RealtimeHub,
    broadcaster: EventBroadcaster,
}

impl MembershipCoordinator {
    pub fn new(store: SharedStore, hub: RealtimeHub, broadcaster: EventBroadcaster) -> Self {
        Self {
            store,
            hub,
            broadcaster,
        }
    }

    /// Accept a pending request addressed to `actor`
    ///
    /// Both users become friends, both sides' live connections subscribe to
    /// the other's channel, and the seeded greeting reaches both users.
    pub async fn accept_friend_request(&self, actor: UserId, request_id: i64) -> AppResult<ChatMessage> {
        let request = self
            .store
            .friend_request(request_id)
            .await?
            .filter(|r| r.to_id == actor)
            .ok_or_else(|| {
                AppError::not_found(
                    error_codes::FRIEND_REQUEST_NOT_FOUND,
                    "no pending friend request with that id",
                )
            })?;
        let requester = request.from_id;
        if self.store.is_friend(actor, requester).await? {
            return Err(AppError::conflict(
                error_codes::ALREADY_FRIENDS,
                "you are already friends",
            ));
        }

        let seed = NewMessage::system(actor, requester, FRIEND_ACCEPTED_GREETING.to_string());
        let seed = self.store.accept_friend_request(request_id, seed).await?;
        self.record("friend_accepted");

        self.hub.subscribe_user(actor, Channel::User(requester)).await;
        self.hub.subscribe_user(requester, Channel::User(actor)).await;

        self.broadcaster.publish_to(
            &[Channel::User(actor), Channel::User(requester)],
            Audience::only([actor, requester]),
            &ChatEvent::NewMessage(seed.clone()),
        )?;

        tracing::info!(
            user_id = %actor,
            friend_id = %requester,
            request_id,
            "Friend request accepted"
        );
        Ok(seed)
    }

    pub async fn remove_friend(&self, actor: UserId, friend: UserId) -> AppResult<()> {
        require_friends(self.store.as_ref(), actor, friend).await?;

        if !self.store.remove_friendship(actor, friend).await? {
            // Lost a race with the other side's removal
            return Err(AppError::forbidden(
                error_codes::NOT_FRIENDS,
                "you are not friends with this user",
            ));
        }
        self.record("friend_removed");

        self.hub.unsubscribe_user(actor, Channel::User(friend)).await;
        self.hub.unsubscribe_user(friend, Channel::User(actor)).await;

        let event = ChatEvent::MembershipChanged {
            from: actor.into(),
            to: friend.into(),
            change: MembershipChange::FriendRemoved {
                friend_a: actor,
                friend_b: friend,
            },
        };
        self.broadcaster.publish_to(
            &[Channel::User(actor), Channel::User(friend)],
            Audience::only([actor, friend]),
            &event,
        )?;

        tracing::info!(user_id = %actor, friend_id = %friend, "Friend removed");
        Ok(())
    }

    pub async fn create_group(
        &self,
        actor: UserId,
        name: &str,
        description: &str,
    ) -> AppResult<Group> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_GROUP_NAME_LEN {
            return Err(AppError::bad_request(format!(
                "group name must be 1 to {MAX_GROUP_NAME_LEN} characters"
            )));
        }

        let (group, seed) = self
            .store
            .create_group(actor, name, description, GROUP_CREATED_GREETING)
            .await?;
        self.record("group_created");

        let channel = Channel::Group(group.id);
        self.hub.subscribe_user(actor, channel).await;
        self.broadcaster
            .publish(channel, &ChatEvent::NewMessage(seed))?;

        tracing::info!(user_id = %actor, group_id = %group.id, "Group created");
        Ok(group)
    }

    /// Add a friend of the operator `actor` to the group
    pub async fn add_member(
        &self,
        actor: UserId,
        group: GroupId,
        target: UserId,
    ) -> AppResult<ChatMessage> {
        let access = GroupAccess::verify(self.store.as_ref(), actor, group).await?;
        access.require_operator()?;

        let profile = self.store.user(target).await?.ok_or_else(|| {
            AppError::not_found(error_codes::USER_NOT_FOUND, "user does not exist")
        })?;
        if self.store.membership(group, target).await?.is_some() {
            return Err(AppError::conflict(
                error_codes::ALREADY_GROUP_MEMBER,
                "user is already a member",
            ));
        }
        require_friends(self.store.as_ref(), actor, target).await?;

        let seed = NewMessage::system(target, group, format!("Hi all, I'm {}", profile.user_name));
        let seed = self.store.add_member(group, target, seed).await?;
        self.record("member_added");

        let channel = Channel::Group(group);
        self.hub.subscribe_user(target, channel).await;
        self.broadcaster
            .publish(channel, &ChatEvent::NewMessage(seed.clone()))?;

        tracing::info!(
            user_id = %actor,
            member_id = %target,
            group_id = %group,
            "Member added"
        );
        Ok(seed)
    }

    /// Remove `target` from the group; `actor == target` leaves
    pub async fn remove_member(
        &self,
        actor: UserId,
        group: GroupId,
        target: UserId,
    ) -> AppResult<()> {
        let access = GroupAccess::verify(self.store.as_ref(), actor, group).await?;
        if access.is_owner(target) {
            return Err(AppError::forbidden(
                error_codes::GROUP_OWNER_PROTECTED,
                "the group owner cannot be removed",
            ));
        }
        if actor != target {
            access.require_operator()?;
        }

        if !self.store.remove_member(group, target).await? {
            return Err(AppError::not_found(
                error_codes::NOT_GROUP_MEMBER,
                "user is not a member of this group",
            ));
        }
        self.record("member_removed");

        self.hub.unsubscribe_user(target, Channel::Group(group)).await;

        let event = ChatEvent::MembershipChanged {
            from: group.into(),
            to: target.into(),
            change: MembershipChange::GroupRemoved { group_id: group },
        };
        self.broadcaster
            .publish_to(&[Channel::User(target)], Audience::only([target]), &event)?;

        tracing::info!(
            user_id = %actor,
            member_id = %target,
            group_id = %group,
            "Member removed"
        );
        Ok(())
    }

    /// Delete the group; members are notified on the group channel before
    /// they are unsubscribed
    pub async fn delete_group(&self, actor: UserId, group: GroupId) -> AppResult<()> {
        let access = GroupAccess::verify(self.store.as_ref(), actor, group).await?;
        access.require_operator()?;

        let former_members = self.store.delete_group(group).await?;
        self.record("group_deleted");

        let channel = Channel::Group(group);
        let event = ChatEvent::MembershipChanged {
            from: actor.into(),
            to: group.into(),
            change: MembershipChange::GroupRemoved { group_id: group },
        };
        self.broadcaster.publish(channel, &event)?;

        for member in &former_members {
            self.hub.unsubscribe_user(*member, channel).await;
        }
        let stragglers = self.hub.close_channel(channel);
        if stragglers > 0 {
            tracing::debug!(group_id = %group, stragglers, "Closed leftover group subscriptions");
        }

        tracing::info!(
            user_id = %actor,
            group_id = %group,
            members = former_members.len(),
            "Group deleted"
        );
        Ok(())
    }

    fn record(&self, mutation: &str) {
        metrics::MEMBERSHIP_MUTATIONS_TOTAL
            .with_label_values(&[mutation])
            .inc();
    }
}
