//! Persistence seams
//!
//! Relationship and message data sit behind two traits so the realtime
//! layer can run against Postgres in production and against
//! [`MemoryStore`] in tests. Every read returns a fresh snapshot; nothing
//! here caches membership.

use crate::error::AppResult;
use crate::models::{
    ChatMessage, Conversation, Direction, FriendRequest, Group, GroupId, GroupMember, MessageId,
    MessageScope, NewMessage, PrincipalId, PrincipalKind, PrincipalSummary, UserId, UserProfile,
};
use async_trait::async_trait;
use std::sync::Arc;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Friendships, friend requests, groups and memberships
///
/// Composite mutations are applied atomically: either every row changes or
/// none does.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn principal_kind(&self, id: PrincipalId) -> AppResult<Option<PrincipalKind>>;

    async fn user(&self, id: UserId) -> AppResult<Option<UserProfile>>;

    /// Users and groups whose id or name contains `keyword`
    async fn search_principals(&self, keyword: &str, limit: i64)
        -> AppResult<Vec<PrincipalSummary>>;

    async fn is_friend(&self, a: UserId, b: UserId) -> AppResult<bool>;

    async fn friends_of(&self, user: UserId) -> AppResult<Vec<UserId>>;

    async fn groups_of(&self, user: UserId) -> AppResult<Vec<GroupId>>;

    async fn group(&self, id: GroupId) -> AppResult<Option<Group>>;

    async fn members_of(&self, group: GroupId) -> AppResult<Vec<GroupMember>>;

    async fn membership(&self, group: GroupId, user: UserId) -> AppResult<Option<GroupMember>>;

    /// Pending request between the two users, sent in either direction
    async fn pending_request_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> AppResult<Option<FriendRequest>>;

    async fn create_friend_request(
        &self,
        from: UserId,
        to: UserId,
        message: &str,
    ) -> AppResult<FriendRequest>;

    async fn friend_request(&self, id: i64) -> AppResult<Option<FriendRequest>>;

    /// Requests addressed to `user`, newest first
    async fn friend_requests_to(&self, user: UserId) -> AppResult<Vec<FriendRequest>>;

    async fn reject_friend_request(&self, id: i64) -> AppResult<()>;

    /// Mark accepted, create both friendship edges, store the seed message
    ///
    /// Fails with `ALREADY_FRIENDS` when the edges already exist.
    async fn accept_friend_request(&self, id: i64, seed: NewMessage) -> AppResult<ChatMessage>;

    /// Remove both edges; false when the users were not friends
    async fn remove_friendship(&self, a: UserId, b: UserId) -> AppResult<bool>;

    /// New group with `owner` as operator member, plus a seed message from
    /// the owner to the group
    async fn create_group(
        &self,
        owner: UserId,
        name: &str,
        description: &str,
        seed_content: &str,
    ) -> AppResult<(Group, ChatMessage)>;

    async fn add_member(
        &self,
        group: GroupId,
        user: UserId,
        seed: NewMessage,
    ) -> AppResult<ChatMessage>;

    /// False when `user` was not a member
    async fn remove_member(&self, group: GroupId, user: UserId) -> AppResult<bool>;

    /// False when `user` is not a member
    async fn set_operator(&self, group: GroupId, user: UserId, is_operator: bool)
        -> AppResult<bool>;

    /// Delete the group and all memberships, returning the former members
    async fn delete_group(&self, group: GroupId) -> AppResult<Vec<UserId>>;
}

/// Message history
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: NewMessage) -> AppResult<ChatMessage>;

    /// Includes tombstoned messages
    async fn message(&self, id: MessageId) -> AppResult<Option<ChatMessage>>;

    /// Tombstone a live message; `None` when absent or already deleted
    async fn tombstone_message(&self, id: MessageId) -> AppResult<Option<ChatMessage>>;

    /// Up to `limit` live messages from the conversation, in cursor order:
    /// `Before` walks ids `<= cursor` descending, `After` walks ids
    /// `>= cursor` ascending. A missing cursor starts from the newest
    /// (`Before`) or oldest (`After`) message.
    async fn fetch_messages(
        &self,
        conversation: Conversation,
        cursor: Option<MessageId>,
        direction: Direction,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>>;

    async fn latest_message(&self, conversation: Conversation) -> AppResult<Option<ChatMessage>>;

    /// Up to `limit` live messages in `scope` whose content contains
    /// `keyword` case-insensitively, newest first, with ids strictly below
    /// `before`. `None` matches every message.
    async fn search_messages(
        &self,
        scope: &MessageScope,
        keyword: Option<&str>,
        before: Option<MessageId>,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>>;

    /// Number of live messages [`search_messages`](Self::search_messages)
    /// would return without cursor or limit
    async fn count_messages(&self, scope: &MessageScope, keyword: Option<&str>) -> AppResult<i64>;
}

pub trait ChatStore: RelationshipStore + MessageStore {}

impl<T: RelationshipStore + MessageStore> ChatStore for T {}

pub type SharedStore = Arc<dyn ChatStore>;
