//! Process-local store
//!
//! Backs `STORE_BACKEND=memory` and the test suites. It can be switched to
//! unavailable to exercise infrastructure failures.

use super::{MessageStore, RelationshipStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    ChatMessage, Conversation, Direction, FriendRequest, FriendRequestState, Group, GroupId,
    GroupMember, MessageId, MessageScope, NewMessage, PrincipalId, PrincipalKind,
    PrincipalSummary, UserId, UserProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use error_types::error_codes;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    last_principal_id: i64,
    last_message_id: i64,
    last_request_id: i64,
    users: BTreeMap<UserId, UserProfile>,
    groups: BTreeMap<GroupId, Group>,
    // directed edges; always inserted and removed in pairs
    friendships: HashSet<(UserId, UserId)>,
    requests: BTreeMap<i64, FriendRequest>,
    members: BTreeMap<(GroupId, UserId), GroupMember>,
    messages: BTreeMap<MessageId, ChatMessage>,
}

impl MemoryState {
    fn next_principal(&mut self) -> i64 {
        self.last_principal_id += 1;
        self.last_principal_id
    }

    fn push_message(&mut self, message: NewMessage) -> ChatMessage {
        self.last_message_id += 1;
        let stored = ChatMessage {
            id: MessageId(self.last_message_id),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            kind: message.kind,
            content: message.content,
            send_time: Utc::now(),
            is_deleted: false,
            deleted_at: None,
        };
        self.messages.insert(stored.id, stored.clone());
        stored
    }
}

pub struct MemoryStore {
    state: RwLock<MemoryState>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Register an account; user rows are normally owned by the identity system
    pub async fn add_user(&self, user_name: &str) -> UserProfile {
        let mut state = self.state.write().await;
        let id = UserId(state.next_principal());
        let profile = UserProfile {
            id,
            user_name: user_name.to_string(),
            nickname: user_name.to_string(),
        };
        state.users.insert(id, profile.clone());
        profile
    }

    /// While unavailable every call fails with a database error
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Database("memory store marked unavailable".into()))
        }
    }
}

#[async_trait]
impl RelationshipStore for MemoryStore {
    async fn principal_kind(&self, id: PrincipalId) -> AppResult<Option<PrincipalKind>> {
        self.check()?;
        let state = self.state.read().await;
        if state.users.contains_key(&UserId(id.0)) {
            Ok(Some(PrincipalKind::User))
        } else if state.groups.contains_key(&GroupId(id.0)) {
            Ok(Some(PrincipalKind::Group))
        } else {
            Ok(None)
        }
    }

    async fn user(&self, id: UserId) -> AppResult<Option<UserProfile>> {
        self.check()?;
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn search_principals(
        &self,
        keyword: &str,
        limit: i64,
    ) -> AppResult<Vec<PrincipalSummary>> {
        self.check()?;
        let state = self.state.read().await;
        let needle = keyword.to_lowercase();
        let matches = |id: i64, name: &str| {
            id.to_string().contains(&needle) || name.to_lowercase().contains(&needle)
        };

        let users = state
            .users
            .values()
            .filter(|u| matches(u.id.0, &u.user_name))
            .map(|u| PrincipalSummary {
                id: u.id.into(),
                kind: PrincipalKind::User,
                name: u.user_name.clone(),
            });
        let groups = state
            .groups
            .values()
            .filter(|g| matches(g.id.0, &g.name))
            .map(|g| PrincipalSummary {
                id: g.id.into(),
                kind: PrincipalKind::Group,
                name: g.name.clone(),
            });

        Ok(users
            .chain(groups)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn is_friend(&self, a: UserId, b: UserId) -> AppResult<bool> {
        self.check()?;
        Ok(self.state.read().await.friendships.contains(&(a, b)))
    }

    async fn friends_of(&self, user: UserId) -> AppResult<Vec<UserId>> {
        self.check()?;
        let state = self.state.read().await;
        let mut friends: Vec<UserId> = state
            .friendships
            .iter()
            .filter(|(from, _)| *from == user)
            .map(|(_, to)| *to)
            .collect();
        friends.sort();
        Ok(friends)
    }

    async fn groups_of(&self, user: UserId) -> AppResult<Vec<GroupId>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .members
            .keys()
            .filter(|(_, member)| *member == user)
            .map(|(group, _)| *group)
            .collect())
    }

    async fn group(&self, id: GroupId) -> AppResult<Option<Group>> {
        self.check()?;
        Ok(self.state.read().await.groups.get(&id).cloned())
    }

    async fn members_of(&self, group: GroupId) -> AppResult<Vec<GroupMember>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .members
            .range((group, UserId(i64::MIN))..=(group, UserId(i64::MAX)))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn membership(&self, group: GroupId, user: UserId) -> AppResult<Option<GroupMember>> {
        self.check()?;
        Ok(self.state.read().await.members.get(&(group, user)).cloned())
    }

    async fn pending_request_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> AppResult<Option<FriendRequest>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .filter(|r| r.state == FriendRequestState::Pending)
            .find(|r| (r.from_id, r.to_id) == (a, b) || (r.from_id, r.to_id) == (b, a))
            .cloned())
    }

    async fn create_friend_request(
        &self,
        from: UserId,
        to: UserId,
        message: &str,
    ) -> AppResult<FriendRequest> {
        self.check()?;
        let mut state = self.state.write().await;
        state.last_request_id += 1;
        let request = FriendRequest {
            id: state.last_request_id,
            from_id: from,
            to_id: to,
            message: message.to_string(),
            state: FriendRequestState::Pending,
            requested_at: Utc::now(),
        };
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn friend_request(&self, id: i64) -> AppResult<Option<FriendRequest>> {
        self.check()?;
        Ok(self.state.read().await.requests.get(&id).cloned())
    }

    async fn friend_requests_to(&self, user: UserId) -> AppResult<Vec<FriendRequest>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .rev()
            .filter(|r| r.to_id == user)
            .cloned()
            .collect())
    }

    async fn reject_friend_request(&self, id: i64) -> AppResult<()> {
        self.check()?;
        let mut state = self.state.write().await;
        match state.requests.get_mut(&id) {
            Some(request) if request.state == FriendRequestState::Pending => {
                request.state = FriendRequestState::Rejected;
                Ok(())
            }
            _ => Err(AppError::not_found(
                error_codes::FRIEND_REQUEST_NOT_FOUND,
                "no pending friend request with that id",
            )),
        }
    }

    async fn accept_friend_request(&self, id: i64, seed: NewMessage) -> AppResult<ChatMessage> {
        self.check()?;
        let mut state = self.state.write().await;
        let (from, to) = match state.requests.get(&id) {
            Some(request) if request.state == FriendRequestState::Pending => {
                (request.from_id, request.to_id)
            }
            _ => {
                return Err(AppError::not_found(
                    error_codes::FRIEND_REQUEST_NOT_FOUND,
                    "no pending friend request with that id",
                ))
            }
        };
        if state.friendships.contains(&(from, to)) {
            return Err(AppError::conflict(
                error_codes::ALREADY_FRIENDS,
                "you are already friends",
            ));
        }
        if let Some(request) = state.requests.get_mut(&id) {
            request.state = FriendRequestState::Accepted;
        }
        state.friendships.insert((from, to));
        state.friendships.insert((to, from));
        Ok(state.push_message(seed))
    }

    async fn remove_friendship(&self, a: UserId, b: UserId) -> AppResult<bool> {
        self.check()?;
        let mut state = self.state.write().await;
        let removed_ab = state.friendships.remove(&(a, b));
        let removed_ba = state.friendships.remove(&(b, a));
        Ok(removed_ab || removed_ba)
    }

    async fn create_group(
        &self,
        owner: UserId,
        name: &str,
        description: &str,
        seed_content: &str,
    ) -> AppResult<(Group, ChatMessage)> {
        self.check()?;
        let mut state = self.state.write().await;
        let now = Utc::now();
        let group = Group {
            id: GroupId(state.next_principal()),
            name: name.to_string(),
            description: description.to_string(),
            owner_id: owner,
            created_at: now,
        };
        state.groups.insert(group.id, group.clone());
        state.members.insert(
            (group.id, owner),
            GroupMember {
                group_id: group.id,
                user_id: owner,
                is_operator: true,
                joined_at: now,
            },
        );
        let seed = state.push_message(NewMessage::system(owner, group.id, seed_content.to_string()));
        Ok((group, seed))
    }

    async fn add_member(
        &self,
        group: GroupId,
        user: UserId,
        seed: NewMessage,
    ) -> AppResult<ChatMessage> {
        self.check()?;
        let mut state = self.state.write().await;
        if !state.groups.contains_key(&group) {
            return Err(AppError::not_found(
                error_codes::GROUP_NOT_FOUND,
                "group does not exist",
            ));
        }
        if state.members.contains_key(&(group, user)) {
            return Err(AppError::conflict(
                error_codes::ALREADY_GROUP_MEMBER,
                "user is already a member",
            ));
        }
        state.members.insert(
            (group, user),
            GroupMember {
                group_id: group,
                user_id: user,
                is_operator: false,
                joined_at: Utc::now(),
            },
        );
        Ok(state.push_message(seed))
    }

    async fn remove_member(&self, group: GroupId, user: UserId) -> AppResult<bool> {
        self.check()?;
        Ok(self
            .state
            .write()
            .await
            .members
            .remove(&(group, user))
            .is_some())
    }

    async fn set_operator(
        &self,
        group: GroupId,
        user: UserId,
        is_operator: bool,
    ) -> AppResult<bool> {
        self.check()?;
        let mut state = self.state.write().await;
        match state.members.get_mut(&(group, user)) {
            Some(member) => {
                member.is_operator = is_operator;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_group(&self, group: GroupId) -> AppResult<Vec<UserId>> {
        self.check()?;
        let mut state = self.state.write().await;
        state.groups.remove(&group);
        let former: Vec<UserId> = state
            .members
            .keys()
            .filter(|(g, _)| *g == group)
            .map(|(_, user)| *user)
            .collect();
        for user in &former {
            state.members.remove(&(group, *user));
        }
        Ok(former)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: NewMessage) -> AppResult<ChatMessage> {
        self.check()?;
        Ok(self.state.write().await.push_message(message))
    }

    async fn message(&self, id: MessageId) -> AppResult<Option<ChatMessage>> {
        self.check()?;
        Ok(self.state.read().await.messages.get(&id).cloned())
    }

    async fn tombstone_message(&self, id: MessageId) -> AppResult<Option<ChatMessage>> {
        self.check()?;
        let mut state = self.state.write().await;
        match state.messages.get_mut(&id) {
            Some(message) if !message.is_deleted => {
                message.is_deleted = true;
                message.deleted_at = Some(Utc::now());
                Ok(Some(message.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn fetch_messages(
        &self,
        conversation: Conversation,
        cursor: Option<MessageId>,
        direction: Direction,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        self.check()?;
        let state = self.state.read().await;
        let live = |m: &&ChatMessage| !m.is_deleted && conversation.contains(m);
        let limit = limit.max(0) as usize;

        let rows = match direction {
            Direction::Before => {
                let upper = cursor.unwrap_or(MessageId(i64::MAX));
                state
                    .messages
                    .range(..=upper)
                    .rev()
                    .map(|(_, m)| m)
                    .filter(live)
                    .take(limit)
                    .cloned()
                    .collect()
            }
            Direction::After => {
                let lower = cursor.unwrap_or(MessageId(i64::MIN));
                state
                    .messages
                    .range(lower..)
                    .map(|(_, m)| m)
                    .filter(live)
                    .take(limit)
                    .cloned()
                    .collect()
            }
        };
        Ok(rows)
    }

    async fn latest_message(&self, conversation: Conversation) -> AppResult<Option<ChatMessage>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .messages
            .values()
            .rev()
            .find(|m| !m.is_deleted && conversation.contains(m))
            .cloned())
    }

    async fn search_messages(
        &self,
        scope: &MessageScope,
        keyword: Option<&str>,
        before: Option<MessageId>,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        self.check()?;
        let state = self.state.read().await;
        let needle = keyword.map(str::to_lowercase);
        let upper = before.unwrap_or(MessageId(i64::MAX));
        Ok(state
            .messages
            .range(..upper)
            .rev()
            .map(|(_, m)| m)
            .filter(|m| matches_search(m, scope, needle.as_deref()))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_messages(&self, scope: &MessageScope, keyword: Option<&str>) -> AppResult<i64> {
        self.check()?;
        let state = self.state.read().await;
        let needle = keyword.map(str::to_lowercase);
        let count = state
            .messages
            .values()
            .filter(|m| matches_search(m, scope, needle.as_deref()))
            .count();
        Ok(count as i64)
    }
}

/// `needle` is already lowercased
fn matches_search(message: &ChatMessage, scope: &MessageScope, needle: Option<&str>) -> bool {
    !message.is_deleted
        && scope.contains(message)
        && needle.map_or(true, |n| message.content.to_lowercase().contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;

    fn text(from: UserId, to: impl Into<PrincipalId>, content: &str) -> NewMessage {
        NewMessage {
            sender_id: Some(from),
            receiver_id: to.into(),
            kind: MessageKind::PlainText,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_principal_ids_are_shared_between_users_and_groups() {
        let store = MemoryStore::new();
        let alice = store.add_user("alice").await.id;
        let (group, _) = store.create_group(alice, "g", "", "created").await.unwrap();
        let bob = store.add_user("bob").await.id;

        assert_ne!(group.id.0, alice.0);
        assert_ne!(group.id.0, bob.0);
        assert_eq!(
            store.principal_kind(group.id.into()).await.unwrap(),
            Some(PrincipalKind::Group)
        );
        assert_eq!(
            store.principal_kind(bob.into()).await.unwrap(),
            Some(PrincipalKind::User)
        );
        assert_eq!(store.principal_kind(PrincipalId(999)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_accept_creates_mutual_edges_once() {
        let store = MemoryStore::new();
        let a = store.add_user("a").await.id;
        let b = store.add_user("b").await.id;
        let request = store.create_friend_request(a, b, "hi").await.unwrap();

        store
            .accept_friend_request(request.id, NewMessage::system(b, a, "hello".into()))
            .await
            .unwrap();
        assert!(store.is_friend(a, b).await.unwrap());
        assert!(store.is_friend(b, a).await.unwrap());

        let again = store
            .accept_friend_request(request.id, NewMessage::system(b, a, "hello".into()))
            .await;
        assert!(matches!(again, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_crossed_request_accept_is_a_conflict() {
        let store = MemoryStore::new();
        let a = store.add_user("a").await.id;
        let b = store.add_user("b").await.id;
        let ab = store.create_friend_request(a, b, "").await.unwrap();
        let ba = store.create_friend_request(b, a, "").await.unwrap();

        store
            .accept_friend_request(ab.id, NewMessage::system(b, a, "hello".into()))
            .await
            .unwrap();
        let err = store
            .accept_friend_request(ba.id, NewMessage::system(a, b, "hello".into()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), error_codes::ALREADY_FRIENDS);

        // the losing request stays pending and no second seed was stored
        let pending = store.pending_request_between(a, b).await.unwrap().unwrap();
        assert_eq!(pending.id, ba.id);
        let history = store
            .fetch_messages(Conversation::Direct(a, b), None, Direction::Before, 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_skips_tombstones_and_other_conversations() {
        let store = MemoryStore::new();
        let a = store.add_user("a").await.id;
        let b = store.add_user("b").await.id;
        let c = store.add_user("c").await.id;

        let m1 = store.insert_message(text(a, b, "1")).await.unwrap();
        store.insert_message(text(a, c, "other")).await.unwrap();
        let m3 = store.insert_message(text(b, a, "3")).await.unwrap();
        let m4 = store.insert_message(text(a, b, "4")).await.unwrap();
        store.tombstone_message(m3.id).await.unwrap();

        let conv = Conversation::Direct(a, b);
        let newest = store
            .fetch_messages(conv, None, Direction::Before, 10)
            .await
            .unwrap();
        let ids: Vec<MessageId> = newest.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![m4.id, m1.id]);

        let from_first = store
            .fetch_messages(conv, Some(m1.id), Direction::After, 1)
            .await
            .unwrap();
        assert_eq!(from_first[0].id, m1.id);
        assert_eq!(store.latest_message(conv).await.unwrap().unwrap().id, m4.id);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        let a = store.add_user("a").await.id;
        store.set_available(false);
        assert!(matches!(
            store.friends_of(a).await,
            Err(AppError::Database(_))
        ));
        store.set_available(true);
        assert!(store.friends_of(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_group_returns_former_members() {
        let store = MemoryStore::new();
        let owner = store.add_user("owner").await.id;
        let member = store.add_user("member").await.id;
        let (group, _) = store.create_group(owner, "g", "", "created").await.unwrap();
        store
            .add_member(group.id, member, text(member, group.id, "joined"))
            .await
            .unwrap();

        let mut former = store.delete_group(group.id).await.unwrap();
        former.sort();
        assert_eq!(former, vec![owner, member]);
        assert!(store.group(group.id).await.unwrap().is_none());
        assert!(store.groups_of(member).await.unwrap().is_empty());
    }
}
