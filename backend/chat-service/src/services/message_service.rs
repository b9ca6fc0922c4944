use crate::error::{AppError, AppResult};
use crate::middleware::guards::{require_friends, GroupAccess};
use crate::models::{
    Channel, ChatMessage, Conversation, Direction, GroupId, MessageId, MessageKind, MessagePage,
    MessageScope, MessageSearchPage, NewMessage, PrincipalId, PrincipalKind, UserId,
};
use crate::store::SharedStore;
use crate::websocket::{Audience, ChatEvent, EventBroadcaster};
use error_types::error_codes;
use serde::Serialize;

const MAX_CONTENT_LEN: usize = 8 * 1024;

/// Latest message of one friend or group conversation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChat {
    pub principal_id: PrincipalId,
    pub kind: PrincipalKind,
    pub name: String,
    pub last_message: Option<ChatMessage>,
}

#[derive(Clone)]
pub struct MessageService {
    store: SharedStore,
    broadcaster: EventBroadcaster,
    max_page_size: i32,
}

impl MessageService {
    pub fn new(store: SharedStore, broadcaster: EventBroadcaster, max_page_size: i32) -> Self {
        Self {
            store,
            broadcaster,
            max_page_size,
        }
    }

    /// Store a message to a friend or a group and push it to every live
    /// connection of the conversation, the sender's own devices included
    pub async fn send_message(
        &self,
        sender: UserId,
        receiver: PrincipalId,
        content: &str,
        kind: MessageKind,
    ) -> AppResult<ChatMessage> {
        let kind = kind.require_client_kind()?;
        if content.is_empty() || content.len() > MAX_CONTENT_LEN {
            return Err(AppError::bad_request(format!(
                "content must be 1 to {MAX_CONTENT_LEN} bytes"
            )));
        }

        let conversation = self.conversation_with(sender, receiver).await?;
        let message = self
            .store
            .insert_message(NewMessage {
                sender_id: Some(sender),
                receiver_id: receiver,
                kind,
                content: content.to_string(),
            })
            .await?;

        self.deliver(conversation, &ChatEvent::NewMessage(message.clone()))?;
        tracing::debug!(
            user_id = %sender,
            receiver_id = %receiver,
            message_id = %message.id,
            kind = %message.kind,
            "Message sent"
        );
        Ok(message)
    }

    /// Tombstone a message; only its sender may do this
    pub async fn delete_message(&self, actor: UserId, id: MessageId) -> AppResult<ChatMessage> {
        let message = self
            .store
            .message(id)
            .await?
            .filter(|m| !m.is_deleted)
            .ok_or_else(message_not_found)?;
        if message.sender_id != Some(actor) {
            return Err(AppError::forbidden(
                error_codes::NOT_MESSAGE_SENDER,
                "only the sender can delete a message",
            ));
        }

        let conversation = match self.store.principal_kind(message.receiver_id).await? {
            Some(PrincipalKind::Group) => Conversation::Group(GroupId(message.receiver_id.0)),
            _ => Conversation::Direct(actor, UserId(message.receiver_id.0)),
        };
        let deleted = self
            .store
            .tombstone_message(id)
            .await?
            .ok_or_else(message_not_found)?;

        self.deliver(conversation, &ChatEvent::MessageDeleted(deleted.clone()))?;
        tracing::info!(user_id = %actor, message_id = %id, "Message deleted");
        Ok(deleted)
    }

    /// One page of history with `principal`
    ///
    /// `msg_count` must be in `1..=max_page_size`.
    pub async fn get_messages(
        &self,
        user: UserId,
        principal: PrincipalId,
        cursor: Option<MessageId>,
        direction: Direction,
        msg_count: i32,
    ) -> AppResult<MessagePage> {
        self.check_page_size(msg_count)?;

        let conversation = self.conversation_with(user, principal).await?;
        let limit = msg_count as usize;
        let rows = self
            .store
            .fetch_messages(conversation, cursor, direction, limit as i64 + 1)
            .await?;
        Ok(MessagePage::from_overfetch(rows, limit, direction))
    }

    /// Keyword search over one conversation with `principal`, or over all of
    /// `user`'s friend and group conversations when `principal` is `None`
    ///
    /// Hits come newest first. `before` is an exclusive cursor: pass the
    /// last id of the previous page. Only the first page carries a total.
    /// An empty keyword matches every message.
    pub async fn search_messages(
        &self,
        user: UserId,
        principal: Option<PrincipalId>,
        keyword: &str,
        before: Option<MessageId>,
        msg_count: i32,
    ) -> AppResult<MessageSearchPage> {
        self.check_page_size(msg_count)?;

        let scope = match principal {
            Some(principal) => MessageScope::of(user, self.conversation_with(user, principal).await?),
            None => MessageScope {
                user,
                peers: self.store.friends_of(user).await?,
                groups: self.store.groups_of(user).await?,
            },
        };
        let keyword = Some(keyword.trim()).filter(|k| !k.is_empty());

        let total_count = match before {
            None => Some(self.store.count_messages(&scope, keyword).await?),
            Some(_) => None,
        };
        let limit = msg_count as usize;
        let rows = self
            .store
            .search_messages(&scope, keyword, before, limit as i64 + 1)
            .await?;
        Ok(MessageSearchPage::from_overfetch(rows, limit, total_count))
    }

    /// Latest message per friend and per group, most recent conversation first
    pub async fn recent_chats(&self, user: UserId) -> AppResult<Vec<RecentChat>> {
        let mut chats = Vec::new();

        for friend in self.store.friends_of(user).await? {
            let Some(profile) = self.store.user(friend).await? else {
                continue;
            };
            let last_message = self
                .store
                .latest_message(Conversation::Direct(user, friend))
                .await?;
            chats.push(RecentChat {
                principal_id: friend.into(),
                kind: PrincipalKind::User,
                name: profile.user_name,
                last_message,
            });
        }
        for group in self.store.groups_of(user).await? {
            let Some(info) = self.store.group(group).await? else {
                continue;
            };
            let last_message = self.store.latest_message(Conversation::Group(group)).await?;
            chats.push(RecentChat {
                principal_id: group.into(),
                kind: PrincipalKind::Group,
                name: info.name,
                last_message,
            });
        }

        // Conversations without messages sort last
        chats.sort_by(|a, b| {
            let key = |c: &RecentChat| c.last_message.as_ref().map(|m| m.id);
            key(b).cmp(&key(a)).then(a.principal_id.cmp(&b.principal_id))
        });
        Ok(chats)
    }

    fn check_page_size(&self, msg_count: i32) -> AppResult<()> {
        if msg_count <= 0 || msg_count > self.max_page_size {
            return Err(AppError::BadRequest {
                code: error_codes::INVALID_PAGE_SIZE,
                message: format!("msgCount must be between 1 and {}", self.max_page_size),
            });
        }
        Ok(())
    }

    /// Resolve `principal` to a conversation `user` is allowed to read and
    /// write
    async fn conversation_with(
        &self,
        user: UserId,
        principal: PrincipalId,
    ) -> AppResult<Conversation> {
        match self.store.principal_kind(principal).await? {
            Some(PrincipalKind::User) => {
                let peer = UserId(principal.0);
                require_friends(self.store.as_ref(), user, peer).await?;
                Ok(Conversation::Direct(user, peer))
            }
            Some(PrincipalKind::Group) => {
                let group = GroupId(principal.0);
                GroupAccess::verify(self.store.as_ref(), user, group).await?;
                Ok(Conversation::Group(group))
            }
            None => Err(AppError::not_found(
                error_codes::PRINCIPAL_NOT_FOUND,
                "no user or group with that id",
            )),
        }
    }

    fn deliver(&self, conversation: Conversation, event: &ChatEvent) -> AppResult<usize> {
        match conversation {
            Conversation::Direct(a, b) => self.broadcaster.publish_to(
                &[Channel::User(a), Channel::User(b)],
                Audience::only([a, b]),
                event,
            ),
            Conversation::Group(group) => self.broadcaster.publish(Channel::Group(group), event),
        }
    }
}

fn message_not_found() -> AppError {
    AppError::not_found(
        error_codes::MESSAGE_NOT_FOUND,
        "message does not exist or was already deleted",
    )
}
