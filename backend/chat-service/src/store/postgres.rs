//! tokio-postgres implementation over a deadpool pool

use super::{MessageStore, RelationshipStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    ChatMessage, Conversation, Direction, FriendRequest, FriendRequestState, Group, GroupId,
    GroupMember, MessageId, MessageKind, MessageScope, NewMessage, PrincipalId, PrincipalKind,
    PrincipalSummary, UserId, UserProfile,
};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use error_types::error_codes;
use tokio_postgres::{types::ToSql, Row};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, kind, content, sent_at, is_deleted, deleted_at";

const INSERT_MESSAGE: &str = r#"
    INSERT INTO chat_messages (sender_id, receiver_id, kind, content)
    VALUES ($1, $2, $3, $4)
    RETURNING id, sender_id, receiver_id, kind, content, sent_at, is_deleted, deleted_at
"#;

const REQUEST_COLUMNS: &str = "id, from_id, to_id, message, state, requested_at";

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn message_from_row(row: &Row) -> AppResult<ChatMessage> {
    let kind: String = row.get("kind");
    Ok(ChatMessage {
        id: MessageId(row.get("id")),
        sender_id: row.get::<_, Option<i64>>("sender_id").map(UserId),
        receiver_id: PrincipalId(row.get("receiver_id")),
        kind: MessageKind::from_db(&kind)
            .ok_or_else(|| AppError::Database(format!("unknown message kind {kind:?}")))?,
        content: row.get("content"),
        send_time: row.get("sent_at"),
        is_deleted: row.get("is_deleted"),
        deleted_at: row.get("deleted_at"),
    })
}

fn request_from_row(row: &Row) -> AppResult<FriendRequest> {
    let state: String = row.get("state");
    Ok(FriendRequest {
        id: row.get("id"),
        from_id: UserId(row.get("from_id")),
        to_id: UserId(row.get("to_id")),
        message: row.get("message"),
        state: FriendRequestState::from_db(&state)
            .ok_or_else(|| AppError::Database(format!("unknown request state {state:?}")))?,
        requested_at: row.get("requested_at"),
    })
}

fn group_from_row(row: &Row) -> Group {
    Group {
        id: GroupId(row.get("id")),
        name: row.get("name"),
        description: row.get("description"),
        owner_id: UserId(row.get("owner_id")),
        created_at: row.get("created_at"),
    }
}

fn member_from_row(row: &Row) -> GroupMember {
    GroupMember {
        group_id: GroupId(row.get("group_id")),
        user_id: UserId(row.get("user_id")),
        is_operator: row.get("is_operator"),
        joined_at: row.get("joined_at"),
    }
}

fn request_not_found() -> AppError {
    AppError::not_found(
        error_codes::FRIEND_REQUEST_NOT_FOUND,
        "no pending friend request with that id",
    )
}

/// `%keyword%` with LIKE metacharacters escaped
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// SQL filter selecting a conversation, with its positional parameters
fn conversation_filter(conversation: Conversation) -> (&'static str, Vec<i64>) {
    match conversation {
        Conversation::Direct(a, b) => (
            "((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))",
            vec![a.0, b.0],
        ),
        Conversation::Group(group) => ("receiver_id = $1", vec![group.0]),
    }
}

/// Live messages of a [`MessageScope`] matching an optional ILIKE pattern.
/// Parameters: `$1` user, `$2` peer ids, `$3` group ids, `$4` pattern.
const SEARCH_FILTER: &str = r#"
    NOT is_deleted
    AND (
        (sender_id = $1 AND receiver_id = ANY($2))
        OR (receiver_id = $1 AND sender_id = ANY($2))
        OR receiver_id = ANY($3)
    )
    AND ($4::text IS NULL OR content ILIKE $4)
"#;

fn scope_params(scope: &MessageScope) -> (Vec<i64>, Vec<i64>) {
    (
        scope.peers.iter().map(|p| p.0).collect(),
        scope.groups.iter().map(|g| g.0).collect(),
    )
}

fn as_params(values: &[i64]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl RelationshipStore for PgStore {
    async fn principal_kind(&self, id: PrincipalId) -> AppResult<Option<PrincipalKind>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT p.kind
                FROM principals p
                LEFT JOIN chat_groups g ON g.id = p.id
                WHERE p.id = $1 AND (p.kind = 'user' OR g.deleted_at IS NULL)
                "#,
                &[&id.0],
            )
            .await?;
        Ok(row.and_then(|r| PrincipalKind::from_db(r.get::<_, &str>("kind"))))
    }

    async fn user(&self, id: UserId) -> AppResult<Option<UserProfile>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, user_name, nickname FROM users WHERE id = $1",
                &[&id.0],
            )
            .await?;
        Ok(row.map(|r| UserProfile {
            id: UserId(r.get("id")),
            user_name: r.get("user_name"),
            nickname: r.get("nickname"),
        }))
    }

    async fn search_principals(
        &self,
        keyword: &str,
        limit: i64,
    ) -> AppResult<Vec<PrincipalSummary>> {
        let client = self.pool.get().await?;
        let pattern = like_pattern(keyword);
        let rows = client
            .query(
                r#"
                SELECT id, 'user' AS kind, user_name AS name
                FROM users
                WHERE id::text LIKE $1 OR user_name ILIKE $1
                UNION ALL
                SELECT id, 'group' AS kind, name
                FROM chat_groups
                WHERE deleted_at IS NULL AND (id::text LIKE $1 OR name ILIKE $1)
                ORDER BY kind DESC, id
                LIMIT $2
                "#,
                &[&pattern, &limit],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(PrincipalSummary {
                    id: PrincipalId(r.get("id")),
                    kind: PrincipalKind::from_db(r.get::<_, &str>("kind"))?,
                    name: r.get("name"),
                })
            })
            .collect())
    }

    async fn is_friend(&self, a: UserId, b: UserId) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM friendships WHERE from_id = $1 AND to_id = $2)",
                &[&a.0, &b.0],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn friends_of(&self, user: UserId) -> AppResult<Vec<UserId>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT to_id FROM friendships WHERE from_id = $1 ORDER BY to_id",
                &[&user.0],
            )
            .await?;
        Ok(rows.iter().map(|r| UserId(r.get(0))).collect())
    }

    async fn groups_of(&self, user: UserId) -> AppResult<Vec<GroupId>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT gm.group_id
                FROM group_members gm
                JOIN chat_groups g ON g.id = gm.group_id AND g.deleted_at IS NULL
                WHERE gm.user_id = $1
                ORDER BY gm.group_id
                "#,
                &[&user.0],
            )
            .await?;
        Ok(rows.iter().map(|r| GroupId(r.get(0))).collect())
    }

    async fn group(&self, id: GroupId) -> AppResult<Option<Group>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, name, description, owner_id, created_at
                FROM chat_groups
                WHERE id = $1 AND deleted_at IS NULL
                "#,
                &[&id.0],
            )
            .await?;
        Ok(row.as_ref().map(group_from_row))
    }

    async fn members_of(&self, group: GroupId) -> AppResult<Vec<GroupMember>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT group_id, user_id, is_operator, joined_at
                FROM group_members
                WHERE group_id = $1
                ORDER BY user_id
                "#,
                &[&group.0],
            )
            .await?;
        Ok(rows.iter().map(member_from_row).collect())
    }

    async fn membership(&self, group: GroupId, user: UserId) -> AppResult<Option<GroupMember>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT group_id, user_id, is_operator, joined_at
                FROM group_members
                WHERE group_id = $1 AND user_id = $2
                "#,
                &[&group.0, &user.0],
            )
            .await?;
        Ok(row.as_ref().map(member_from_row))
    }

    async fn pending_request_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> AppResult<Option<FriendRequest>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM friend_requests \
             WHERE ((from_id = $1 AND to_id = $2) OR (from_id = $2 AND to_id = $1)) \
               AND state = 'pending' \
             ORDER BY id DESC LIMIT 1"
        );
        let row = client.query_opt(sql.as_str(), &[&a.0, &b.0]).await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn create_friend_request(
        &self,
        from: UserId,
        to: UserId,
        message: &str,
    ) -> AppResult<FriendRequest> {
        let client = self.pool.get().await?;
        let sql = format!(
            "INSERT INTO friend_requests (from_id, to_id, message) VALUES ($1, $2, $3) \
             RETURNING {REQUEST_COLUMNS}"
        );
        let row = client
            .query_one(sql.as_str(), &[&from.0, &to.0, &message])
            .await?;
        request_from_row(&row)
    }

    async fn friend_request(&self, id: i64) -> AppResult<Option<FriendRequest>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = $1");
        let row = client.query_opt(sql.as_str(), &[&id]).await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn friend_requests_to(&self, user: UserId) -> AppResult<Vec<FriendRequest>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE to_id = $1 ORDER BY id DESC"
        );
        let rows = client.query(sql.as_str(), &[&user.0]).await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn reject_friend_request(&self, id: i64) -> AppResult<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE friend_requests SET state = 'rejected' WHERE id = $1 AND state = 'pending'",
                &[&id],
            )
            .await?;
        if updated == 0 {
            return Err(request_not_found());
        }
        Ok(())
    }

    async fn accept_friend_request(&self, id: i64, seed: NewMessage) -> AppResult<ChatMessage> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                r#"
                UPDATE friend_requests SET state = 'accepted'
                WHERE id = $1 AND state = 'pending'
                RETURNING from_id, to_id
                "#,
                &[&id],
            )
            .await?
            .ok_or_else(request_not_found)?;
        let from_id: i64 = row.get("from_id");
        let to_id: i64 = row.get("to_id");

        // Dropping the transaction rolls the request update back
        let already = tx
            .query_opt(
                "SELECT 1 FROM friendships WHERE from_id = $1 AND to_id = $2",
                &[&from_id, &to_id],
            )
            .await?;
        if already.is_some() {
            return Err(AppError::conflict(
                error_codes::ALREADY_FRIENDS,
                "you are already friends",
            ));
        }

        tx.execute(
            "INSERT INTO friendships (from_id, to_id) VALUES ($1, $2), ($2, $1)",
            &[&from_id, &to_id],
        )
        .await?;

        let sender = seed.sender_id.map(|s| s.0);
        let row = tx
            .query_one(
                INSERT_MESSAGE,
                &[&sender, &seed.receiver_id.0, &seed.kind.to_db(), &seed.content],
            )
            .await?;
        let message = message_from_row(&row)?;

        tx.commit().await?;
        Ok(message)
    }

    async fn remove_friendship(&self, a: UserId, b: UserId) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                r#"
                DELETE FROM friendships
                WHERE (from_id = $1 AND to_id = $2) OR (from_id = $2 AND to_id = $1)
                "#,
                &[&a.0, &b.0],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn create_group(
        &self,
        owner: UserId,
        name: &str,
        description: &str,
        seed_content: &str,
    ) -> AppResult<(Group, ChatMessage)> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_one(
                "INSERT INTO principals (kind) VALUES ('group') RETURNING id",
                &[],
            )
            .await?;
        let group_id: i64 = row.get(0);

        let row = tx
            .query_one(
                r#"
                INSERT INTO chat_groups (id, name, description, owner_id)
                VALUES ($1, $2, $3, $4)
                RETURNING id, name, description, owner_id, created_at
                "#,
                &[&group_id, &name, &description, &owner.0],
            )
            .await?;
        let group = group_from_row(&row);

        tx.execute(
            "INSERT INTO group_members (group_id, user_id, is_operator) VALUES ($1, $2, TRUE)",
            &[&group_id, &owner.0],
        )
        .await?;

        let kind = MessageKind::System.to_db();
        let row = tx
            .query_one(
                INSERT_MESSAGE,
                &[&Some(owner.0), &group_id, &kind, &seed_content],
            )
            .await?;
        let seed = message_from_row(&row)?;

        tx.commit().await?;
        Ok((group, seed))
    }

    async fn add_member(
        &self,
        group: GroupId,
        user: UserId,
        seed: NewMessage,
    ) -> AppResult<ChatMessage> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // Lock the group row so a concurrent delete cannot interleave
        tx.query_opt(
            "SELECT id FROM chat_groups WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            &[&group.0],
        )
        .await?
        .ok_or_else(|| AppError::not_found(error_codes::GROUP_NOT_FOUND, "group does not exist"))?;

        let inserted = tx
            .execute(
                r#"
                INSERT INTO group_members (group_id, user_id, is_operator)
                VALUES ($1, $2, FALSE)
                ON CONFLICT DO NOTHING
                "#,
                &[&group.0, &user.0],
            )
            .await?;
        if inserted == 0 {
            return Err(AppError::conflict(
                error_codes::ALREADY_GROUP_MEMBER,
                "user is already a member",
            ));
        }

        let sender = seed.sender_id.map(|s| s.0);
        let row = tx
            .query_one(
                INSERT_MESSAGE,
                &[&sender, &seed.receiver_id.0, &seed.kind.to_db(), &seed.content],
            )
            .await?;
        let message = message_from_row(&row)?;

        tx.commit().await?;
        Ok(message)
    }

    async fn remove_member(&self, group: GroupId, user: UserId) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM group_members WHERE group_id = $1 AND user_id = $2",
                &[&group.0, &user.0],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn set_operator(
        &self,
        group: GroupId,
        user: UserId,
        is_operator: bool,
    ) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE group_members SET is_operator = $3 WHERE group_id = $1 AND user_id = $2",
                &[&group.0, &user.0, &is_operator],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn delete_group(&self, group: GroupId) -> AppResult<Vec<UserId>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // The row is kept as a tombstone so messages keep a valid receiver
        tx.execute(
            "UPDATE chat_groups SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
            &[&group.0],
        )
        .await?;
        let rows = tx
            .query(
                "DELETE FROM group_members WHERE group_id = $1 RETURNING user_id",
                &[&group.0],
            )
            .await?;

        tx.commit().await?;
        Ok(rows.iter().map(|r| UserId(r.get(0))).collect())
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn insert_message(&self, message: NewMessage) -> AppResult<ChatMessage> {
        let client = self.pool.get().await?;
        let sender = message.sender_id.map(|s| s.0);
        let row = client
            .query_one(
                INSERT_MESSAGE,
                &[
                    &sender,
                    &message.receiver_id.0,
                    &message.kind.to_db(),
                    &message.content,
                ],
            )
            .await?;
        message_from_row(&row)
    }

    async fn message(&self, id: MessageId) -> AppResult<Option<ChatMessage>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = $1");
        let row = client.query_opt(sql.as_str(), &[&id.0]).await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn tombstone_message(&self, id: MessageId) -> AppResult<Option<ChatMessage>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "UPDATE chat_messages SET is_deleted = TRUE, deleted_at = NOW() \
             WHERE id = $1 AND NOT is_deleted RETURNING {MESSAGE_COLUMNS}"
        );
        let row = client.query_opt(sql.as_str(), &[&id.0]).await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn fetch_messages(
        &self,
        conversation: Conversation,
        cursor: Option<MessageId>,
        direction: Direction,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        let (filter, mut values) = conversation_filter(conversation);
        let (cmp, order) = match direction {
            Direction::Before => ("<=", "DESC"),
            Direction::After => (">=", "ASC"),
        };

        let mut sql =
            format!("SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE NOT is_deleted AND {filter}");
        if let Some(cursor) = cursor {
            values.push(cursor.0);
            sql.push_str(&format!(" AND id {cmp} ${}", values.len()));
        }
        values.push(limit);
        sql.push_str(&format!(" ORDER BY id {order} LIMIT ${}", values.len()));

        let client = self.pool.get().await?;
        let rows = client.query(sql.as_str(), &as_params(&values)).await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn latest_message(&self, conversation: Conversation) -> AppResult<Option<ChatMessage>> {
        let (filter, values) = conversation_filter(conversation);
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE NOT is_deleted AND {filter} \
             ORDER BY id DESC LIMIT 1"
        );
        let client = self.pool.get().await?;
        let row = client.query_opt(sql.as_str(), &as_params(&values)).await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn search_messages(
        &self,
        scope: &MessageScope,
        keyword: Option<&str>,
        before: Option<MessageId>,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        let (peers, groups) = scope_params(scope);
        let pattern = keyword.map(like_pattern);
        let before = before.map(|id| id.0);
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE {SEARCH_FILTER} \
             AND ($5::bigint IS NULL OR id < $5) \
             ORDER BY id DESC LIMIT $6"
        );

        let client = self.pool.get().await?;
        let rows = client
            .query(
                sql.as_str(),
                &[&scope.user.0, &peers, &groups, &pattern, &before, &limit],
            )
            .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn count_messages(&self, scope: &MessageScope, keyword: Option<&str>) -> AppResult<i64> {
        let (peers, groups) = scope_params(scope);
        let pattern = keyword.map(like_pattern);
        let sql = format!("SELECT COUNT(*) AS total FROM chat_messages WHERE {SEARCH_FILTER}");

        let client = self.pool.get().await?;
        let row = client
            .query_one(sql.as_str(), &[&scope.user.0, &peers, &groups, &pattern])
            .await?;
        Ok(row.get("total"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("ali"), "%ali%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_conversation_filter_parameters() {
        let (filter, values) = conversation_filter(Conversation::Direct(UserId(3), UserId(9)));
        assert!(filter.contains("$2"));
        assert_eq!(values, vec![3, 9]);

        let (filter, values) = conversation_filter(Conversation::Group(GroupId(5)));
        assert_eq!(filter, "receiver_id = $1");
        assert_eq!(values, vec![5]);
    }
}
