//! Authorization guards
//!
//! Handlers and services obtain permission context through these types
//! instead of querying membership ad hoc, so a check cannot be skipped by
//! accident.

use std::future::Future;
use std::pin::Pin;

use crate::error::{AppError, AppResult};
use crate::models::{Group, GroupId, GroupMember, UserId};
use crate::store::RelationshipStore;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use error_types::error_codes;

/// The caller, as identified by the trusted identity header
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: UserId,
}

impl FromRequest for User {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let user_id = req
            .extensions()
            .get::<actix_middleware::UserId>()
            .copied()
            .map(UserId::from);

        Box::pin(async move {
            let id = user_id.ok_or(AppError::Unauthorized)?;
            Ok(User { id })
        })
    }
}

/// A verified group member with the group it belongs to
#[derive(Debug, Clone)]
pub struct GroupAccess {
    pub group: Group,
    pub member: GroupMember,
}

impl GroupAccess {
    /// Fails with `NotFound` for an unknown group and `Forbidden` when
    /// `user` is not a member
    pub async fn verify(
        store: &(impl RelationshipStore + ?Sized),
        user: UserId,
        group: GroupId,
    ) -> AppResult<Self> {
        let group = store.group(group).await?.ok_or_else(|| {
            AppError::not_found(error_codes::GROUP_NOT_FOUND, "group does not exist")
        })?;
        let member = store.membership(group.id, user).await?.ok_or_else(|| {
            AppError::forbidden(
                error_codes::NOT_GROUP_MEMBER,
                "you are not a member of this group",
            )
        })?;
        Ok(Self { group, member })
    }

    pub fn require_operator(&self) -> AppResult<()> {
        if self.member.is_operator {
            Ok(())
        } else {
            Err(AppError::forbidden(
                error_codes::NOT_GROUP_OPERATOR,
                "only group operators can do this",
            ))
        }
    }

    pub fn is_owner(&self, user: UserId) -> bool {
        self.group.owner_id == user
    }
}

pub async fn require_friends(
    store: &(impl RelationshipStore + ?Sized),
    a: UserId,
    b: UserId,
) -> AppResult<()> {
    if store.is_friend(a, b).await? {
        Ok(())
    } else {
        Err(AppError::forbidden(
            error_codes::NOT_FRIENDS,
            "you are not friends with this user",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_group_access_distinguishes_missing_and_outsider() {
        let store = MemoryStore::new();
        let owner = store.add_user("owner").await.id;
        let outsider = store.add_user("outsider").await.id;
        let (group, _) = store.create_group(owner, "g", "", "created").await.unwrap();

        let access = GroupAccess::verify(&store, owner, group.id).await.unwrap();
        assert!(access.require_operator().is_ok());
        assert!(access.is_owner(owner));

        let err = GroupAccess::verify(&store, outsider, group.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), error_codes::NOT_GROUP_MEMBER);

        let err = GroupAccess::verify(&store, owner, GroupId(9_999))
            .await
            .unwrap_err();
        assert_eq!(err.code(), error_codes::GROUP_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_require_friends() {
        let store = MemoryStore::new();
        let a = store.add_user("a").await.id;
        let b = store.add_user("b").await.id;
        let err = require_friends(&store, a, b).await.unwrap_err();
        assert_eq!(err.status(), 403);
    }
}
