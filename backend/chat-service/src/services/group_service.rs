use crate::error::{AppError, AppResult};
use crate::middleware::guards::GroupAccess;
use crate::models::{Group, GroupId, GroupMember, UserId};
use crate::store::SharedStore;
use error_types::error_codes;

/// Group queries and operator flags
///
/// Operator changes do not alter channel membership, so they bypass the
/// coordinator.
#[derive(Clone)]
pub struct GroupService {
    store: SharedStore,
}

impl GroupService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn my_groups(&self, user: UserId) -> AppResult<Vec<Group>> {
        let mut groups = Vec::new();
        for id in self.store.groups_of(user).await? {
            if let Some(group) = self.store.group(id).await? {
                groups.push(group);
            }
        }
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    pub async fn list_members(&self, user: UserId, group: GroupId) -> AppResult<Vec<GroupMember>> {
        GroupAccess::verify(self.store.as_ref(), user, group).await?;
        self.store.members_of(group).await
    }

    pub async fn list_operators(
        &self,
        user: UserId,
        group: GroupId,
    ) -> AppResult<Vec<GroupMember>> {
        let mut members = self.list_members(user, group).await?;
        members.retain(|m| m.is_operator);
        Ok(members)
    }

    pub async fn set_operator(&self, actor: UserId, group: GroupId, target: UserId) -> AppResult<()> {
        let access = GroupAccess::verify(self.store.as_ref(), actor, group).await?;
        access.require_operator()?;

        if !self.store.set_operator(group, target, true).await? {
            return Err(not_a_member());
        }
        tracing::info!(user_id = %actor, member_id = %target, group_id = %group, "Operator granted");
        Ok(())
    }

    pub async fn unset_operator(
        &self,
        actor: UserId,
        group: GroupId,
        target: UserId,
    ) -> AppResult<()> {
        let access = GroupAccess::verify(self.store.as_ref(), actor, group).await?;
        if access.is_owner(target) {
            return Err(AppError::forbidden(
                error_codes::GROUP_OWNER_PROTECTED,
                "the group owner is always an operator",
            ));
        }
        access.require_operator()?;
        if actor == target {
            return Err(AppError::forbidden(
                error_codes::SELF_DEMOTION,
                "you cannot revoke your own operator flag",
            ));
        }

        if !self.store.set_operator(group, target, false).await? {
            return Err(not_a_member());
        }
        tracing::info!(user_id = %actor, member_id = %target, group_id = %group, "Operator revoked");
        Ok(())
    }
}

fn not_a_member() -> AppError {
    AppError::not_found(
        error_codes::NOT_GROUP_MEMBER,
        "user is not a member of this group",
    )
}
