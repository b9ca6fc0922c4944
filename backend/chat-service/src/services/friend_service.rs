use crate::error::{AppError, AppResult};
use crate::models::{FriendRequest, UserId, UserProfile};
use crate::store::SharedStore;
use error_types::error_codes;

const MAX_REQUEST_MESSAGE_LEN: usize = 200;

/// Friend request bookkeeping that does not touch live subscriptions
///
/// Accepting and removing friends go through
/// [`MembershipCoordinator`](super::MembershipCoordinator).
#[derive(Clone)]
pub struct FriendService {
    store: SharedStore,
}

impl FriendService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn request_friend(
        &self,
        from: UserId,
        to: UserId,
        message: &str,
    ) -> AppResult<FriendRequest> {
        if from == to {
            return Err(AppError::bad_request("cannot send a friend request to yourself"));
        }
        if message.chars().count() > MAX_REQUEST_MESSAGE_LEN {
            return Err(AppError::bad_request(format!(
                "request message must be at most {MAX_REQUEST_MESSAGE_LEN} characters"
            )));
        }
        if self.store.user(to).await?.is_none() {
            return Err(AppError::not_found(
                error_codes::USER_NOT_FOUND,
                "user does not exist",
            ));
        }
        if self.store.is_friend(from, to).await? {
            return Err(AppError::conflict(
                error_codes::ALREADY_FRIENDS,
                "you are already friends",
            ));
        }
        if self.store.pending_request_between(from, to).await?.is_some() {
            return Err(AppError::conflict(
                error_codes::FRIEND_REQUEST_PENDING,
                "a friend request is already pending",
            ));
        }

        let request = self.store.create_friend_request(from, to, message).await?;
        tracing::info!(
            user_id = %from,
            target_id = %to,
            request_id = request.id,
            "Friend request sent"
        );
        Ok(request)
    }

    /// Only the addressee may reject
    pub async fn reject_friend_request(&self, actor: UserId, request_id: i64) -> AppResult<()> {
        let addressed_to_actor = self
            .store
            .friend_request(request_id)
            .await?
            .is_some_and(|r| r.to_id == actor);
        if !addressed_to_actor {
            return Err(AppError::not_found(
                error_codes::FRIEND_REQUEST_NOT_FOUND,
                "no pending friend request with that id",
            ));
        }

        self.store.reject_friend_request(request_id).await?;
        tracing::info!(user_id = %actor, request_id, "Friend request rejected");
        Ok(())
    }

    pub async fn my_friend_requests(&self, user: UserId) -> AppResult<Vec<FriendRequest>> {
        self.store.friend_requests_to(user).await
    }

    pub async fn my_friends(&self, user: UserId) -> AppResult<Vec<UserProfile>> {
        let mut friends = Vec::new();
        for id in self.store.friends_of(user).await? {
            if let Some(profile) = self.store.user(id).await? {
                friends.push(profile);
            }
        }
        Ok(friends)
    }
}
