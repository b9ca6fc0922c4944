//! Friend request and friendship endpoints

use crate::{
    error::AppError,
    middleware::guards::User,
    models::UserId,
    state::AppState,
};
use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestBody {
    pub to_id: UserId,
    #[serde(default)]
    pub message: String,
}

/// POST /api/friends/requests
#[post("/api/friends/requests")]
pub async fn request_friend(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<FriendRequestBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let request = state
        .friends
        .request_friend(user.id, body.to_id, &body.message)
        .await?;
    Ok(HttpResponse::Created().json(request))
}

/// GET /api/friends/requests
/// Requests addressed to the caller, newest first
#[get("/api/friends/requests")]
pub async fn my_friend_requests(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let requests = state.friends.my_friend_requests(user.id).await?;
    Ok(HttpResponse::Ok().json(requests))
}

/// POST /api/friends/requests/{id}/accept
#[post("/api/friends/requests/{id}/accept")]
pub async fn accept_friend_request(
    state: web::Data<AppState>,
    user: User,
    request_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let seed = state
        .coordinator
        .accept_friend_request(user.id, request_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(seed))
}

/// POST /api/friends/requests/{id}/reject
#[post("/api/friends/requests/{id}/reject")]
pub async fn reject_friend_request(
    state: web::Data<AppState>,
    user: User,
    request_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    state
        .friends
        .reject_friend_request(user.id, request_id.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/friends
#[get("/api/friends")]
pub async fn my_friends(state: web::Data<AppState>, user: User) -> Result<HttpResponse, AppError> {
    let friends = state.friends.my_friends(user.id).await?;
    Ok(HttpResponse::Ok().json(friends))
}

/// DELETE /api/friends/{friend_id}
#[delete("/api/friends/{friend_id}")]
pub async fn remove_friend(
    state: web::Data<AppState>,
    user: User,
    friend_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    state
        .coordinator
        .remove_friend(user.id, UserId(friend_id.into_inner()))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
