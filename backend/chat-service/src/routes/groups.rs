//! Group management endpoints
//!
//! Membership changes go through the coordinator so live subscriptions
//! follow the committed data; operator flags go through the group service.

use crate::{
    error::AppError,
    middleware::guards::User,
    models::{GroupId, UserId},
    state::AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: UserId,
}

/// POST /api/groups
#[post("/api/groups")]
pub async fn create_group(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let group = state
        .coordinator
        .create_group(user.id, &body.name, &body.description)
        .await?;
    Ok(HttpResponse::Created().json(group))
}

/// GET /api/groups
#[get("/api/groups")]
pub async fn my_groups(state: web::Data<AppState>, user: User) -> Result<HttpResponse, AppError> {
    let groups = state.groups.my_groups(user.id).await?;
    Ok(HttpResponse::Ok().json(groups))
}

/// DELETE /api/groups/{id}
///
/// Authorization: operator
#[delete("/api/groups/{id}")]
pub async fn delete_group(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    state
        .coordinator
        .delete_group(user.id, GroupId(group_id.into_inner()))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/groups/{id}/members
#[get("/api/groups/{id}/members")]
pub async fn list_members(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let members = state
        .groups
        .list_members(user.id, GroupId(group_id.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(members))
}

/// POST /api/groups/{id}/members
///
/// Authorization: operator, and the new member must be the operator's friend
#[post("/api/groups/{id}/members")]
pub async fn add_member(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<i64>,
    body: web::Json<AddMemberRequest>,
) -> Result<HttpResponse, AppError> {
    let seed = state
        .coordinator
        .add_member(user.id, GroupId(group_id.into_inner()), body.user_id)
        .await?;
    Ok(HttpResponse::Created().json(seed))
}

/// DELETE /api/groups/{id}/members/{user_id}
///
/// Authorization:
/// - operator, to remove someone else
/// - any member, to leave
#[delete("/api/groups/{id}/members/{user_id}")]
pub async fn remove_member(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    let (group_id, target) = path.into_inner();
    state
        .coordinator
        .remove_member(user.id, GroupId(group_id), UserId(target))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/groups/{id}/operators
#[get("/api/groups/{id}/operators")]
pub async fn list_operators(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let operators = state
        .groups
        .list_operators(user.id, GroupId(group_id.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(operators))
}

/// PUT /api/groups/{id}/operators/{user_id}
#[put("/api/groups/{id}/operators/{user_id}")]
pub async fn set_operator(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    let (group_id, target) = path.into_inner();
    state
        .groups
        .set_operator(user.id, GroupId(group_id), UserId(target))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /api/groups/{id}/operators/{user_id}
#[delete("/api/groups/{id}/operators/{user_id}")]
pub async fn unset_operator(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    let (group_id, target) = path.into_inner();
    state
        .groups
        .unset_operator(user.id, GroupId(group_id), UserId(target))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
