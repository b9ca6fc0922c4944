use crate::{
    error::AppError,
    middleware::guards::User,
    models::{Direction, MessageId, MessageKind, PrincipalId},
    state::AppState,
};
use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesQuery {
    pub principal_id: i64,
    /// Inclusive cursor; absent starts from the newest (before) or oldest
    /// (after) message
    pub msg_id: Option<i64>,
    /// `before` or `after`, matched exactly
    pub direction: String,
    pub msg_count: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub principal_id: PrincipalId,
    pub content: String,
    #[serde(alias = "type")]
    pub kind: MessageKind,
}

/// GET /api/chat/recent
#[get("/api/chat/recent")]
pub async fn recent_chats(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let chats = state.messages.recent_chats(user.id).await?;
    Ok(HttpResponse::Ok().json(chats))
}

/// GET /api/chat/messages
#[get("/api/chat/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<GetMessagesQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let direction = Direction::parse(&query.direction)?;
    let page = state
        .messages
        .get_messages(
            user.id,
            PrincipalId(query.principal_id),
            query.msg_id.map(MessageId),
            direction,
            query.msg_count,
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// POST /api/chat/messages
#[post("/api/chat/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let message = state
        .messages
        .send_message(user.id, body.principal_id, &body.content, body.kind)
        .await?;
    Ok(HttpResponse::Created().json(message))
}

/// DELETE /api/chat/messages/{id}
///
/// Authorization: the message's sender
#[delete("/api/chat/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .delete_message(user.id, MessageId(message_id.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(message))
}
