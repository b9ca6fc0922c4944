use crate::{
    error::AppError,
    middleware::guards::User,
    models::{MessageId, PrincipalId},
    state::AppState,
};
use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keyword: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMessagesQuery {
    /// Friend or group to search; absent searches every conversation
    pub principal_id: Option<i64>,
    #[serde(default)]
    pub keyword: String,
    /// Exclusive cursor: the last id of the previous page
    pub msg_id: Option<i64>,
    pub msg_count: i32,
}

/// GET /api/search/principals?keyword=
#[get("/api/search/principals")]
pub async fn search_principals(
    state: web::Data<AppState>,
    _user: User,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let results = state.search.search_principals(&query.keyword).await?;
    Ok(HttpResponse::Ok().json(results))
}

/// GET /api/search/messages?keyword=&msgCount=
#[get("/api/search/messages")]
pub async fn search_messages(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<SearchMessagesQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let page = state
        .messages
        .search_messages(
            user.id,
            query.principal_id.map(PrincipalId),
            &query.keyword,
            query.msg_id.map(MessageId),
            query.msg_count,
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}
