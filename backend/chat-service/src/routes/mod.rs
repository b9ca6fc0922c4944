use crate::error::AppError;
use actix_web::web;

pub mod chat;
pub mod friends;
pub mod groups;
pub mod search;
pub mod wsroute;

/// Register every `/api` and `/ws` endpoint
///
/// Malformed query strings and JSON bodies are answered with the same
/// structured validation error as every other rejected request.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::bad_request(err.to_string()).into()),
    )
    .app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::bad_request(err.to_string()).into()),
    );

    cfg.service(friends::request_friend)
        .service(friends::my_friend_requests)
        .service(friends::accept_friend_request)
        .service(friends::reject_friend_request)
        .service(friends::my_friends)
        .service(friends::remove_friend)
        .service(groups::create_group)
        .service(groups::my_groups)
        .service(groups::delete_group)
        .service(groups::list_members)
        .service(groups::add_member)
        .service(groups::remove_member)
        .service(groups::list_operators)
        .service(groups::set_operator)
        .service(groups::unset_operator)
        .service(chat::recent_chats)
        .service(chat::get_messages)
        .service(chat::send_message)
        .service(chat::delete_message)
        .service(search::search_principals)
        .service(search::search_messages)
        .service(wsroute::ws_handler);
}
