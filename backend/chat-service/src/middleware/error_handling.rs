use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_kinds, ErrorResponse};

/// Map a domain error to its HTTP status and structured `code + message` body
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let error_type = match err {
        AppError::BadRequest { .. } => error_kinds::VALIDATION_ERROR,
        AppError::Unauthorized => error_kinds::AUTHENTICATION_ERROR,
        AppError::Forbidden { .. } => error_kinds::AUTHORIZATION_ERROR,
        AppError::NotFound { .. } => error_kinds::NOT_FOUND_ERROR,
        AppError::Conflict { .. } => error_kinds::CONFLICT_ERROR,
        AppError::Database(_)
        | AppError::Config(_)
        | AppError::StartServer(_)
        | AppError::Internal => error_kinds::SERVER_ERROR,
    };

    // Infrastructure details stay in the logs
    let message = match err {
        AppError::Database(detail) => {
            tracing::error!(error = %detail, "store failure");
            "storage temporarily unavailable".to_string()
        }
        AppError::BadRequest { message, .. }
        | AppError::Forbidden { message, .. }
        | AppError::NotFound { message, .. }
        | AppError::Conflict { message, .. } => message.clone(),
        other => other.to_string(),
    };

    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &message,
        status.as_u16(),
        error_type,
        err.code(),
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}
