//! # Actix Middleware Library
//!
//! Middleware shared by the chat backend's actix services
//!
//! ## Modules
//! - `identity`: trusted identity header -> `UserId` request extension
//! - `request_id`: request id propagation (X-Request-ID)
//! - `logging`: structured request logging

pub mod identity;
pub mod logging;
pub mod request_id;

pub use identity::{TrustedIdentity, UserId, DEFAULT_IDENTITY_HEADER};
pub use logging::Logging;
pub use request_id::{get_request_id, RequestId, RequestIdValue};
