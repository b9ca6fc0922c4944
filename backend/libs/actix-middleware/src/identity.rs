//! Trusted identity middleware
//!
//! Authentication happens upstream (gateway / auth proxy). The gateway
//! forwards the authenticated account id in a trusted header; this
//! middleware parses it and stores a [`UserId`] in the request extensions.
//!
//! - Header absent: the request passes through without a `UserId`; handlers
//!   that need an identity reject it through their extractor.
//! - Header present but not a positive integer: rejected with 401.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    http::header::{HeaderName, InvalidHeaderName},
    Error, HttpMessage, HttpResponse,
};
use error_types::{error_codes, error_kinds, ErrorResponse};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};

pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

/// Authenticated account id forwarded by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

impl UserId {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<i64>() {
            Ok(id) if id > 0 => Some(Self(id)),
            _ => None,
        }
    }
}

/// Middleware that turns the trusted identity header into a `UserId`
#[derive(Clone)]
pub struct TrustedIdentity {
    header: HeaderName,
}

impl TrustedIdentity {
    pub fn new(header: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::from_bytes(header.to_ascii_lowercase().as_bytes())?,
        })
    }
}

impl Default for TrustedIdentity {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TrustedIdentity
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TrustedIdentityService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TrustedIdentityService {
            service,
            header: self.header.clone(),
        }))
    }
}

pub struct TrustedIdentityService<S> {
    service: S,
    header: HeaderName,
}

impl<S, B> Service<ServiceRequest> for TrustedIdentityService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(raw) = req.headers().get(&self.header) {
            match raw.to_str().ok().and_then(UserId::parse) {
                Some(user_id) => {
                    req.extensions_mut().insert(user_id);
                }
                None => {
                    tracing::warn!(
                        path = %req.path(),
                        header = %self.header,
                        "Rejecting request with malformed identity header"
                    );
                    let body = ErrorResponse::new(
                        "Unauthorized",
                        "malformed identity header",
                        401,
                        error_kinds::AUTHENTICATION_ERROR,
                        error_codes::IDENTITY_MISSING,
                    );
                    let err: Error = InternalError::from_response(
                        "malformed identity header",
                        HttpResponse::Unauthorized().json(body),
                    )
                    .into();
                    return Box::pin(async move { Err(err) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}
