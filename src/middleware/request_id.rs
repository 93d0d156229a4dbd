use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;

/// HTTP header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the authenticated reader's id, set by the gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extension type for storing request ID in request extensions
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Middleware that generates or extracts a request ID and adds it to the request extensions.
/// Also adds the request ID to the response headers.
///
/// If the incoming request has an `x-request-id` header, it will be used.
/// Otherwise, a new UUID v4 will be generated.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .map(RequestId)
        .unwrap_or_else(RequestId::new);

    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id.as_str()) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// Caller identity taken from the `x-user-id` header.
///
/// `Anonymous` when the header is absent; `Malformed` when it is present but
/// not a UUID, which handlers reject.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(Uuid),
    Malformed,
}

impl Caller {
    fn from_header(value: Option<&HeaderValue>) -> Self {
        match value {
            None => Caller::Anonymous,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .map(Caller::User)
                .unwrap_or(Caller::Malformed),
        }
    }

    /// Optional user for endpoints that serve anonymous callers
    pub fn optional(self) -> Result<Option<Uuid>, AppError> {
        match self {
            Caller::Anonymous => Ok(None),
            Caller::User(id) => Ok(Some(id)),
            Caller::Malformed => Err(AppError::InvalidInput(format!(
                "{} header must be a UUID",
                USER_ID_HEADER
            ))),
        }
    }

    /// User for endpoints that need one
    pub fn required(self) -> Result<Uuid, AppError> {
        self.optional()?.ok_or(AppError::Unauthorized)
    }
}

/// Resolves the caller once and stores it in the request extensions
pub async fn caller_middleware(mut request: Request, next: Next) -> Response {
    let caller = Caller::from_header(request.headers().get(USER_ID_HEADER));
    request.extensions_mut().insert(caller);
    next.run(request).await
}

#[async_trait::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Caller>()
            .copied()
            .unwrap_or_else(|| Caller::from_header(parts.headers.get(USER_ID_HEADER))))
    }
}

/// Helper function to create a tracing span with request ID
pub fn make_span_with_request_id(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.as_str())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}
