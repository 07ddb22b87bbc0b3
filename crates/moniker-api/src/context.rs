//! Per-request caller context.
//!
//! Caller identity is taken from `X-User-Id`, `X-Service-Id` and `X-App-Id`
//! headers and the write token from `Authorization: Bearer`. Identity is
//! informational; only the token gates writes.

use axum::extract::{FromRequestParts, Request};
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use moniker_service::{CallerIdentity, ServiceError};
use ulid::Ulid;

use crate::error::ApiError;

/// Header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Context extracted from request headers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Who is calling.
    pub caller: CallerIdentity,
    /// Bearer token, if supplied.
    pub token: Option<String>,
    /// Request ID for tracing and correlation.
    pub request_id: String,
}

impl RequestContext {
    /// Builds the context from headers, generating a request id if absent.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            caller: CallerIdentity {
                user_id: header_string(headers, "X-User-Id"),
                service_id: header_string(headers, "X-Service-Id"),
                app_id: header_string(headers, "X-App-Id"),
            },
            token: bearer_token(headers),
            request_id: header_string(headers, REQUEST_ID_HEADER)
                .unwrap_or_else(|| Ulid::new().to_string()),
        }
    }

    /// Returns the bearer token as a borrowed str.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Converts a service error into a response tagged with this request.
    #[must_use]
    pub fn error(&self, err: ServiceError) -> ApiError {
        ApiError::from(err).with_request_id(self.request_id.clone())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }
        let ctx = Self::from_headers(&parts.headers);
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

/// Middleware that attaches a [`RequestContext`] and echoes its request id.
pub async fn request_context_middleware(mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::from_headers(req.headers());
    let request_id = ctx.request_id.clone();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_string(headers, "Authorization")?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_identity_and_token() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("alice"));
        headers.insert("x-app-id", HeaderValue::from_static("risk-ui"));
        headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc"));

        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.caller.user_id.as_deref(), Some("alice"));
        assert_eq!(ctx.caller.service_id, None);
        assert_eq!(ctx.caller.app_id.as_deref(), Some("risk-ui"));
        assert_eq!(ctx.token(), Some("s3cret"));
        assert_eq!(ctx.request_id, "abc");
    }

    #[test]
    fn missing_headers_give_anonymous_context() {
        let ctx = RequestContext::from_headers(&HeaderMap::new());
        assert_eq!(ctx.caller.principal(), "anonymous");
        assert_eq!(ctx.token(), None);
        assert_eq!(ctx.request_id.len(), 26);
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(RequestContext::from_headers(&headers).token(), None);
    }
}
