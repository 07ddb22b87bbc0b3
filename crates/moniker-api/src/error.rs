//! HTTP error responses.
//!
//! Every failure is rendered as a JSON body with a stable `code`, so clients
//! can branch on it without parsing messages.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use moniker_service::ServiceError;
use serde::Serialize;

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// An error rendered as an HTTP response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    estimated_rows: Option<u64>,
    request_id: Option<String>,
}

/// JSON body of an error response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Estimated rows of a vetoed query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<u64>,
    /// Request correlation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            estimated_rows: None,
            request_id: None,
        }
    }

    /// 400 with code `BAD_REQUEST`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 404 with code `NOT_FOUND`.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// 500 with code `INTERNAL`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    /// Attaches the request correlation id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns the HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Parse { .. } | ServiceError::BadRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ServiceError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            ServiceError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let payload = err.payload();
        Self {
            status,
            code: err.code(),
            message: payload.message,
            estimated_rows: payload.estimated_rows,
            request_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        }
        let request_id = self.request_id.clone();
        let body = ApiErrorBody {
            code: self.code,
            message: self.message,
            estimated_rows: self.estimated_rows,
            request_id: self.request_id,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(value) = request_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::parse("bad"), StatusCode::BAD_REQUEST),
            (ServiceError::bad_request("bad"), StatusCode::BAD_REQUEST),
            (ServiceError::unauthorized("no"), StatusCode::UNAUTHORIZED),
            (
                ServiceError::access_denied("veto", Some(10)),
                StatusCode::FORBIDDEN,
            ),
            (ServiceError::not_found("gone"), StatusCode::NOT_FOUND),
            (ServiceError::conflict("dup"), StatusCode::CONFLICT),
            (
                ServiceError::unavailable("down"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::internal("oops"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let code = err.code();
            let api: ApiError = err.into();
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn access_denied_keeps_estimate() {
        let api: ApiError = ServiceError::access_denied("too broad", Some(250_000)).into();
        assert_eq!(api.estimated_rows, Some(250_000));
        assert_eq!(api.message(), "too broad");
    }

    #[test]
    fn response_carries_request_id_header() {
        let response = ApiError::not_found("missing")
            .with_request_id("req-1")
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-request-id"], "req-1");
    }

    #[test]
    fn body_uses_camel_case() {
        let body = ApiErrorBody {
            code: "ACCESS_DENIED",
            message: "veto".into(),
            estimated_rows: Some(5),
            request_id: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["estimatedRows"], 5);
        assert!(json.get("requestId").is_none());
    }
}
