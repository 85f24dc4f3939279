//! HTTP error responses
//!
//! Every handler failure becomes an [`HttpError`]: a status, a terse message
//! for the caller and an optional source that is logged but never echoed.

use std::error::Error as StdError;
use std::fmt;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error};

use crate::store::StoreError;

type Source = Box<dyn StdError + Send + Sync>;

/// Handler failure rendered as a JSON error response
pub struct HttpError {
    status: StatusCode,
    message: String,
    source: Option<Source>,
}

impl HttpError {
    /// Error with the given status and caller-facing message
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause, logged with the response
    #[must_use]
    pub fn with_source(mut self, source: impl Into<Source>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 500 with a cause
    pub fn internal(source: impl Into<Source>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message).with_source(source)
    }

    /// 401 for a rejected bearer token
    pub fn unauthorized(source: warden_auth::Error, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message).with_source(source)
    }

    /// 403 with a cause
    pub fn forbidden(source: impl Into<Source>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message).with_source(source)
    }

    /// Map a store failure: missing records are 404, anything else 500
    pub fn store(source: StoreError, message: impl Into<String>) -> Self {
        let status = match source {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, message).with_source(source)
    }

    /// Response body could not be produced
    pub fn encode(source: impl Into<Source>) -> Self {
        Self::internal(source, "failed to encode response")
    }

    /// Status code of the response
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Caller-facing message
    pub fn message(&self) -> &str {
        &self.message
    }

    fn chain(&self) -> String {
        let mut out = String::new();
        let mut next = self.source.as_deref().map(|e| e as &(dyn StdError + 'static));
        while let Some(err) = next {
            if !out.is_empty() {
                out.push_str(": ");
            }
            out.push_str(&err.to_string());
            next = err.source();
        }
        out
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("source", &self.chain())
            .finish()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "failed to load request body").with_source(rejection)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let cause = self.chain();
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = %cause, "{}", self.message);
        } else {
            debug!(status = self.status.as_u16(), error = %cause, "{}", self.message);
        }

        let body = json!({
            "error": self.status.canonical_reason().unwrap_or("error"),
            "message": self.message,
        });
        let mut response = (self.status, Json(body)).into_response();

        if self.status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(warden_auth::bearer::BEARER_SCHEME),
            );
        }

        response
    }
}
