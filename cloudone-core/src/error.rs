//! API error types and formatting
//!
//! Every emulated service reports failures as gRPC statuses. This module is
//! the single place where those statuses become HTTP responses.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tonic::{Code, Status};
use tracing::{debug, warn};

/// Error classes the HTTP surface distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    PermissionDenied,
    Unauthenticated,
    Unimplemented,
    NotFound,
    Internal,
}

impl ErrorCode {
    /// Canonical gRPC code name, as used in Google API error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP-facing error: a status plus a JSON body with at least `message`.
#[derive(Debug, Error)]
#[error("{}: {message}", code.as_str())]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    fields: Map<String, Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            fields: Map::new(),
        }
    }

    pub fn invalid_request(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::InvalidArgument, format!("Invalid request: {err}"))
            .with_status_field()
    }

    pub fn not_implemented() -> Self {
        Self::new(ErrorCode::Unimplemented, "Not implemented").with_status_field()
    }

    pub fn unexpected() -> Self {
        Self::new(ErrorCode::Internal, "Unexpected error occurred")
    }

    /// Attach an extra structured field to the JSON body.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    fn with_status_field(self) -> Self {
        let status = self.code.as_str();
        self.with_field("status", status)
    }

    /// Map a status returned by a service implementation.
    ///
    /// Only the explicitly classified codes keep their detail; everything
    /// else collapses to a generic 500 so internal errors never leak.
    pub fn from_status(status: &Status) -> Self {
        match status.code() {
            Code::PermissionDenied => {
                Self::new(ErrorCode::PermissionDenied, "Permission denied").with_status_field()
            }
            Code::Unauthenticated => {
                Self::new(ErrorCode::Unauthenticated, "Unauthenticated").with_status_field()
            }
            Code::Unimplemented => Self::not_implemented(),
            Code::InvalidArgument => Self::new(
                ErrorCode::InvalidArgument,
                format!("Invalid argument: {}", status.message()),
            )
            .with_status_field(),
            _ => Self::unexpected(),
        }
    }

    /// Format as a JSON error object
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            #[serde(flatten)]
            fields: &'a Map<String, Value>,
            message: &'a str,
        }

        let error = JsonError {
            fields: &self.fields,
            message: &self.message,
        };

        serde_json::to_string(&error)
            .unwrap_or_else(|_| format!(r#"{{"message":{:?}}}"#, self.message))
    }
}

impl From<Status> for ApiError {
    fn from(status: Status) -> Self {
        Self::from_status(&status)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        if status.is_server_error() && self.code != ErrorCode::Unimplemented {
            warn!(status = %status, message = %self.message, "Request failed");
        } else {
            debug!(status = %status, message = %self.message, "Request rejected");
        }

        let mut response = Response::new(Body::from(self.to_json()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Status::unimplemented("x"), StatusCode::NOT_IMPLEMENTED),
            (Status::permission_denied("x"), StatusCode::FORBIDDEN),
            (Status::unauthenticated("x"), StatusCode::UNAUTHORIZED),
            (Status::invalid_argument("x"), StatusCode::BAD_REQUEST),
            (Status::not_found("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (Status::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (status, expected) in cases {
            assert_eq!(ApiError::from_status(&status).code.http_status(), expected);
        }
    }

    #[test]
    fn test_invalid_argument_keeps_message() {
        let error = ApiError::from_status(&Status::invalid_argument("bad mask"));
        assert_eq!(error.message, "Invalid argument: bad mask");

        let json: Value = serde_json::from_str(&error.to_json()).unwrap();
        assert_eq!(json["message"], "Invalid argument: bad mask");
        assert_eq!(json["status"], "INVALID_ARGUMENT");
    }

    #[test]
    fn test_unclassified_error_is_generic() {
        let error = ApiError::from_status(&Status::internal("/lib/data/secret.json: EACCES"));
        let json = error.to_json();
        assert!(!json.contains("EACCES"));
        assert!(json.contains("Unexpected error occurred"));
    }

    #[test]
    fn test_into_response() {
        let response = ApiError::from_status(&Status::invalid_argument("bad")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_error_json_extra_fields() {
        let error = ApiError::new(ErrorCode::NotFound, "No such host").with_field("host", "x.local");
        let json: Value = serde_json::from_str(&error.to_json()).unwrap();
        assert_eq!(json["message"], "No such host");
        assert_eq!(json["host"], "x.local");
    }
}
