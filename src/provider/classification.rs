//! Error classification logic

use serde::{Deserialize, Serialize};

/// Standard provider error classes.
///
/// - Transient classes (server trouble, throttling, timeouts, dropped
///   connections) are worth retrying
/// - Client-side classes (bad request, credentials) fail the same way on
///   every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    InvalidRequest,
    Authentication,
    PermissionDenied,
    NotFound,
    RequestTooLarge,
    RateLimited,
    Timeout,
    Connection,
    ServerError,
    Overloaded,
    /// The provider answered but the payload was unusable (no text, bad JSON).
    MalformedResponse,
    Other,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::InvalidRequest => "invalid_request",
            ErrorClass::Authentication => "authentication",
            ErrorClass::PermissionDenied => "permission_denied",
            ErrorClass::NotFound => "not_found",
            ErrorClass::RequestTooLarge => "request_too_large",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Connection => "connection",
            ErrorClass::ServerError => "server_error",
            ErrorClass::Overloaded => "overloaded",
            ErrorClass::MalformedResponse => "malformed_response",
            ErrorClass::Other => "other",
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ErrorClass::RateLimited
            | ErrorClass::Timeout
            | ErrorClass::Connection
            | ErrorClass::ServerError
            | ErrorClass::Overloaded => true,
            ErrorClass::InvalidRequest
            | ErrorClass::Authentication
            | ErrorClass::PermissionDenied
            | ErrorClass::NotFound
            | ErrorClass::RequestTooLarge
            | ErrorClass::MalformedResponse
            | ErrorClass::Other => false,
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an HTTP status to an error class.
pub fn class_from_status(status: u16) -> ErrorClass {
    match status {
        400 | 422 => ErrorClass::InvalidRequest,
        401 => ErrorClass::Authentication,
        403 => ErrorClass::PermissionDenied,
        404 => ErrorClass::NotFound,
        408 => ErrorClass::Timeout,
        413 => ErrorClass::RequestTooLarge,
        429 => ErrorClass::RateLimited,
        503 | 529 => ErrorClass::Overloaded,
        504 => ErrorClass::Timeout,
        500..=599 => ErrorClass::ServerError,
        _ => ErrorClass::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        for status in [408, 429, 500, 502, 503, 504, 529] {
            assert!(
                class_from_status(status).is_transient(),
                "status {} should be transient",
                status
            );
        }
    }

    #[test]
    fn permanent_statuses() {
        for status in [400, 401, 403, 404, 413, 422, 418] {
            assert!(
                !class_from_status(status).is_transient(),
                "status {} should be permanent",
                status
            );
        }
    }

    #[test]
    fn class_names_are_snake_case() {
        assert_eq!(ErrorClass::RateLimited.to_string(), "rate_limited");
        assert_eq!(
            serde_json::to_string(&ErrorClass::MalformedResponse).unwrap(),
            "\"malformed_response\""
        );
    }
}
