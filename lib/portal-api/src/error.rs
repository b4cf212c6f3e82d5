//! Error types for the portal API client.

use std::fmt;

/// Errors from portal API calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No access token is stored, or the backend answered 401.
    NotAuthenticated,
    /// The request failed before a response arrived.
    Network { details: String },
    /// The backend answered with a non-success status.
    Status { status: u16, body: String },
    /// The response body did not have the expected shape.
    Malformed { details: String },
    /// The request could not be built.
    InvalidRequest { details: String },
}

impl ApiError {
    /// Returns true if signing in again may fix the failure.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "not signed in"),
            Self::Network { details } => write!(f, "network error: {details}"),
            Self::Status { status, body } if body.trim().is_empty() => {
                write!(f, "portal returned status {status}")
            }
            Self::Status { status, body } => {
                write!(f, "portal returned status {status}: {}", body.trim())
            }
            Self::Malformed { details } => write!(f, "malformed response: {details}"),
            Self::InvalidRequest { details } => write!(f, "invalid request: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_includes_trimmed_body() {
        let err = ApiError::Status {
            status: 409,
            body: " duplicate request\n".to_string(),
        };
        assert_eq!(err.to_string(), "portal returned status 409: duplicate request");

        let empty = ApiError::Status {
            status: 500,
            body: String::new(),
        };
        assert_eq!(empty.to_string(), "portal returned status 500");
    }

    #[test]
    fn only_not_authenticated_requires_login() {
        assert!(ApiError::NotAuthenticated.requires_login());
        assert!(
            !ApiError::Network {
                details: "dns".to_string()
            }
            .requires_login()
        );
    }
}
