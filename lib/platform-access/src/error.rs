//! Error types for the platform-access crate.
//!
//! Errors are reported through rootcause:
//! - `SessionError`: login flow and token lifecycle failures, the kinds the
//!   session manager surfaces to its callers
//! - `BackendError`: transport-level failures talking to the portal's auth
//!   endpoints, converted into `SessionError` at the session manager boundary

use std::fmt;

/// User-facing text for connectivity failures.
pub const CONNECTIVITY_MESSAGE: &str =
    "Unable to reach the server. Check your network connection and try again.";

/// Errors from the login flow and token lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The discovery config endpoint could not be reached or returned garbage.
    /// A later call retries the fetch.
    ConfigFetchFailed { reason: String },
    /// No PKCE verifier in either storage scope at exchange time.
    MissingVerifier,
    /// The backend rejected the code/verifier pair or answered without an
    /// access token.
    ExchangeFailed { message: String },
    /// A stored token could not be decoded or has expired.
    TokenInvalid { reason: String },
    /// A request failed before any response arrived.
    NetworkUnavailable { details: String },
    /// The callback `state` does not match the one sent with the login.
    StateMismatch,
    /// The authorization code was already exchanged in this session.
    CodeAlreadyUsed,
    /// A verifier length outside 43..=128 was requested.
    InvalidVerifierLength { length: usize },
    /// The operating system random source failed.
    RandomSourceFailed { details: String },
    /// Malformed issuer, origin or endpoint URLs.
    InvalidConfiguration { reason: String },
}

impl SessionError {
    /// Message shown on the blocking error screen.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NetworkUnavailable { .. } => CONNECTIVITY_MESSAGE.to_string(),
            Self::ExchangeFailed { message } => message.clone(),
            Self::MissingVerifier => {
                "The login could not be completed because its verification data was lost. \
                 Start the login again from this window."
                    .to_string()
            }
            Self::StateMismatch => {
                "The login response did not match the request that was sent. Please log in again."
                    .to_string()
            }
            Self::CodeAlreadyUsed => "This login link has already been used.".to_string(),
            Self::ConfigFetchFailed { .. } => {
                "The sign-in service configuration could not be loaded.".to_string()
            }
            Self::TokenInvalid { .. } => "Your session has expired.".to_string(),
            Self::InvalidVerifierLength { .. }
            | Self::RandomSourceFailed { .. }
            | Self::InvalidConfiguration { .. } => self.to_string(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigFetchFailed { reason } => {
                write!(f, "failed to fetch discovery config: {reason}")
            }
            Self::MissingVerifier => {
                write!(f, "no PKCE code verifier found in any storage scope")
            }
            Self::ExchangeFailed { message } => {
                write!(f, "authorization code exchange failed: {message}")
            }
            Self::TokenInvalid { reason } => write!(f, "token invalid: {reason}"),
            Self::NetworkUnavailable { details } => write!(f, "network unavailable: {details}"),
            Self::StateMismatch => write!(f, "callback state does not match the login request"),
            Self::CodeAlreadyUsed => write!(f, "authorization code was already exchanged"),
            Self::InvalidVerifierLength { length } => {
                write!(f, "PKCE verifier length {length} is outside 43..=128")
            }
            Self::RandomSourceFailed { details } => {
                write!(f, "secure random source failed: {details}")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid session configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from the HTTP calls made against the portal backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request never produced a response (DNS, connect, timeout).
    Network { details: String },
    /// The backend answered with a non-success status.
    Status { status: u16, body: String },
    /// The response body could not be decoded.
    Malformed { details: String },
    /// An endpoint URL could not be built.
    InvalidUrl { details: String },
}

impl BackendError {
    /// Returns the backend-provided message when the body carries one.
    ///
    /// Understands `{"message": ..}`, `{"error_description": ..}` and
    /// `{"error": ..}` JSON bodies and falls back to the raw body text.
    #[must_use]
    pub fn backend_message(&self) -> Option<String> {
        let Self::Status { status, body } = self else {
            return None;
        };

        let from_json = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                ["message", "error_description", "error"]
                    .iter()
                    .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_string))
            });

        match from_json {
            Some(message) => Some(message),
            None if body.trim().is_empty() => Some(format!("backend returned status {status}")),
            None => Some(body.trim().to_string()),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { details } => write!(f, "request failed: {details}"),
            Self::Status { status, body } => {
                write!(f, "backend returned status {status}: {body}")
            }
            Self::Malformed { details } => write!(f, "malformed backend response: {details}"),
            Self::InvalidUrl { details } => write!(f, "invalid backend URL: {details}"),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_verifier_display() {
        let err = SessionError::MissingVerifier;
        assert!(err.to_string().contains("verifier"));
    }

    #[test]
    fn network_failures_get_connectivity_message() {
        let err = SessionError::NetworkUnavailable {
            details: "connection refused".to_string(),
        };
        assert_eq!(err.user_message(), CONNECTIVITY_MESSAGE);
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn exchange_failure_shows_raw_backend_message() {
        let err = SessionError::ExchangeFailed {
            message: "invalid_grant".to_string(),
        };
        assert_eq!(err.user_message(), "invalid_grant");
    }

    #[test]
    fn backend_message_prefers_json_fields() {
        let err = BackendError::Status {
            status: 400,
            body: r#"{"error":"invalid_grant","error_description":"PKCE verification failed"}"#
                .to_string(),
        };
        assert_eq!(
            err.backend_message().as_deref(),
            Some("PKCE verification failed")
        );
    }

    #[test]
    fn backend_message_falls_back_to_body_or_status() {
        let text = BackendError::Status {
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert_eq!(text.backend_message().as_deref(), Some("Bad Gateway"));

        let empty = BackendError::Status {
            status: 500,
            body: String::new(),
        };
        assert_eq!(
            empty.backend_message().as_deref(),
            Some("backend returned status 500")
        );

        let network = BackendError::Network {
            details: "dns".to_string(),
        };
        assert_eq!(network.backend_message(), None);
    }
}
