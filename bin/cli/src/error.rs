//! Domain error types for CLI operations.

use std::fmt;

/// Errors surfaced by `budgetdesk` commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Configuration is missing or invalid.
    Configuration { reason: String },
    /// The runtime config document could not be loaded.
    RuntimeConfig { reason: String },
    /// The login did not complete.
    Login { message: String },
    /// No callback arrived in time.
    CallbackTimeout { seconds: u64 },
    /// The callback listener could not be started or failed while serving.
    Listener { details: String },
    /// A portal API call failed.
    Api { message: String },
    /// The session is missing or no longer accepted.
    NotSignedIn,
    /// The signed-in user lacks a role the command requires.
    Forbidden { required: String, actual: String },
    /// A local file could not be read.
    Io { path: String, details: String },
    /// Output could not be rendered.
    Output { details: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => write!(f, "invalid configuration: {reason}"),
            Self::RuntimeConfig { reason } => {
                write!(f, "failed to load runtime config: {reason}")
            }
            Self::Login { message } => write!(f, "login failed: {message}"),
            Self::CallbackTimeout { seconds } => {
                write!(f, "no login callback received within {seconds}s")
            }
            Self::Listener { details } => write!(f, "callback listener error: {details}"),
            Self::Api { message } => write!(f, "{message}"),
            Self::NotSignedIn => write!(f, "not signed in, run `budgetdesk login`"),
            Self::Forbidden { required, actual } if actual.is_empty() => {
                write!(f, "role {required} required, you have no roles")
            }
            Self::Forbidden { required, actual } => {
                write!(f, "role {required} required, you have {actual}")
            }
            Self::Io { path, details } => write!(f, "{path}: {details}"),
            Self::Output { details } => write!(f, "failed to render output: {details}"),
        }
    }
}

impl std::error::Error for CliError {}
