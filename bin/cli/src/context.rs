//! The application context shared by every command.

use std::sync::Arc;

use budgetdesk_platform_access::role::ADMIN_ROLE;
use budgetdesk_platform_access::{
    FileStorage, GateDecision, HttpAuthBackend, MemoryStorage, Navigator, RuntimeConfig,
    SessionGate, SessionManager, TokenStore,
};
use budgetdesk_portal_api::{ApiError, PortalClient};
use rootcause::prelude::Report;
use tracing::{debug, info};
use url::Url;

use crate::config::ClientConfig;
use crate::error::CliError;

/// Prints the authorization URL for the user to open.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, url: &Url) {
        eprintln!("Open this URL in your browser to sign in:\n\n    {url}\n");
    }
}

/// Everything a command needs, built once per invocation.
pub struct AppContext {
    pub config: ClientConfig,
    pub auth_enabled: bool,
    pub manager: Arc<SessionManager>,
    pub gate: SessionGate,
    pub client: PortalClient,
}

impl AppContext {
    /// Resolves the runtime config and wires the session layer and API client.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeConfig` if a configured runtime document cannot be
    /// loaded, or `Configuration` for invalid URLs.
    pub async fn build(config: ClientConfig) -> Result<Self, Report<CliError>> {
        let (api_base_url, auth_enabled) = match &config.runtime_config_url {
            Some(url) => {
                let runtime = RuntimeConfig::fetch(url, config.request_timeout())
                    .await
                    .map_err(|report| CliError::RuntimeConfig {
                        reason: report.current_context().to_string(),
                    })?;
                (runtime.api_base_url, runtime.auth_enabled)
            }
            None => (config.api_base_url.clone(), true),
        };
        debug!(%api_base_url, auth_enabled, "resolved portal settings");

        let session_file = config.session_file();
        let store = TokenStore::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(FileStorage::new(session_file)),
        );

        let backend = HttpAuthBackend::new(
            api_base_url.clone(),
            config.endpoints.clone(),
            config.request_timeout(),
        )
        .map_err(|report| CliError::Configuration {
            reason: report.current_context().to_string(),
        })?;

        let origin = config
            .callback
            .origin()
            .map_err(|e| CliError::Configuration {
                reason: format!("callback address: {e}"),
            })?;

        let manager = SessionManager::new(
            Arc::new(backend),
            store.clone(),
            Arc::new(TerminalNavigator),
            origin,
        )
        .map_err(|report| CliError::Configuration {
            reason: report.current_context().to_string(),
        })?;
        let manager = Arc::new(manager);

        let gate = SessionGate::new(Arc::clone(&manager))
            .with_auth_enabled(auth_enabled)
            .with_landing_path(config.landing_path.clone());

        let client = PortalClient::new(api_base_url, store, config.request_timeout()).map_err(
            |report| CliError::Configuration {
                reason: report.current_context().to_string(),
            },
        )?;

        Ok(Self {
            config,
            auth_enabled,
            manager,
            gate,
            client,
        })
    }

    /// Requires a session the backend accepts.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn` unless the gate allows access.
    pub async fn require_session(&self) -> Result<(), Report<CliError>> {
        self.require(None).await
    }

    /// Requires the administrator role.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn` or `Forbidden`.
    pub async fn require_admin(&self) -> Result<(), Report<CliError>> {
        self.require(Some(ADMIN_ROLE)).await
    }

    async fn require(&self, role: Option<&str>) -> Result<(), Report<CliError>> {
        decision_to_result(self.gate.evaluate(role).await)
    }
}

/// Maps a gate decision to the outcome of a command that needs access.
pub fn decision_to_result(decision: GateDecision) -> Result<(), Report<CliError>> {
    match decision {
        GateDecision::Allow => Ok(()),
        GateDecision::Forbidden { required, actual } => {
            info!(%required, %actual, "access denied");
            Err(CliError::Forbidden { required, actual }.into())
        }
        GateDecision::RedirectToLogin
        | GateDecision::Loading
        | GateDecision::RedirectToLanding => Err(CliError::NotSignedIn.into()),
    }
}

/// Converts a portal API failure into a command error.
pub fn api_error(report: Report<ApiError>) -> Report<CliError> {
    match report.current_context() {
        ApiError::NotAuthenticated => CliError::NotSignedIn.into(),
        other => CliError::Api {
            message: other.to_string(),
        }
        .into(),
    }
}
