//! Deployment settings served next to the application.

use std::time::Duration;

use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use url::Url;

use crate::error::BackendError;

/// Settings a deployment publishes as `runtime-config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Base URL of the portal API.
    pub api_base_url: Url,
    /// When false, routes are not gated and login does nothing.
    #[serde(default = "default_auth_enabled")]
    pub auth_enabled: bool,
}

fn default_auth_enabled() -> bool {
    true
}

impl RuntimeConfig {
    /// Fetches the runtime config document.
    ///
    /// # Errors
    ///
    /// Returns `Network`, `Status` or `Malformed`.
    #[instrument]
    pub async fn fetch(url: &Url, timeout: Duration) -> Result<Self, Report<BackendError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Network {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| BackendError::Network {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }
            .into());
        }

        let config: Self = response.json().await.map_err(|e| BackendError::Malformed {
            details: e.to_string(),
        })?;
        info!(
            api_base_url = %config.api_base_url,
            auth_enabled = config.auth_enabled,
            "loaded runtime config"
        );
        Ok(config)
    }
}
