//! OIDC discovery configuration and authorization request construction.
//!
//! The portal backend publishes the minimal identity provider coordinates
//! (issuer and public client id) at a discovery endpoint. Everything needed
//! to send the browser to the provider's authorize endpoint is derived from
//! that document and the application's origin.

use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SessionError;
use crate::pkce::CHALLENGE_METHOD;

/// Path on the application origin that receives the provider redirect.
pub const CALLBACK_PATH: &str = "/callback";

/// Scopes requested on every login.
pub const SCOPES: &str = "openid profile email";

/// Issuer and client identification published by the portal backend.
///
/// Wire form: `{"issuer": "https://...", "clientId": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// The OIDC issuer URL (e.g., "https://example.okta.com/oauth2/default").
    #[serde(rename = "issuer", alias = "issuerUrl")]
    issuer_url: String,
    /// The public client ID registered with the provider.
    #[serde(rename = "clientId", alias = "client_id")]
    client_id: String,
}

impl DiscoveryConfig {
    /// Creates a discovery config.
    #[must_use]
    pub fn new(issuer_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
        }
    }

    /// Returns the OIDC issuer URL.
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// Returns the client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the provider's authorize endpoint, `{issuer}/v1/authorize`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the issuer is not an absolute URL.
    pub fn authorize_endpoint(&self) -> Result<Url, Report<SessionError>> {
        let endpoint = format!("{}/v1/authorize", self.issuer_url.trim_end_matches('/'));
        Url::parse(&endpoint).map_err(|e| {
            SessionError::InvalidConfiguration {
                reason: format!("invalid issuer URL '{}': {e}", self.issuer_url),
            }
            .into()
        })
    }
}

/// Builds the redirect URI `{origin}/callback`.
///
/// # Errors
///
/// Returns `InvalidConfiguration` if the origin cannot be a base URL.
pub fn redirect_uri(origin: &Url) -> Result<Url, Report<SessionError>> {
    origin.join(CALLBACK_PATH).map_err(|e| {
        SessionError::InvalidConfiguration {
            reason: format!("invalid origin '{origin}': {e}"),
        }
        .into()
    })
}

/// A ready-to-follow authorization URL and the anti-forgery state it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    url: Url,
    state: String,
}

impl AuthorizationRequest {
    /// Assembles the authorize URL for `discovery`.
    ///
    /// Adds the PKCE challenge and `code_challenge_method=S256` only when a
    /// challenge is supplied.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the issuer is not a valid URL.
    pub fn build(
        discovery: &DiscoveryConfig,
        redirect_uri: &Url,
        state: String,
        challenge: Option<&str>,
    ) -> Result<Self, Report<SessionError>> {
        let mut url = discovery.authorize_endpoint()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", discovery.client_id())
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("response_type", "code")
                .append_pair("scope", SCOPES)
                .append_pair("state", &state);
            if let Some(challenge) = challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", CHALLENGE_METHOD);
            }
        }

        Ok(Self { url, state })
    }

    /// Returns the authorization URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the anti-forgery state value.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Consumes the request, returning the URL.
    #[must_use]
    pub fn into_url(self) -> Url {
        self.url
    }
}
