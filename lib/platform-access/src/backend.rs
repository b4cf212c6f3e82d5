//! The portal backend's authentication endpoints.
//!
//! [`AuthBackend`] is the seam between the session manager and the network.
//! [`HttpAuthBackend`] is the production implementation over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use rootcause::prelude::Report;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::error::BackendError;
use crate::oidc::DiscoveryConfig;
use crate::user::UserProfile;

/// Request body of the token-exchange endpoint.
#[derive(Clone, Serialize)]
pub struct CodeExchange {
    /// The authorization code from the callback.
    pub code: String,
    /// The PKCE verifier generated for the same login attempt.
    pub code_verifier: String,
    /// The redirect URI sent with the authorization request.
    pub redirect_uri: String,
}

impl std::fmt::Debug for CodeExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeExchange")
            .field("code", &"[redacted]")
            .field("code_verifier", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Raw response of the token-exchange endpoint.
///
/// Both fields are optional on the wire; the session manager decides what
/// a usable response is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// The identity token.
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Calls the session layer makes against the portal backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Fetches the identity provider coordinates.
    async fn fetch_discovery_config(&self) -> Result<DiscoveryConfig, Report<BackendError>>;

    /// Exchanges an authorization code and verifier for tokens.
    async fn exchange_code(
        &self,
        exchange: &CodeExchange,
    ) -> Result<TokenResponse, Report<BackendError>>;

    /// Asks the backend whether `access_token` is still accepted.
    async fn validate_token(&self, access_token: &str) -> Result<(), Report<BackendError>>;

    /// Fetches the profile of the user `access_token` belongs to.
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, Report<BackendError>>;
}

/// Paths of the authentication endpoints, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    /// Discovery config endpoint.
    #[serde(default = "default_discovery_path")]
    pub discovery: String,
    /// Token-exchange endpoint.
    #[serde(default = "default_token_path")]
    pub token: String,
    /// Token validation endpoint.
    #[serde(default = "default_validate_path")]
    pub validate: String,
    /// User profile endpoint.
    #[serde(default = "default_profile_path")]
    pub profile: String,
}

fn default_discovery_path() -> String {
    "/api/okta-config".to_string()
}

fn default_token_path() -> String {
    "/api/auth/token".to_string()
}

fn default_validate_path() -> String {
    "/api/auth/validate".to_string()
}

fn default_profile_path() -> String {
    "/api/user".to_string()
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            discovery: default_discovery_path(),
            token: default_token_path(),
            validate: default_validate_path(),
            profile: default_profile_path(),
        }
    }
}

/// [`AuthBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    client: reqwest::Client,
    base_url: Url,
    endpoints: AuthEndpoints,
}

impl HttpAuthBackend {
    /// Creates a backend client for the API at `base_url`.
    ///
    /// `timeout` bounds every request; without it a stalled backend would
    /// stall the caller indefinitely.
    ///
    /// # Errors
    ///
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        endpoints: AuthEndpoints,
        timeout: Duration,
    ) -> Result<Self, Report<BackendError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Network {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
            endpoints,
        })
    }

    /// Resolves an endpoint path below the base URL, keeping any base path.
    fn endpoint(&self, path: &str) -> Result<Url, Report<BackendError>> {
        self.base_url.join(path.trim_start_matches('/')).map_err(|e| {
            BackendError::InvalidUrl {
                details: format!("{path}: {e}"),
            }
            .into()
        })
    }

    async fn send(request: RequestBuilder) -> Result<Response, Report<BackendError>> {
        let response = request.send().await.map_err(|e| BackendError::Network {
            details: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        }
        .into())
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, Report<BackendError>> {
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                BackendError::Malformed {
                    details: e.to_string(),
                }
                .into()
            } else {
                BackendError::Network {
                    details: e.to_string(),
                }
                .into()
            }
        })
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    #[instrument(skip(self))]
    async fn fetch_discovery_config(&self) -> Result<DiscoveryConfig, Report<BackendError>> {
        let url = self.endpoint(&self.endpoints.discovery)?;
        debug!(%url, "fetching discovery config");
        let response = Self::send(self.client.get(url)).await?;
        Self::json(response).await
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        exchange: &CodeExchange,
    ) -> Result<TokenResponse, Report<BackendError>> {
        let url = self.endpoint(&self.endpoints.token)?;
        let response = Self::send(self.client.post(url).json(exchange)).await?;
        Self::json(response).await
    }

    #[instrument(skip_all)]
    async fn validate_token(&self, access_token: &str) -> Result<(), Report<BackendError>> {
        let url = self.endpoint(&self.endpoints.validate)?;
        Self::send(self.client.get(url).bearer_auth(access_token)).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, Report<BackendError>> {
        let url = self.endpoint(&self.endpoints.profile)?;
        let response = Self::send(self.client.get(url).bearer_auth(access_token)).await?;
        Self::json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend(server: &MockServer) -> HttpAuthBackend {
        HttpAuthBackend::new(
            Url::parse(&server.uri()).expect("uri"),
            AuthEndpoints::default(),
            Duration::from_secs(5),
        )
        .expect("backend")
    }

    #[tokio::test]
    async fn fetches_discovery_config() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/okta-config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": "https://idp.example.com/oauth2/default",
                "clientId": "spa"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = backend(&server)
            .await
            .fetch_discovery_config()
            .await
            .expect("config");
        assert_eq!(config.client_id(), "spa");
    }

    #[tokio::test]
    async fn exchange_posts_code_and_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token"))
            .and(body_json(serde_json::json!({
                "code": "c0de",
                "code_verifier": "v3rifier",
                "redirect_uri": "http://127.0.0.1:8765/callback"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "id_token": "it"
            })))
            .mount(&server)
            .await;

        let response = backend(&server)
            .await
            .exchange_code(&CodeExchange {
                code: "c0de".to_string(),
                code_verifier: "v3rifier".to_string(),
                redirect_uri: "http://127.0.0.1:8765/callback".to_string(),
            })
            .await
            .expect("tokens");
        assert_eq!(response.access_token.as_deref(), Some("at"));
        assert_eq!(response.id_token.as_deref(), Some("it"));
    }

    #[tokio::test]
    async fn rejected_exchange_reports_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"message":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let err = backend(&server)
            .await
            .exchange_code(&CodeExchange {
                code: "c".to_string(),
                code_verifier: "v".to_string(),
                redirect_uri: "r".to_string(),
            })
            .await
            .expect_err("must fail");
        assert_eq!(
            err.current_context().backend_message().as_deref(),
            Some("invalid_grant")
        );
    }

    #[tokio::test]
    async fn malformed_body_is_reported_as_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/okta-config"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .await
            .fetch_discovery_config()
            .await
            .expect_err("must fail");
        assert!(matches!(
            err.current_context(),
            BackendError::Malformed { .. }
        ));
    }

    #[tokio::test]
    async fn validate_and_profile_send_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/validate"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "role": "USER", "employeeNumber": 7 })),
            )
            .mount(&server)
            .await;

        let backend = backend(&server).await;
        backend.validate_token("tok").await.expect("valid");
        let profile = backend.fetch_profile("tok").await.expect("profile");
        assert!(profile.roles().contains("USER"));
        assert_eq!(profile.employee_number(), Some("7"));
    }

    #[tokio::test]
    async fn endpoints_resolve_below_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portal/api/auth/validate"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpAuthBackend::new(
            Url::parse(&format!("{}/portal", server.uri())).expect("uri"),
            AuthEndpoints::default(),
            Duration::from_secs(5),
        )
        .expect("backend");
        backend.validate_token("tok").await.expect("valid");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let backend = HttpAuthBackend::new(
            Url::parse("http://127.0.0.1:9").expect("url"),
            AuthEndpoints::default(),
            Duration::from_secs(2),
        )
        .expect("backend");

        let err = backend.validate_token("tok").await.expect_err("must fail");
        assert!(matches!(err.current_context(), BackendError::Network { .. }));
    }
}
