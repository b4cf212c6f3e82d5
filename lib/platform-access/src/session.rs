//! The OIDC session manager.
//!
//! [`SessionManager`] is the session context object of the application:
//! it is built once at startup, shared behind an `Arc`, and owns
//! - the discovery config cache and its single in-flight fetch
//! - construction of authorization requests and the PKCE verifier lifecycle
//! - delegation of the code exchange to the backend
//! - the local expiry check and the authoritative server-side validation

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use oauth2::CsrfToken;
use rootcause::prelude::Report;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::backend::{AuthBackend, CodeExchange, TokenResponse};
use crate::error::{BackendError, SessionError};
use crate::jwt::{self, IdentityClaims};
use crate::navigator::Navigator;
use crate::oidc::{self, AuthorizationRequest, DiscoveryConfig};
use crate::pkce::{DEFAULT_VERIFIER_LENGTH, PkcePair};
use crate::token_store::{TokenPair, TokenStore, VerifierSource};
use crate::user::UserProfile;

type PendingDiscovery = Shared<BoxFuture<'static, Result<DiscoveryConfig, SessionError>>>;

enum DiscoverySlot {
    Empty,
    Pending(PendingDiscovery),
    Ready(DiscoveryConfig),
}

/// A failed exchange together with where its verifier came from.
pub(crate) struct ExchangeFailure {
    pub(crate) report: Report<SessionError>,
    pub(crate) verifier_source: Option<VerifierSource>,
}

impl ExchangeFailure {
    fn new(error: SessionError, verifier_source: Option<VerifierSource>) -> Self {
        Self {
            report: error.into(),
            verifier_source,
        }
    }
}

/// Session context shared by the login flow, the gate and API clients.
pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    store: TokenStore,
    navigator: Arc<dyn Navigator>,
    origin: Url,
    redirect_uri: Url,
    discovery: Mutex<DiscoverySlot>,
    claimed_codes: Mutex<HashSet<String>>,
}

impl SessionManager {
    /// Creates the session context for an application served at `origin`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `{origin}/callback` is not a valid URL.
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        store: TokenStore,
        navigator: Arc<dyn Navigator>,
        origin: Url,
    ) -> Result<Self, Report<SessionError>> {
        let redirect_uri = oidc::redirect_uri(&origin)?;
        Ok(Self {
            backend,
            store,
            navigator,
            origin,
            redirect_uri,
            discovery: Mutex::new(DiscoverySlot::Empty),
            claimed_codes: Mutex::new(HashSet::new()),
        })
    }

    /// Returns the token store.
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Returns the application origin.
    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Returns the redirect URI registered for the callback.
    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Returns the discovery config, fetching it on first use.
    ///
    /// Concurrent callers share one in-flight fetch and observe the same
    /// outcome. A failed fetch is not cached: the next call fetches again.
    ///
    /// # Errors
    ///
    /// Returns `ConfigFetchFailed` when the fetch fails.
    #[instrument(skip(self))]
    pub async fn discovery_config(&self) -> Result<DiscoveryConfig, Report<SessionError>> {
        let pending = {
            let mut slot = lock(&self.discovery);
            match &*slot {
                DiscoverySlot::Ready(config) => return Ok(config.clone()),
                DiscoverySlot::Pending(pending) => pending.clone(),
                DiscoverySlot::Empty => {
                    let backend = Arc::clone(&self.backend);
                    let pending = async move {
                        backend.fetch_discovery_config().await.map_err(|report| {
                            SessionError::ConfigFetchFailed {
                                reason: report.current_context().to_string(),
                            }
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = DiscoverySlot::Pending(pending.clone());
                    debug!("discovery config fetch started");
                    pending
                }
            }
        };

        let outcome = pending.clone().await;

        let mut slot = lock(&self.discovery);
        if matches!(&*slot, DiscoverySlot::Pending(current) if current.ptr_eq(&pending)) {
            *slot = match &outcome {
                Ok(config) => DiscoverySlot::Ready(config.clone()),
                Err(error) => {
                    warn!(%error, "discovery config fetch failed, will retry on next call");
                    DiscoverySlot::Empty
                }
            };
        }

        Ok(outcome?)
    }

    /// Builds the authorization request with a fresh anti-forgery state.
    ///
    /// Pass the PKCE challenge to bind the request to a verifier; `None`
    /// omits the PKCE parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigFetchFailed` or `InvalidConfiguration`.
    pub async fn build_authorization_url(
        &self,
        challenge: Option<&str>,
    ) -> Result<AuthorizationRequest, Report<SessionError>> {
        let discovery = self.discovery_config().await?;
        let state = CsrfToken::new_random().secret().clone();
        AuthorizationRequest::build(&discovery, &self.redirect_uri, state, challenge)
    }

    /// Starts a login: persists a fresh verifier and state, then navigates
    /// to the provider. Returns the authorization URL.
    ///
    /// A second call before the first completes replaces the verifier, and
    /// the first attempt's callback can no longer succeed.
    ///
    /// # Errors
    ///
    /// Returns `RandomSourceFailed`, `ConfigFetchFailed` or
    /// `InvalidConfiguration`.
    #[instrument(skip(self))]
    pub async fn start_login(&self) -> Result<Url, Report<SessionError>> {
        let pkce = PkcePair::generate(DEFAULT_VERIFIER_LENGTH)?;
        self.store.save_verifier(pkce.verifier());

        let request = self.build_authorization_url(Some(pkce.challenge())).await?;
        self.store.save_state(request.state());

        info!(
            provider = request.url().host_str().unwrap_or_default(),
            "redirecting to identity provider"
        );
        self.navigator.navigate(request.url());
        Ok(request.into_url())
    }

    /// Checks the callback's `state` against the one saved by `start_login`.
    ///
    /// The saved state is consumed whether or not it matches.
    ///
    /// # Errors
    ///
    /// Returns `StateMismatch` if either value is missing or they differ.
    pub fn verify_state(&self, returned: Option<&str>) -> Result<(), Report<SessionError>> {
        match (self.store.take_state(), returned) {
            (Some(expected), Some(returned)) if expected == returned => Ok(()),
            _ => Err(SessionError::StateMismatch.into()),
        }
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// The verifier is read from the primary scope, falling back to the
    /// durable scope. On success the verifier is removed from both scopes.
    /// Tokens are returned, not stored.
    ///
    /// # Errors
    ///
    /// Returns `CodeAlreadyUsed`, `MissingVerifier`, `ExchangeFailed` or
    /// `NetworkUnavailable`.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair, Report<SessionError>> {
        self.exchange_code_traced(code)
            .await
            .map_err(|failure| failure.report)
    }

    #[instrument(skip_all)]
    pub(crate) async fn exchange_code_traced(
        &self,
        code: &str,
    ) -> Result<TokenPair, ExchangeFailure> {
        if !lock(&self.claimed_codes).insert(code.to_string()) {
            warn!("authorization code presented twice");
            return Err(ExchangeFailure::new(SessionError::CodeAlreadyUsed, None));
        }

        let Some((verifier, source)) = self.store.load_verifier_with_source() else {
            warn!("no PKCE verifier available for code exchange");
            self.release_code(code);
            return Err(ExchangeFailure::new(SessionError::MissingVerifier, None));
        };

        let exchange = CodeExchange {
            code: code.to_string(),
            code_verifier: verifier,
            redirect_uri: self.redirect_uri.to_string(),
        };

        let result = match self.backend.exchange_code(&exchange).await {
            Ok(response) => token_pair_from(response),
            Err(report) => Err(exchange_error(report.current_context())),
        };

        match result {
            Ok(pair) => {
                self.store.clear_verifier();
                info!(verifier_source = ?source, "authorization code exchanged");
                Ok(pair)
            }
            Err(error) => {
                warn!(%error, verifier_source = ?source, "authorization code exchange failed");
                self.release_code(code);
                Err(ExchangeFailure::new(error, Some(source)))
            }
        }
    }

    fn release_code(&self, code: &str) {
        lock(&self.claimed_codes).remove(code);
    }

    /// Returns true when a stored access token has an `exp` in the future.
    ///
    /// Never fails: undecodable or missing tokens count as invalid.
    #[must_use]
    pub fn is_locally_valid(&self) -> bool {
        self.is_locally_valid_at(Utc::now())
    }

    /// [`Self::is_locally_valid`] against an explicit clock.
    #[must_use]
    pub fn is_locally_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.store
            .access_token()
            .is_some_and(|token| jwt::is_unexpired_at(&token, now))
    }

    /// Asks the backend whether the stored access token is accepted.
    ///
    /// # Errors
    ///
    /// Returns `TokenInvalid` when no token is stored or the backend rejects
    /// it, `NetworkUnavailable` when the backend cannot be reached.
    #[instrument(skip(self))]
    pub async fn validate_session(&self) -> Result<(), Report<SessionError>> {
        let token = self.stored_access_token()?;
        self.backend
            .validate_token(&token)
            .await
            .map_err(|report| rejection_error(report.current_context()).into())
    }

    /// Fetches the current user's profile with the stored access token.
    ///
    /// # Errors
    ///
    /// Same as [`Self::validate_session`].
    #[instrument(skip(self))]
    pub async fn user_profile(&self) -> Result<UserProfile, Report<SessionError>> {
        let token = self.stored_access_token()?;
        self.backend
            .fetch_profile(&token)
            .await
            .map_err(|report| rejection_error(report.current_context()).into())
    }

    /// Returns the claims carried by the stored identity token.
    #[must_use]
    pub fn identity_claims(&self) -> Option<IdentityClaims> {
        IdentityClaims::from_token(&self.store.id_token()?)
    }

    /// Forgets tokens, verifier and pending state in both scopes.
    pub fn logout(&self) {
        self.store.clear_tokens();
        self.store.clear_verifier();
        self.store.clear_state();
        info!("session cleared");
    }

    fn stored_access_token(&self) -> Result<String, Report<SessionError>> {
        self.store.access_token().ok_or_else(|| {
            SessionError::TokenInvalid {
                reason: "no access token stored".to_string(),
            }
            .into()
        })
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("origin", &self.origin.as_str())
            .field("redirect_uri", &self.redirect_uri.as_str())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn token_pair_from(response: TokenResponse) -> Result<TokenPair, SessionError> {
    match response.access_token.filter(|token| !token.is_empty()) {
        Some(access_token) => Ok(TokenPair::new(
            access_token,
            response.id_token.unwrap_or_default(),
        )),
        None => Err(SessionError::ExchangeFailed {
            message: "token response did not include an access token".to_string(),
        }),
    }
}

fn exchange_error(error: &BackendError) -> SessionError {
    match error {
        BackendError::Network { details } => SessionError::NetworkUnavailable {
            details: details.clone(),
        },
        BackendError::Status { .. } => SessionError::ExchangeFailed {
            message: error.backend_message().unwrap_or_else(|| error.to_string()),
        },
        BackendError::Malformed { details } => SessionError::ExchangeFailed {
            message: format!("malformed token response: {details}"),
        },
        BackendError::InvalidUrl { details } => SessionError::InvalidConfiguration {
            reason: details.clone(),
        },
    }
}

fn rejection_error(error: &BackendError) -> SessionError {
    match error {
        BackendError::Network { details } => SessionError::NetworkUnavailable {
            details: details.clone(),
        },
        other => SessionError::TokenInvalid {
            reason: other.to_string(),
        },
    }
}
