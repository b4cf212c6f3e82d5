//! The login flow driven by the OIDC callback.
//!
//! ```text
//! Idle -> Redirecting -> CallbackReceived -> Exchanging -> Authenticated
//!                                                      \-> Failed
//! ```
//!
//! When an exchange fails and its verifier was recovered from the durable
//! scope only, the flow re-enters `Exchanging` once before failing.

use std::sync::Arc;
use std::time::Duration;

use rootcause::prelude::Report;
use tracing::{info, instrument, warn};
use url::Url;

use crate::error::SessionError;
use crate::session::SessionManager;
use crate::token_store::{TokenPair, VerifierSource};

/// How long the blocking error page stays up before returning to login.
pub const LOGIN_REDIRECT_DELAY: Duration = Duration::from_secs(3);

/// Query parameter carrying a transitional session token.
pub const TRANSITIONAL_JWT_PARAM: &str = "jwt";

/// Where a login attempt currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// Nothing started.
    Idle,
    /// The user agent was sent to the identity provider.
    Redirecting,
    /// The provider redirected back with a code.
    CallbackReceived,
    /// The code is being exchanged for tokens.
    Exchanging,
    /// Tokens were obtained and stored.
    Authenticated,
    /// The attempt failed.
    Failed(SessionError),
}

/// Query parameters of the provider's redirect to `/callback`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Reads the callback parameters from a redirect URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match &*key {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        params
    }
}

/// A failure rendered as a blocking error page that returns to login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFailure {
    /// Text shown to the user.
    pub message: String,
    /// Delay before the automatic redirect.
    pub redirect_after: Duration,
    /// Path the page redirects to.
    pub redirect_to: String,
}

impl FlowFailure {
    /// Builds the failure page content for `error`.
    #[must_use]
    pub fn from_error(error: &SessionError, login_path: &str) -> Self {
        Self {
            message: error.user_message(),
            redirect_after: LOGIN_REDIRECT_DELAY,
            redirect_to: login_path.to_string(),
        }
    }
}

/// One login attempt.
pub struct LoginFlow {
    manager: Arc<SessionManager>,
    state: LoginState,
    retried: bool,
}

impl LoginFlow {
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            state: LoginState::Idle,
            retried: false,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// Returns the session manager the flow signs in to.
    #[must_use]
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Starts the attempt and returns the authorization URL.
    ///
    /// # Errors
    ///
    /// Any error of [`SessionManager::start_login`]; the flow is then `Failed`.
    pub async fn start(&mut self) -> Result<Url, Report<SessionError>> {
        self.retried = false;
        match self.manager.start_login().await {
            Ok(url) => {
                self.state = LoginState::Redirecting;
                Ok(url)
            }
            Err(report) => Err(self.fail(report)),
        }
    }

    /// Completes the attempt from the provider's callback, storing the tokens.
    ///
    /// # Errors
    ///
    /// Returns the provider's error as `ExchangeFailed`, `StateMismatch`,
    /// or any error of [`SessionManager::exchange_code`].
    #[instrument(skip_all)]
    pub async fn handle_callback(
        &mut self,
        params: &CallbackParams,
    ) -> Result<TokenPair, Report<SessionError>> {
        if let Some(error) = &params.error {
            let message = params
                .error_description
                .clone()
                .unwrap_or_else(|| error.clone());
            warn!(provider_error = %error, "identity provider returned an error");
            // The pending state belongs to this failed attempt.
            self.manager.store().clear_state();
            return Err(self.fail(SessionError::ExchangeFailed { message }.into()));
        }

        let Some(code) = params.code.as_deref().filter(|code| !code.is_empty()) else {
            return Err(self.fail(
                SessionError::ExchangeFailed {
                    message: "callback did not include an authorization code".to_string(),
                }
                .into(),
            ));
        };

        if let Err(report) = self.manager.verify_state(params.state.as_deref()) {
            warn!("callback state does not match the pending login");
            return Err(self.fail(report));
        }
        self.state = LoginState::CallbackReceived;

        loop {
            self.state = LoginState::Exchanging;
            match self.manager.exchange_code_traced(code).await {
                Ok(pair) => {
                    self.manager.store().save_tokens(&pair);
                    self.state = LoginState::Authenticated;
                    info!("login completed");
                    return Ok(pair);
                }
                Err(failure) => {
                    let retry = !self.retried
                        && failure.verifier_source == Some(VerifierSource::Fallback)
                        && matches!(
                            failure.report.current_context(),
                            SessionError::ExchangeFailed { .. }
                        );
                    if retry {
                        self.retried = true;
                        info!("retrying exchange with the recovered verifier");
                        continue;
                    }
                    return Err(self.fail(failure.report));
                }
            }
        }
    }

    fn fail(&mut self, report: Report<SessionError>) -> Report<SessionError> {
        self.state = LoginState::Failed(report.current_context().clone());
        report
    }
}

/// Removes a transitional `jwt` query parameter from `url`.
///
/// Returns the token, if present, and the URL without it. Other parameters
/// keep their order.
#[must_use]
pub fn capture_transitional_jwt(url: &Url) -> (Option<String>, Url) {
    let mut token = None;
    let mut kept = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == TRANSITIONAL_JWT_PARAM {
            if token.is_none() && !value.is_empty() {
                token = Some(value.into_owned());
            }
        } else {
            kept.push((key.into_owned(), value.into_owned()));
        }
    }

    if token.is_none() && kept.len() == url.query_pairs().count() {
        return (None, url.clone());
    }

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    (token, stripped)
}

impl SessionManager {
    /// Stores a transitional token found in `url` and returns the URL
    /// without it.
    pub fn capture_transitional_jwt(&self, url: &Url) -> Url {
        let (token, stripped) = capture_transitional_jwt(url);
        if let Some(token) = token {
            self.store().save_transitional_jwt(&token);
            info!("captured transitional session token");
        }
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageScope;
    use crate::testing::{FakeBackend, manager_with};
    use crate::token_store::VERIFIER_KEY;

    async fn started(backend: &Arc<FakeBackend>) -> (LoginFlow, String) {
        let (manager, _, _) = manager_with(backend.clone());
        let mut flow = LoginFlow::new(manager);
        let url = flow.start().await.expect("start");
        assert_eq!(flow.state(), &LoginState::Redirecting);
        let state = CallbackParams::from_url(&url).state.expect("state");
        (flow, state)
    }

    fn callback(code: &str, state: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..CallbackParams::default()
        }
    }

    #[tokio::test]
    async fn successful_callback_stores_tokens() {
        let backend = Arc::new(FakeBackend::new());
        let (mut flow, state) = started(&backend).await;

        let pair = flow
            .handle_callback(&callback("abc", &state))
            .await
            .expect("login");
        assert_eq!(flow.state(), &LoginState::Authenticated);
        assert_eq!(
            flow.manager.store().access_token().as_deref(),
            Some(pair.access_token())
        );
        assert!(flow.manager.is_locally_valid());
        assert_eq!(flow.manager.store().load_verifier(), None);
    }

    #[tokio::test]
    async fn forged_state_never_reaches_the_backend() {
        let backend = Arc::new(FakeBackend::new());
        let (mut flow, _) = started(&backend).await;

        let err = flow
            .handle_callback(&callback("abc", "forged"))
            .await
            .expect_err("mismatch");
        assert_eq!(err.current_context(), &SessionError::StateMismatch);
        assert_eq!(flow.state(), &LoginState::Failed(SessionError::StateMismatch));
        assert_eq!(backend.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn provider_error_fails_with_description() {
        let backend = Arc::new(FakeBackend::new());
        let (mut flow, state) = started(&backend).await;

        let params = CallbackParams {
            state: Some(state),
            error: Some("access_denied".to_string()),
            error_description: Some("User is not assigned to the client application.".to_string()),
            ..CallbackParams::default()
        };
        let err = flow.handle_callback(&params).await.expect_err("denied");
        assert_eq!(
            err.current_context().user_message(),
            "User is not assigned to the client application."
        );
        assert_eq!(backend.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn primary_verifier_failure_is_not_retried() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_exchanges_with_status(400, "invalid_grant");
        let (mut flow, state) = started(&backend).await;

        let err = flow
            .handle_callback(&callback("abc", &state))
            .await
            .expect_err("rejected");
        assert_eq!(
            err.current_context(),
            &SessionError::ExchangeFailed {
                message: "invalid_grant".to_string()
            }
        );
        assert_eq!(backend.exchange_calls(), 1);
    }

    #[tokio::test]
    async fn fallback_verifier_failure_is_retried_once() {
        let backend = Arc::new(FakeBackend::new());
        let (manager, _, durable) = manager_with(backend.clone());
        let mut flow = LoginFlow::new(manager.clone());
        let url = flow.start().await.expect("start");
        let state = CallbackParams::from_url(&url).state.expect("state");

        // Simulate a process restart: only the durable copy survives.
        let verifier = durable.get(VERIFIER_KEY).expect("verifier");
        manager.store().clear_verifier();
        durable.set(VERIFIER_KEY, &verifier);

        backend.fail_next_exchange_with_status(400, "transient");
        flow.handle_callback(&callback("abc", &state))
            .await
            .expect("retry succeeds");
        assert_eq!(backend.exchange_calls(), 2);
        assert_eq!(flow.state(), &LoginState::Authenticated);
    }

    #[tokio::test]
    async fn fallback_retry_happens_at_most_once() {
        let backend = Arc::new(FakeBackend::new());
        let (manager, _, durable) = manager_with(backend.clone());
        let mut flow = LoginFlow::new(manager.clone());
        let url = flow.start().await.expect("start");
        let state = CallbackParams::from_url(&url).state.expect("state");

        let verifier = durable.get(VERIFIER_KEY).expect("verifier");
        manager.store().clear_verifier();
        durable.set(VERIFIER_KEY, &verifier);

        backend.fail_exchanges_with_status(400, "invalid_grant");
        flow.handle_callback(&callback("abc", &state))
            .await
            .expect_err("still rejected");
        assert_eq!(backend.exchange_calls(), 2);
    }

    #[test]
    fn failure_page_redirects_to_login_after_delay() {
        let failure = FlowFailure::from_error(
            &SessionError::NetworkUnavailable {
                details: "dns".to_string(),
            },
            "/login",
        );
        assert_eq!(failure.message, crate::error::CONNECTIVITY_MESSAGE);
        assert_eq!(failure.redirect_after, Duration::from_secs(3));
        assert_eq!(failure.redirect_to, "/login");
    }

    #[test]
    fn callback_params_from_url() {
        let url = Url::parse("http://127.0.0.1:8765/callback?code=c1&state=s1&extra=x")
            .expect("url");
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.code.as_deref(), Some("c1"));
        assert_eq!(params.state.as_deref(), Some("s1"));
        assert_eq!(params.error, None);
    }

    #[test]
    fn transitional_jwt_is_stripped_from_url() {
        let url = Url::parse("https://portal.example.com/home?tab=2&jwt=abc.def.ghi&x=1")
            .expect("url");
        let (token, stripped) = capture_transitional_jwt(&url);
        assert_eq!(token.as_deref(), Some("abc.def.ghi"));
        assert_eq!(stripped.as_str(), "https://portal.example.com/home?tab=2&x=1");

        let only = Url::parse("https://portal.example.com/home?jwt=t").expect("url");
        let (token, stripped) = capture_transitional_jwt(&only);
        assert_eq!(token.as_deref(), Some("t"));
        assert_eq!(stripped.as_str(), "https://portal.example.com/home");
    }

    #[test]
    fn url_without_jwt_is_unchanged() {
        let url = Url::parse("https://portal.example.com/home?tab=2").expect("url");
        assert_eq!(capture_transitional_jwt(&url), (None, url.clone()));
    }

    #[test]
    fn manager_persists_captured_jwt() {
        let (manager, _, _) = manager_with(Arc::new(FakeBackend::new()));
        let url = Url::parse("https://portal.example.com/?jwt=t0k").expect("url");
        let stripped = manager.capture_transitional_jwt(&url);
        assert_eq!(stripped.query(), None);
        assert_eq!(manager.store().transitional_jwt().as_deref(), Some("t0k"));
    }
}
