//! Route gating.
//!
//! [`SessionGate`] decides what a navigation to a protected route gets. The
//! local expiry check runs first and needs no network; a locally valid token
//! is then confirmed by the backend, which is authoritative. Every failure
//! past the local check denies access.
//!
//! Decisions are published on a `watch` channel so a UI can show a loading
//! state while validation is pending. Each evaluation carries a generation
//! number; a result whose generation was superseded or cancelled is not
//! published, but is still returned to its own caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::session::SessionManager;

/// Default path of the login page.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Default path authenticated users land on.
pub const DEFAULT_LANDING_PATH: &str = "/";

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// Render the route.
    Allow,
    /// Send the user to the login page.
    RedirectToLogin,
    /// Server validation is pending.
    Loading,
    /// Authenticated, but without the required role.
    Forbidden { required: String, actual: String },
    /// Authenticated user on the login page; send them to the landing page.
    RedirectToLanding,
}

/// Guard for protected routes.
pub struct SessionGate {
    manager: Arc<SessionManager>,
    auth_enabled: bool,
    login_path: String,
    landing_path: String,
    generation: AtomicU64,
    decisions: watch::Sender<GateDecision>,
}

impl SessionGate {
    /// Creates a gate with authentication enabled and default paths.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let (decisions, _) = watch::channel(GateDecision::Loading);
        Self {
            manager,
            auth_enabled: true,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            generation: AtomicU64::new(0),
            decisions,
        }
    }

    /// With authentication disabled every route is allowed.
    #[must_use]
    pub fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_landing_path(mut self, path: impl Into<String>) -> Self {
        self.landing_path = path.into();
        self
    }

    /// Returns the landing path.
    #[must_use]
    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    /// Subscribes to published decisions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GateDecision> {
        self.decisions.subscribe()
    }

    /// Returns the last published decision.
    #[must_use]
    pub fn current(&self) -> GateDecision {
        self.decisions.borrow().clone()
    }

    /// Cancels the evaluation in progress; its result will not be published.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Evaluates access to a protected route.
    ///
    /// `required_role` is matched exactly against the user's roles. The
    /// returned decision is always computed for `required_role`; if this
    /// evaluation is superseded or cancelled before it finishes, it is only
    /// left unpublished.
    #[instrument(skip(self))]
    pub async fn evaluate(&self, required_role: Option<&str>) -> GateDecision {
        let generation = self.next_generation();
        let decision = self.decide(generation, required_role).await;
        self.publish(generation, decision)
    }

    /// Evaluates a navigation to `path`.
    ///
    /// The login path is public, except that an authenticated user is sent
    /// on to the landing page.
    #[instrument(skip(self))]
    pub async fn evaluate_route(&self, path: &str, required_role: Option<&str>) -> GateDecision {
        if !self.auth_enabled || path != self.login_path {
            return self.evaluate(required_role).await;
        }

        let generation = self.next_generation();
        let decision = match self.decide(generation, None).await {
            GateDecision::Allow => GateDecision::RedirectToLanding,
            _ => GateDecision::Allow,
        };
        self.publish(generation, decision)
    }

    async fn decide(&self, generation: u64, required_role: Option<&str>) -> GateDecision {
        if !self.auth_enabled {
            return GateDecision::Allow;
        }

        if !self.manager.is_locally_valid() {
            debug!("no locally valid access token");
            return GateDecision::RedirectToLogin;
        }

        self.publish(generation, GateDecision::Loading);

        if let Err(report) = self.manager.validate_session().await {
            warn!(error = %report.current_context(), "session validation failed");
            return GateDecision::RedirectToLogin;
        }

        let Some(required) = required_role else {
            return GateDecision::Allow;
        };

        match self.manager.user_profile().await {
            Ok(profile) => {
                let roles = profile.roles();
                if roles.contains(required) {
                    GateDecision::Allow
                } else {
                    debug!(required, actual = %roles.describe(), "required role missing");
                    GateDecision::Forbidden {
                        required: required.to_string(),
                        actual: roles.describe(),
                    }
                }
            }
            Err(report) => {
                warn!(error = %report.current_context(), "profile fetch failed");
                GateDecision::RedirectToLogin
            }
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, generation: u64, decision: GateDecision) -> GateDecision {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.decisions.send_replace(decision.clone());
        } else {
            debug!(?decision, "not publishing superseded gate decision");
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::tests::token_expiring_in;
    use crate::role::ADMIN_ROLE;
    use crate::testing::{FakeBackend, manager_with};
    use crate::token_store::TokenPair;
    use crate::user::UserProfile;

    fn signed_in(backend: Arc<FakeBackend>) -> SessionGate {
        let (manager, _, _) = manager_with(backend);
        manager
            .store()
            .save_tokens(&TokenPair::new(token_expiring_in(600), "id"));
        SessionGate::new(manager)
    }

    #[tokio::test]
    async fn user_without_required_role_is_forbidden() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_profile(UserProfile::with_role("USER"));
        let gate = signed_in(backend);

        assert_eq!(
            gate.evaluate(Some(ADMIN_ROLE)).await,
            GateDecision::Forbidden {
                required: "ADMIN".to_string(),
                actual: "USER".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn user_with_required_role_is_allowed() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_profile(UserProfile::with_role("ADMIN"));
        let gate = signed_in(backend);
        assert_eq!(gate.evaluate(Some(ADMIN_ROLE)).await, GateDecision::Allow);
        assert_eq!(gate.current(), GateDecision::Allow);
    }

    #[tokio::test]
    async fn expired_token_redirects_without_network() {
        let backend = Arc::new(FakeBackend::new());
        let (manager, _, _) = manager_with(backend.clone());
        manager
            .store()
            .save_tokens(&TokenPair::new(token_expiring_in(-60), "id"));
        let gate = SessionGate::new(manager);

        assert_eq!(gate.evaluate(None).await, GateDecision::RedirectToLogin);
        assert_eq!(backend.validate_calls(), 0);
        assert_eq!(backend.profile_calls(), 0);
    }

    #[tokio::test]
    async fn rejected_validation_fails_closed() {
        let backend = Arc::new(FakeBackend::new());
        backend.reject_validation();
        let gate = signed_in(backend.clone());

        assert_eq!(
            gate.evaluate(Some(ADMIN_ROLE)).await,
            GateDecision::RedirectToLogin
        );
        assert_eq!(backend.profile_calls(), 0);
    }

    #[tokio::test]
    async fn no_required_role_skips_profile() {
        let backend = Arc::new(FakeBackend::new());
        let gate = signed_in(backend.clone());
        assert_eq!(gate.evaluate(None).await, GateDecision::Allow);
        assert_eq!(backend.validate_calls(), 1);
        assert_eq!(backend.profile_calls(), 0);
    }

    #[tokio::test]
    async fn disabled_auth_allows_everything() {
        let backend = Arc::new(FakeBackend::new());
        let (manager, _, _) = manager_with(backend.clone());
        let gate = SessionGate::new(manager).with_auth_enabled(false);
        assert_eq!(gate.evaluate(Some(ADMIN_ROLE)).await, GateDecision::Allow);
        assert_eq!(backend.validate_calls(), 0);
    }

    #[tokio::test]
    async fn loading_is_published_while_validating() {
        let backend = Arc::new(FakeBackend::new().with_validation_delay_ms(50));
        let gate = Arc::new(signed_in(backend));
        let mut decisions = gate.subscribe();

        let task = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.evaluate(None).await }
        });

        decisions.changed().await.expect("loading published");
        assert_eq!(*decisions.borrow_and_update(), GateDecision::Loading);
        assert_eq!(task.await.expect("join"), GateDecision::Allow);
        assert_eq!(*decisions.borrow(), GateDecision::Allow);
    }

    #[tokio::test]
    async fn cancelled_evaluation_is_not_published() {
        let backend = Arc::new(FakeBackend::new().with_validation_delay_ms(50));
        let gate = Arc::new(signed_in(backend));
        let mut decisions = gate.subscribe();

        let task = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.evaluate(None).await }
        });

        decisions.changed().await.expect("loading published");
        decisions.borrow_and_update();
        gate.cancel();

        assert_eq!(task.await.expect("join"), GateDecision::Allow);
        assert!(!decisions.has_changed().expect("sender alive"));
        assert_eq!(gate.current(), GateDecision::Loading);
    }

    #[tokio::test]
    async fn superseded_evaluation_keeps_its_own_role_check() {
        let backend = Arc::new(FakeBackend::new().with_validation_delay_ms(50));
        backend.set_profile(UserProfile::with_role("USER"));
        let gate = Arc::new(signed_in(backend));
        let mut decisions = gate.subscribe();

        let admin_check = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.evaluate(Some(ADMIN_ROLE)).await }
        });
        decisions.changed().await.expect("loading published");

        let plain = gate.evaluate(None).await;
        assert_eq!(plain, GateDecision::Allow);
        assert_eq!(
            admin_check.await.expect("join"),
            GateDecision::Forbidden {
                required: "ADMIN".to_string(),
                actual: "USER".to_string(),
            }
        );
        // Only the newest evaluation publishes.
        assert_eq!(gate.current(), GateDecision::Allow);
    }

    #[tokio::test]
    async fn authenticated_user_on_login_path_goes_to_landing() {
        let gate = signed_in(Arc::new(FakeBackend::new())).with_landing_path("/solicitudes");
        assert_eq!(
            gate.evaluate_route("/login", None).await,
            GateDecision::RedirectToLanding
        );
        assert_eq!(gate.landing_path(), "/solicitudes");
        assert_eq!(
            gate.evaluate_route("/solicitudes", None).await,
            GateDecision::Allow
        );
    }

    #[tokio::test]
    async fn anonymous_user_may_open_login_path() {
        let (manager, _, _) = manager_with(Arc::new(FakeBackend::new()));
        let gate = SessionGate::new(manager);
        assert_eq!(gate.evaluate_route("/login", None).await, GateDecision::Allow);
        assert_eq!(
            gate.evaluate_route("/solicitudes", None).await,
            GateDecision::RedirectToLogin
        );
    }

    #[test]
    fn decisions_serialize_with_tag() {
        let json = serde_json::to_value(GateDecision::Forbidden {
            required: "ADMIN".to_string(),
            actual: "USER".to_string(),
        })
        .expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({ "decision": "forbidden", "required": "ADMIN", "actual": "USER" })
        );
    }
}
