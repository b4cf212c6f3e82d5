//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rootcause::prelude::Report;
use url::Url;

use crate::backend::{AuthBackend, CodeExchange, TokenResponse};
use crate::error::BackendError;
use crate::jwt::tests::token_expiring_in;
use crate::navigator::Navigator;
use crate::oidc::DiscoveryConfig;
use crate::session::SessionManager;
use crate::storage::MemoryStorage;
use crate::token_store::TokenStore;
use crate::user::UserProfile;

#[derive(Debug, Clone)]
enum ExchangeOutcome {
    Tokens,
    Status(u16, String),
    Network,
    NoAccessToken,
}

/// Scriptable [`AuthBackend`] that counts its calls.
pub(crate) struct FakeBackend {
    access_token: String,
    discovery_calls: AtomicUsize,
    discovery_delay: Duration,
    discovery_failures: AtomicUsize,
    exchange_calls: AtomicUsize,
    exchange_default: Mutex<ExchangeOutcome>,
    exchange_script: Mutex<VecDeque<ExchangeOutcome>>,
    last_exchange: Mutex<Option<CodeExchange>>,
    validate_calls: AtomicUsize,
    validate_delay: Duration,
    validation_rejected: AtomicBool,
    profile_calls: AtomicUsize,
    profile: Mutex<UserProfile>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            access_token: token_expiring_in(3600),
            discovery_calls: AtomicUsize::new(0),
            discovery_delay: Duration::ZERO,
            discovery_failures: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            exchange_default: Mutex::new(ExchangeOutcome::Tokens),
            exchange_script: Mutex::new(VecDeque::new()),
            last_exchange: Mutex::new(None),
            validate_calls: AtomicUsize::new(0),
            validate_delay: Duration::ZERO,
            validation_rejected: AtomicBool::new(false),
            profile_calls: AtomicUsize::new(0),
            profile: Mutex::new(UserProfile::with_role("USER")),
        }
    }

    pub(crate) fn with_discovery_delay_ms(mut self, millis: u64) -> Self {
        self.discovery_delay = Duration::from_millis(millis);
        self
    }

    pub(crate) fn with_validation_delay_ms(mut self, millis: u64) -> Self {
        self.validate_delay = Duration::from_millis(millis);
        self
    }

    /// Fails the first `count` discovery fetches.
    pub(crate) fn failing_discovery(self, count: usize) -> Self {
        self.discovery_failures.store(count, Ordering::SeqCst);
        self
    }

    /// The access token handed out by successful exchanges.
    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }

    pub(crate) fn succeed_exchanges(&self) {
        *self.exchange_default.lock().expect("lock") = ExchangeOutcome::Tokens;
    }

    pub(crate) fn fail_exchanges_with_status(&self, status: u16, message: &str) {
        *self.exchange_default.lock().expect("lock") =
            ExchangeOutcome::Status(status, message.to_string());
    }

    pub(crate) fn fail_next_exchange_with_status(&self, status: u16, message: &str) {
        self.exchange_script
            .lock()
            .expect("lock")
            .push_back(ExchangeOutcome::Status(status, message.to_string()));
    }

    pub(crate) fn fail_exchanges_with_network(&self) {
        *self.exchange_default.lock().expect("lock") = ExchangeOutcome::Network;
    }

    pub(crate) fn respond_without_access_token(&self) {
        *self.exchange_default.lock().expect("lock") = ExchangeOutcome::NoAccessToken;
    }

    pub(crate) fn reject_validation(&self) {
        self.validation_rejected.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_profile(&self, profile: UserProfile) {
        *self.profile.lock().expect("lock") = profile;
    }

    pub(crate) fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_exchange(&self) -> Option<CodeExchange> {
        self.last_exchange.lock().expect("lock").clone()
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn fetch_discovery_config(&self) -> Result<DiscoveryConfig, Report<BackendError>> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        if !self.discovery_delay.is_zero() {
            tokio::time::sleep(self.discovery_delay).await;
        }
        let failing = self
            .discovery_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BackendError::Network {
                details: "connection refused".to_string(),
            }
            .into());
        }
        Ok(DiscoveryConfig::new(
            "https://idp.example.com/oauth2/default",
            "budgetdesk-spa",
        ))
    }

    async fn exchange_code(
        &self,
        exchange: &CodeExchange,
    ) -> Result<TokenResponse, Report<BackendError>> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_exchange.lock().expect("lock") = Some(exchange.clone());

        let scripted = self.exchange_script.lock().expect("lock").pop_front();
        let outcome =
            scripted.unwrap_or_else(|| self.exchange_default.lock().expect("lock").clone());
        match outcome {
            ExchangeOutcome::Tokens => Ok(TokenResponse {
                access_token: Some(self.access_token.clone()),
                id_token: Some("id-token".to_string()),
            }),
            ExchangeOutcome::NoAccessToken => Ok(TokenResponse {
                access_token: None,
                id_token: Some("id-token".to_string()),
            }),
            ExchangeOutcome::Status(status, message) => Err(BackendError::Status {
                status,
                body: serde_json::json!({ "message": message }).to_string(),
            }
            .into()),
            ExchangeOutcome::Network => Err(BackendError::Network {
                details: "connection reset".to_string(),
            }
            .into()),
        }
    }

    async fn validate_token(&self, _access_token: &str) -> Result<(), Report<BackendError>> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.validate_delay.is_zero() {
            tokio::time::sleep(self.validate_delay).await;
        }
        if self.validation_rejected.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 401,
                body: String::new(),
            }
            .into());
        }
        Ok(())
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<UserProfile, Report<BackendError>> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.profile.lock().expect("lock").clone())
    }
}

/// Navigator that records every URL it is sent to.
#[derive(Debug, Default)]
pub(crate) struct RecordingNavigator {
    visited: Mutex<Vec<Url>>,
}

impl RecordingNavigator {
    pub(crate) fn visited(&self) -> Vec<Url> {
        self.visited.lock().expect("lock").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &Url) {
        self.visited.lock().expect("lock").push(url.clone());
    }
}

/// Builds a session manager over `backend` with in-memory scopes.
///
/// Returns the manager, its navigator and its durable scope.
pub(crate) fn manager_with(
    backend: Arc<FakeBackend>,
) -> (
    Arc<SessionManager>,
    Arc<RecordingNavigator>,
    Arc<MemoryStorage>,
) {
    let navigator = Arc::new(RecordingNavigator::default());
    let durable = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(Arc::new(MemoryStorage::new()), durable.clone());
    let manager = SessionManager::new(
        backend,
        store,
        navigator.clone(),
        Url::parse("http://127.0.0.1:8765").expect("origin"),
    )
    .expect("manager");
    (Arc::new(manager), navigator, durable)
}
