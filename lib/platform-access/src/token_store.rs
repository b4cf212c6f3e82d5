//! Persisted tokens and PKCE verifier over two storage scopes.
//!
//! Writes go to both the primary and the durable scope. Reads try the
//! primary scope first; a verifier found only in the durable scope is copied
//! back into the primary scope so the rest of the flow sees it there.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{MemoryStorage, StorageScope};

/// Storage key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key of the identity token.
pub const ID_TOKEN_KEY: &str = "id_token";
/// Storage key of the PKCE verifier.
pub const VERIFIER_KEY: &str = "okta_code_verifier";
/// Storage key of the anti-forgery state of the pending login.
pub const STATE_KEY: &str = "oidc_state";
/// Storage key of a token handed over through the `jwt` query parameter.
pub const TRANSITIONAL_JWT_KEY: &str = "jwt";

/// Access and identity tokens from one successful exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    access_token: String,
    id_token: String,
}

impl TokenPair {
    /// Creates a token pair.
    #[must_use]
    pub fn new(access_token: impl Into<String>, id_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: id_token.into(),
        }
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the identity token. Empty when the backend did not send one.
    #[must_use]
    pub fn id_token(&self) -> &str {
        &self.id_token
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[redacted]")
            .field("id_token", &"[redacted]")
            .finish()
    }
}

/// Which scope a verifier was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierSource {
    /// Found in the primary scope.
    Primary,
    /// Found only in the durable scope; the primary scope has been reseeded.
    Fallback,
}

/// Token and verifier persistence across the primary and durable scopes.
#[derive(Clone)]
pub struct TokenStore {
    primary: Arc<dyn StorageScope>,
    durable: Arc<dyn StorageScope>,
}

impl TokenStore {
    /// Creates a store over the given scopes.
    #[must_use]
    pub fn new(primary: Arc<dyn StorageScope>, durable: Arc<dyn StorageScope>) -> Self {
        Self { primary, durable }
    }

    /// Creates a store whose scopes both live in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
    }

    /// Persists the PKCE verifier in both scopes.
    pub fn save_verifier(&self, verifier: &str) {
        self.primary.set(VERIFIER_KEY, verifier);
        self.durable.set(VERIFIER_KEY, verifier);
    }

    /// Returns the persisted verifier, if any.
    #[must_use]
    pub fn load_verifier(&self) -> Option<String> {
        self.load_verifier_with_source().map(|(verifier, _)| verifier)
    }

    /// Returns the persisted verifier and the scope it was found in.
    ///
    /// Empty values count as absent.
    #[must_use]
    pub fn load_verifier_with_source(&self) -> Option<(String, VerifierSource)> {
        if let Some(verifier) = non_empty(self.primary.get(VERIFIER_KEY)) {
            return Some((verifier, VerifierSource::Primary));
        }

        let verifier = non_empty(self.durable.get(VERIFIER_KEY))?;
        debug!("PKCE verifier recovered from durable storage, reseeding primary scope");
        self.primary.set(VERIFIER_KEY, &verifier);
        Some((verifier, VerifierSource::Fallback))
    }

    /// Removes the verifier from both scopes.
    pub fn clear_verifier(&self) {
        self.primary.remove(VERIFIER_KEY);
        self.durable.remove(VERIFIER_KEY);
    }

    /// Persists the anti-forgery state of a pending login in both scopes.
    pub fn save_state(&self, state: &str) {
        self.primary.set(STATE_KEY, state);
        self.durable.set(STATE_KEY, state);
    }

    /// Removes and returns the pending login's state.
    #[must_use]
    pub fn take_state(&self) -> Option<String> {
        let state = non_empty(self.primary.get(STATE_KEY))
            .or_else(|| non_empty(self.durable.get(STATE_KEY)));
        self.primary.remove(STATE_KEY);
        self.durable.remove(STATE_KEY);
        state
    }

    /// Drops the pending login's state from both scopes.
    pub fn clear_state(&self) {
        self.primary.remove(STATE_KEY);
        self.durable.remove(STATE_KEY);
    }

    /// Replaces the stored token pair in both scopes.
    pub fn save_tokens(&self, pair: &TokenPair) {
        let entries = [
            (ACCESS_TOKEN_KEY, pair.access_token()),
            (ID_TOKEN_KEY, pair.id_token()),
        ];
        self.primary.set_all(&entries);
        self.durable.set_all(&entries);
    }

    /// Returns the stored access token.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    /// Returns the stored identity token.
    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        self.read(ID_TOKEN_KEY)
    }

    /// Returns both tokens when an access token is stored.
    #[must_use]
    pub fn token_pair(&self) -> Option<TokenPair> {
        let access_token = self.access_token()?;
        Some(TokenPair::new(access_token, self.id_token().unwrap_or_default()))
    }

    /// Removes both tokens from both scopes.
    pub fn clear_tokens(&self) {
        let keys = [ACCESS_TOKEN_KEY, ID_TOKEN_KEY, TRANSITIONAL_JWT_KEY];
        self.primary.remove_all(&keys);
        self.durable.remove_all(&keys);
    }

    /// Stores a token captured from the `jwt` query parameter in both scopes.
    pub fn save_transitional_jwt(&self, jwt: &str) {
        self.primary.set(TRANSITIONAL_JWT_KEY, jwt);
        self.durable.set(TRANSITIONAL_JWT_KEY, jwt);
    }

    /// Returns the token captured from the `jwt` query parameter.
    #[must_use]
    pub fn transitional_jwt(&self) -> Option<String> {
        self.read(TRANSITIONAL_JWT_KEY)
    }

    /// Returns the token to present to the portal API: the access token, or
    /// the transitional token when no login has completed yet.
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        self.access_token().or_else(|| self.transitional_jwt())
    }

    fn read(&self, key: &str) -> Option<String> {
        non_empty(self.primary.get(key)).or_else(|| non_empty(self.durable.get(key)))
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes() -> (Arc<MemoryStorage>, Arc<MemoryStorage>, TokenStore) {
        let primary = Arc::new(MemoryStorage::new());
        let durable = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(primary.clone(), durable.clone());
        (primary, durable, store)
    }

    #[test]
    fn verifier_is_written_to_both_scopes() {
        let (primary, durable, store) = scopes();
        store.save_verifier("v1");
        assert_eq!(primary.get(VERIFIER_KEY).as_deref(), Some("v1"));
        assert_eq!(durable.get(VERIFIER_KEY).as_deref(), Some("v1"));
    }

    #[test]
    fn verifier_read_prefers_primary() {
        let (_, durable, store) = scopes();
        store.save_verifier("fresh");
        durable.set(VERIFIER_KEY, "stale");
        assert_eq!(
            store.load_verifier_with_source(),
            Some(("fresh".to_string(), VerifierSource::Primary))
        );
    }

    #[test]
    fn verifier_fallback_reseeds_primary() {
        let (primary, durable, store) = scopes();
        durable.set(VERIFIER_KEY, "survivor");

        assert_eq!(
            store.load_verifier_with_source(),
            Some(("survivor".to_string(), VerifierSource::Fallback))
        );
        assert_eq!(primary.get(VERIFIER_KEY).as_deref(), Some("survivor"));
        assert_eq!(
            store.load_verifier_with_source(),
            Some(("survivor".to_string(), VerifierSource::Primary))
        );
    }

    #[test]
    fn empty_verifier_counts_as_missing() {
        let (primary, durable, store) = scopes();
        primary.set(VERIFIER_KEY, "");
        durable.set(VERIFIER_KEY, "");
        assert_eq!(store.load_verifier(), None);
    }

    #[test]
    fn clear_verifier_removes_both_scopes() {
        let (primary, durable, store) = scopes();
        store.save_verifier("v");
        store.clear_verifier();
        assert_eq!(primary.get(VERIFIER_KEY), None);
        assert_eq!(durable.get(VERIFIER_KEY), None);
        assert_eq!(store.load_verifier(), None);
    }

    #[test]
    fn tokens_roundtrip_and_clear() {
        let (_, _, store) = scopes();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.token_pair(), None);

        store.save_tokens(&TokenPair::new("access", "identity"));
        assert_eq!(store.access_token().as_deref(), Some("access"));
        assert_eq!(store.id_token().as_deref(), Some("identity"));

        store.save_tokens(&TokenPair::new("access-2", "identity-2"));
        assert_eq!(
            store.token_pair(),
            Some(TokenPair::new("access-2", "identity-2"))
        );

        store.clear_tokens();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.id_token(), None);
    }

    #[test]
    fn tokens_survive_primary_reset() {
        let (primary, _, store) = scopes();
        store.save_tokens(&TokenPair::new("access", "identity"));
        primary.clear();
        assert_eq!(store.access_token().as_deref(), Some("access"));
    }

    #[test]
    fn state_is_taken_once() {
        let (_, _, store) = scopes();
        store.save_state("xyz");
        assert_eq!(store.take_state().as_deref(), Some("xyz"));
        assert_eq!(store.take_state(), None);
    }

    #[test]
    fn clear_state_removes_both_scopes() {
        let (primary, durable, store) = scopes();
        store.save_state("xyz");
        store.clear_state();
        assert_eq!(primary.get(STATE_KEY), None);
        assert_eq!(durable.get(STATE_KEY), None);
        assert_eq!(store.take_state(), None);
    }

    #[test]
    fn bearer_prefers_access_token_over_transitional() {
        let (primary, _, store) = scopes();
        assert_eq!(store.bearer_token(), None);

        store.save_transitional_jwt("legacy");
        primary.clear();
        assert_eq!(store.bearer_token().as_deref(), Some("legacy"));

        store.save_tokens(&TokenPair::new("access", "identity"));
        assert_eq!(store.bearer_token().as_deref(), Some("access"));

        store.clear_tokens();
        assert_eq!(store.bearer_token(), None);
    }

    #[test]
    fn token_pair_debug_is_redacted() {
        let debug = format!("{:?}", TokenPair::new("secret-access", "secret-id"));
        assert!(!debug.contains("secret"));
    }
}
