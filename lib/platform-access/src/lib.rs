//! Sign-in and access control for budgetdesk.
//!
//! This crate provides:
//! - PKCE verifier and challenge generation (`pkce`)
//! - The OIDC session manager: discovery, authorization requests, code
//!   exchange and token validation (`session`)
//! - The login state machine driven by the provider callback (`login`)
//! - Two-scope persistence of verifiers and tokens (`token_store`, `storage`)
//! - Route gating by session validity and role (`gate`)
//!
//! # Sign-in model
//!
//! The backend owns the client secret and performs the token exchange; this
//! crate only holds the PKCE verifier between the redirect and the callback.
//! Verifiers and tokens live in two scopes: a primary scope that dies with
//! the process and a durable scope that survives it. Reads fall back from
//! primary to durable.
//!
//! # Example
//!
//! ```
//! use budgetdesk_platform_access::{RoleSet, pkce};
//!
//! let challenge = pkce::compute_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
//! assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
//!
//! let roles = RoleSet::from_roles(["USER"]);
//! assert!(!roles.contains("ADMIN"));
//! ```

pub mod backend;
pub mod error;
pub mod gate;
pub mod jwt;
pub mod login;
pub mod navigator;
pub mod oidc;
pub mod pkce;
pub mod role;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod token_store;
pub mod user;

#[cfg(test)]
mod testing;

pub use backend::{AuthBackend, AuthEndpoints, HttpAuthBackend};
pub use error::{BackendError, SessionError};
pub use gate::{GateDecision, SessionGate};
pub use login::{CallbackParams, FlowFailure, LoginFlow, LoginState, capture_transitional_jwt};
pub use navigator::{LoggingNavigator, Navigator};
pub use oidc::{AuthorizationRequest, DiscoveryConfig};
pub use role::RoleSet;
pub use runtime::RuntimeConfig;
pub use session::SessionManager;
pub use storage::{FileStorage, MemoryStorage, StorageScope};
pub use token_store::{TokenPair, TokenStore};
pub use user::{RoleClaim, UserProfile};
