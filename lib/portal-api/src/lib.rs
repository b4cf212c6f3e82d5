//! Typed client for the budgetdesk portal REST API.
//!
//! This crate provides:
//! - `PortalClient`: budget requests, reviews, reference catalogs, CSV
//!   imports and notification emails, authenticated with the bearer token
//!   held by the session layer's `TokenStore`
//! - The wire types those endpoints exchange
//! - `ApiError`, the failure kinds of every call

pub mod client;
pub mod error;
pub mod types;

pub use client::PortalClient;
pub use error::ApiError;
pub use types::{
    BudgetRequest, BudgetRequestUpdate, CatalogEntry, CatalogKind, EmailMessage, ImportSummary,
    NewBudgetRequest, RequestFilter, RequestStatus, ReviewDecision,
};
