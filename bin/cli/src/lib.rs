//! Command-line client for the budgetdesk portal.
//!
//! Signs in through the identity provider with a local callback listener,
//! then works with budget requests and reference catalogs over the portal API.

pub mod callback;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod render;
