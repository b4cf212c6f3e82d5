//! Core domain types and utilities for budgetdesk.
//!
//! This crate provides the foundational types shared by the session layer and
//! the portal API client: the rootcause-based `Result` alias and the
//! strongly-typed identifiers the portal backend hands out.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{BudgetRequestId, DepartmentId, ExpenseCategoryId, ParseIdError, SupplierId};
