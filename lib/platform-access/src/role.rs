//! Role names used to gate protected routes.
//!
//! Roles come from the portal's user profile (or the identity token) as
//! either a single string or a list. Matching is exact and case-sensitive:
//! `"ADMIN"` does not satisfy a requirement for `"admin"`.

use serde::{Deserialize, Serialize};

use crate::user::RoleClaim;

/// Role conventionally granted to portal administrators.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Set of role names held by a user, in the order they were reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: Vec<String>,
}

impl RoleSet {
    /// Creates an empty role set.
    #[must_use]
    pub fn none() -> Self {
        Self { roles: Vec::new() }
    }

    /// Creates a role set from role names, dropping blanks and duplicates.
    #[must_use]
    pub fn from_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::none();
        for role in roles {
            set.insert(role.into());
        }
        set
    }

    /// Creates a role set from one or more role claims.
    #[must_use]
    pub fn from_claims<'a, I>(claims: I) -> Self
    where
        I: IntoIterator<Item = &'a RoleClaim>,
    {
        Self::from_roles(claims.into_iter().flat_map(RoleClaim::names))
    }

    fn insert(&mut self, role: String) {
        if !role.trim().is_empty() && !self.roles.contains(&role) {
            self.roles.push(role);
        }
    }

    /// Returns true if `required` is one of the held roles.
    #[must_use]
    pub fn contains(&self, required: &str) -> bool {
        self.roles.iter().any(|role| role == required)
    }

    /// Returns true if no role is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the roles as a slice.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Renders the held roles for messages, e.g. `"USER"` or `"USER,APPROVER"`.
    #[must_use]
    pub fn describe(&self) -> String {
        self.roles.join(",")
    }
}
