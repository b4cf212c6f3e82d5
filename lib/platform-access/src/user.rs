//! The signed-in user's profile as reported by the portal backend.
//!
//! `GET /api/user` returns the identity provider claims the backend trusts,
//! including the portal role and the employee number used to attribute
//! budget requests.

use serde::{Deserialize, Deserializer, Serialize};

use crate::role::RoleSet;

/// A role claim: one role name or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleClaim {
    /// A single role, e.g. `"ADMIN"`.
    Single(String),
    /// A role collection, e.g. `["USER", "APPROVER"]`.
    Many(Vec<String>),
}

impl RoleClaim {
    /// Returns the role names in this claim.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Single(role) => vec![role.clone()],
            Self::Many(roles) => roles.clone(),
        }
    }
}

/// Profile of the authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// OIDC subject claim.
    #[serde(default, alias = "sub")]
    subject: Option<String>,
    /// Email address.
    #[serde(default)]
    email: Option<String>,
    /// Display name.
    #[serde(default, alias = "nombre")]
    name: Option<String>,
    /// Employee number, reported as a string or a number.
    #[serde(
        default,
        alias = "employee_number",
        alias = "numeroEmpleado",
        deserialize_with = "string_or_number"
    )]
    employee_number: Option<String>,
    /// Role claim.
    #[serde(default, alias = "rol")]
    role: Option<RoleClaim>,
    /// Additional role collection.
    #[serde(default)]
    roles: Option<RoleClaim>,
}

impl UserProfile {
    /// Creates a profile with only a role, as used by tests and fakes.
    #[must_use]
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(RoleClaim::Single(role.into())),
            ..Self::default()
        }
    }

    /// Returns the subject claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the employee number.
    #[must_use]
    pub fn employee_number(&self) -> Option<&str> {
        self.employee_number.as_deref()
    }

    /// Returns every role named by the `role` and `roles` claims.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        RoleSet::from_claims([&self.role, &self.roles].into_iter().flatten())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}
