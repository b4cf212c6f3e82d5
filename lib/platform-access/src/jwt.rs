//! Unverified JWT payload decoding for local expiry checks and UI claims.
//!
//! Signatures are not checked here. The backend validates tokens on every
//! protected navigation; this module only answers "is it worth asking".

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::role::RoleSet;
use crate::user::RoleClaim;

/// Decodes the payload (second dot-separated segment) of a compact JWT.
///
/// Accepts both the URL-safe and the standard base64 alphabet, with or
/// without padding. Returns `None` for anything that is not a three-segment
/// token with a JSON object payload.
#[must_use]
pub fn decode_payload(token: &str) -> Option<Value> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD.decode(normalized).ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    value.is_object().then_some(value)
}

/// Returns the `exp` claim of `token` as a timestamp.
#[must_use]
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_payload(token)?.get("exp").cloned()?;
    let seconds = exp
        .as_i64()
        .or_else(|| exp.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?;
    DateTime::from_timestamp(seconds, 0)
}

/// Returns true when `token` decodes and its `exp` lies after `now`.
#[must_use]
pub fn is_unexpired_at(token: &str, now: DateTime<Utc>) -> bool {
    expires_at(token).is_some_and(|exp| exp > now)
}

/// Identity claims the UI chrome needs from the ID token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdentityClaims {
    /// Subject identifier.
    #[serde(default)]
    pub sub: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Login name.
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Role claim, a single role or a list.
    #[serde(default)]
    pub role: Option<RoleClaim>,
    /// Alternative role claim some authorization servers emit.
    #[serde(default)]
    pub roles: Option<RoleClaim>,
    /// Group memberships.
    #[serde(default)]
    pub groups: Option<RoleClaim>,
}

impl IdentityClaims {
    /// Decodes the claims carried by `id_token`.
    #[must_use]
    pub fn from_token(id_token: &str) -> Option<Self> {
        serde_json::from_value(decode_payload(id_token)?).ok()
    }

    /// Returns every role named by the `role`, `roles` and `groups` claims.
    #[must_use]
    pub fn role_set(&self) -> RoleSet {
        RoleSet::from_claims([&self.role, &self.roles, &self.groups].into_iter().flatten())
    }

    /// Returns the best available display name.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.preferred_username.as_deref())
            .or(self.email.as_deref())
    }
}
