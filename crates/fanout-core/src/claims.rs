// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Verified assertions extracted from a bearer token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The small closed set of roles the rest of the system dispatches on.
///
/// `Other` absorbs any role string the token carries that isn't one of the
/// known roles, so an unrecognized role never fails validation outright — it
/// simply never matches a role-scoped fan-out rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Seller,
    Client,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "seller" => Role::Seller,
            "client" => Role::Client,
            _ => Role::Other(raw.to_owned()),
        }
    }
}

/// Verified claims carried by a connection for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub user_id: String,
    pub role: Role,
    pub role_specific_id: Option<String>,
    pub expiry: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub issuer: Option<String>,
    pub audience: Option<Vec<String>>,
}

impl Claims {
    /// Convenience accessor mirroring the legacy `claims.seller_id` field used
    /// by the built-in authorization fallback.
    pub fn seller_id(&self) -> Option<&str> {
        if matches!(self.role, Role::Seller) {
            self.role_specific_id.as_deref()
        } else {
            None
        }
    }
}

/// Wire shape deserialized directly from the JWT payload, before the
/// claim-priority rules in [`crate::auth::TokenValidator`] collapse it into
/// a [`Claims`].
#[derive(Debug, Deserialize)]
pub(crate) struct RawClaims {
    pub sub: Option<String>,
    pub user_id: Option<String>,
    pub id: Option<serde_json::Value>,
    pub role: Option<String>,
    pub reference_id: Option<String>,
    /// Legacy per-role field, kept only for the seller role.
    pub seller_id: Option<serde_json::Value>,
    pub exp: i64,
    pub nbf: Option<i64>,
    pub iss: Option<String>,
    pub aud: Option<AudienceClaim>,
}

/// `aud` is legally either a single string or an array of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum AudienceClaim {
    Single(String),
    Many(Vec<String>),
}

impl AudienceClaim {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            AudienceClaim::Single(s) => vec![s],
            AudienceClaim::Many(v) => v,
        }
    }
}

pub(crate) fn value_to_decimal_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
