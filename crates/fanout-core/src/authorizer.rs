// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Decides whether an identity may join a named room.

use std::time::Duration;

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

use crate::claims::{Claims, Role};

const POLICY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Snafu)]
pub enum AuthorizationError {
    #[snafu(display("authorization policy endpoint request failed: {source}"))]
    Request { source: reqwest::Error },
    #[snafu(display("authorization policy response body was not valid JSON: {source}"))]
    Decode { source: reqwest::Error },
}

#[derive(Debug, Deserialize)]
struct PolicyResponse {
    allowed: bool,
}

/// Decides `(identity, claims, room) -> allow | deny`.
///
/// In delegated mode a policy endpoint is consulted over HTTP; without one
/// configured, a small set of built-in rules covers the `order-*`/`seller-*`
/// room naming convention.
pub struct RoomAuthorizer {
    http: Option<reqwest::Client>,
    policy_base_url: Option<String>,
}

impl RoomAuthorizer {
    pub fn new(policy_base_url: Option<String>) -> Self {
        let http = policy_base_url.as_ref().map(|_| {
            reqwest::Client::builder()
                .timeout(POLICY_TIMEOUT)
                .build()
                .expect("reqwest client builds from static configuration")
        });
        Self {
            http,
            policy_base_url: policy_base_url.map(|url| url.trim_end_matches('/').to_owned()),
        }
    }

    pub async fn authorize(
        &self,
        identity: &str,
        claims: &Claims,
        room: &str,
    ) -> Result<bool, AuthorizationError> {
        if room.is_empty() {
            return Ok(false);
        }

        match (&self.http, &self.policy_base_url) {
            (Some(http), Some(base)) => Self::authorize_delegated(http, base, identity, room).await,
            _ => Ok(Self::authorize_builtin(identity, claims, room)),
        }
    }

    async fn authorize_delegated(
        http: &reqwest::Client,
        base: &str,
        identity: &str,
        room: &str,
    ) -> Result<bool, AuthorizationError> {
        let url = Self::policy_url(base, identity, room);

        let response = http.get(&url).send().await.context(RequestSnafu)?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let body: PolicyResponse = response.json().await.context(DecodeSnafu)?;
        Ok(body.allowed)
    }

    fn policy_url(base: &str, identity: &str, room: &str) -> String {
        if let Some(id) = room.strip_prefix("order-") {
            format!("{base}/orders/{id}/can_access?user_id={identity}")
        } else if let Some(id) = room.strip_prefix("seller-") {
            format!("{base}/sellers/{id}/can_access?user_id={identity}")
        } else {
            format!("{base}/ws/can_join?room={room}&user_id={identity}")
        }
    }

    fn authorize_builtin(identity: &str, claims: &Claims, room: &str) -> bool {
        if let Some(id) = room.strip_prefix("order-") {
            claims.user_id == id || claims.role == Role::Admin
        } else if let Some(id) = room.strip_prefix("seller-") {
            claims.seller_id() == Some(id) || claims.role == Role::Seller || claims.role == Role::Admin
        } else {
            claims.user_id == identity || claims.role == Role::Admin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn claims(user_id: &str, role: Role, role_specific_id: Option<&str>) -> Claims {
        Claims {
            user_id: user_id.to_owned(),
            role,
            role_specific_id: role_specific_id.map(str::to_owned),
            expiry: Utc::now() + chrono::Duration::hours(1),
            not_before: None,
            issuer: None,
            audience: None,
        }
    }

    #[tokio::test]
    async fn builtin_allows_order_owner() {
        let authorizer = RoomAuthorizer::new(None);
        let c = claims("u1", Role::Client, None);
        assert!(authorizer.authorize("u1", &c, "order-u1").await.unwrap());
    }

    #[tokio::test]
    async fn builtin_denies_order_for_other_user() {
        let authorizer = RoomAuthorizer::new(None);
        let c = claims("u2", Role::Client, None);
        assert!(!authorizer.authorize("u2", &c, "order-u1").await.unwrap());
    }

    #[tokio::test]
    async fn builtin_allows_admin_anywhere() {
        let authorizer = RoomAuthorizer::new(None);
        let c = claims("u2", Role::Admin, None);
        assert!(authorizer.authorize("u2", &c, "order-u1").await.unwrap());
    }

    #[tokio::test]
    async fn builtin_allows_matching_seller() {
        let authorizer = RoomAuthorizer::new(None);
        let c = claims("u1", Role::Seller, Some("42"));
        assert!(authorizer.authorize("u1", &c, "seller-42").await.unwrap());
    }

    #[tokio::test]
    async fn builtin_denies_empty_room() {
        let authorizer = RoomAuthorizer::new(None);
        let c = claims("u1", Role::Admin, None);
        assert!(!authorizer.authorize("u1", &c, "").await.unwrap());
    }

    #[test]
    fn policy_url_shapes() {
        assert_eq!(
            RoomAuthorizer::policy_url("http://backend", "u1", "order-7"),
            "http://backend/orders/7/can_access?user_id=u1"
        );
        assert_eq!(
            RoomAuthorizer::policy_url("http://backend", "u1", "seller-7"),
            "http://backend/sellers/7/can_access?user_id=u1"
        );
        assert_eq!(
            RoomAuthorizer::policy_url("http://backend", "u1", "general"),
            "http://backend/ws/can_join?room=general&user_id=u1"
        );
    }
}
