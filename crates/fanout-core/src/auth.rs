// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Bearer token verification.
//!
//! Accepts only HMAC-family signing algorithms and rejects everything else
//! before the signature is even checked, which closes the classic
//! algorithm-confusion hole (e.g. a token signed `alg: none` or with an
//! asymmetric key an attacker controls one half of).

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use snafu::Snafu;

use crate::claims::{value_to_decimal_string, Claims, RawClaims, Role};

const ALLOWED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Process-wide validator configuration, built once at startup and handed to
/// the validator's constructor rather than read from implicit global state.
#[derive(Debug, Clone)]
pub struct TokenValidatorConfig {
    pub secret: String,
    pub expected_issuer: Option<String>,
    pub expected_audience: Option<String>,
}

#[derive(Debug, Snafu)]
pub enum AuthError {
    #[snafu(display("missing bearer token"))]
    Missing,
    #[snafu(display("malformed token"))]
    Malformed,
    #[snafu(display("signing algorithm is not in the HMAC family"))]
    WrongAlgorithm,
    #[snafu(display("token signature is invalid"))]
    BadSignature,
    #[snafu(display("token is expired"))]
    Expired,
    #[snafu(display("token is not yet valid"))]
    NotYetValid,
    #[snafu(display("token issuer does not match the expected issuer"))]
    WrongIssuer,
    #[snafu(display("token audience does not contain the expected audience"))]
    WrongAudience,
}

/// Verifies bearer tokens and extracts the identity/role claims carried by
/// them. Holds the process-wide secret and expected issuer/audience.
pub struct TokenValidator {
    config: TokenValidatorConfig,
    key: DecodingKey,
}

impl TokenValidator {
    pub fn new(config: TokenValidatorConfig) -> Self {
        let key = DecodingKey::from_secret(config.secret.as_bytes());
        Self { config, key }
    }

    /// Extracts the bearer token from an `Authorization` header value or a
    /// `token` query parameter, preferring the header.
    pub fn extract_token<'a>(
        authorization_header: Option<&'a str>,
        query_token: Option<&'a str>,
    ) -> Result<&'a str, AuthError> {
        if let Some(header) = authorization_header {
            let token = header
                .strip_prefix("Bearer ")
                .or_else(|| header.strip_prefix("bearer "))
                .ok_or(AuthError::Malformed)?;
            if token.is_empty() {
                return Err(AuthError::Malformed);
            }
            return Ok(token);
        }

        match query_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(AuthError::Missing),
        }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::WrongAlgorithm);
        }

        let mut validation = Validation::new(header.alg);
        // iss/aud are checked manually below so that an absent claim is
        // treated as "not asserted" rather than a hard failure.
        validation.validate_aud = false;
        validation.validate_nbf = true;

        let token_data = decode::<RawClaims>(token, &self.key, &validation).map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::ImmatureSignature => AuthError::NotYetValid,
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                _ => AuthError::Malformed,
            }
        })?;

        let raw = token_data.claims;

        if let Some(expected) = &self.config.expected_issuer {
            if let Some(actual) = &raw.iss {
                if actual != expected {
                    return Err(AuthError::WrongIssuer);
                }
            }
        }

        let audience = raw.aud.map(|a| a.into_vec());
        if let Some(expected) = &self.config.expected_audience {
            if let Some(actual) = &audience {
                if !actual.iter().any(|a| a == expected) {
                    return Err(AuthError::WrongAudience);
                }
            }
        }

        let user_id = raw
            .sub
            .clone()
            .or_else(|| raw.user_id.clone())
            .or_else(|| raw.id.as_ref().and_then(value_to_decimal_string))
            .ok_or(AuthError::Malformed)?;

        let role = raw
            .role
            .as_deref()
            .map(Role::parse)
            .unwrap_or(Role::Other(String::new()));

        let role_specific_id = raw.reference_id.clone().or_else(|| {
            if matches!(role, Role::Seller) {
                raw.seller_id.as_ref().and_then(value_to_decimal_string)
            } else {
                None
            }
        });

        let expiry = DateTime::<Utc>::from_timestamp(raw.exp, 0).ok_or(AuthError::Malformed)?;
        let not_before = raw
            .nbf
            .and_then(|nbf| DateTime::<Utc>::from_timestamp(nbf, 0));

        Ok(Claims {
            user_id,
            role,
            role_specific_id,
            expiry,
            not_before,
            issuer: raw.iss,
            audience,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use pretty_assertions::assert_eq;
    use serde::Serialize;

    const SECRET: &str = "test-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        role: String,
        reference_id: Option<String>,
        exp: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        iss: Option<String>,
    }

    fn sign(claims: &TestClaims, alg: Algorithm) -> String {
        let header = Header::new(alg);
        let key = match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                EncodingKey::from_secret(SECRET.as_bytes())
            }
            _ => panic!("test helper only signs HMAC tokens"),
        };
        encode(&header, claims, &key).unwrap()
    }

    fn validator() -> TokenValidator {
        TokenValidator::new(TokenValidatorConfig {
            secret: SECRET.to_owned(),
            expected_issuer: Some("marketplace".to_owned()),
            expected_audience: None,
        })
    }

    #[test]
    fn accepts_valid_hmac_token() {
        let token = sign(
            &TestClaims {
                sub: "u1".into(),
                role: "client".into(),
                reference_id: None,
                exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
                iss: Some("marketplace".into()),
            },
            Algorithm::HS256,
        );

        let claims = validator().validate(&token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.role, Role::Client);
    }

    #[test]
    fn rejects_expired_token() {
        let token = sign(
            &TestClaims {
                sub: "u1".into(),
                role: "client".into(),
                reference_id: None,
                exp: (Utc::now() - chrono::Duration::seconds(1)).timestamp(),
                iss: None,
            },
            Algorithm::HS256,
        );

        assert!(matches!(validator().validate(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn rejects_wrong_issuer() {
        let token = sign(
            &TestClaims {
                sub: "u1".into(),
                role: "client".into(),
                reference_id: None,
                exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
                iss: Some("someone-else".into()),
            },
            Algorithm::HS256,
        );

        assert!(matches!(validator().validate(&token), Err(AuthError::WrongIssuer)));
    }

    #[test]
    fn extract_token_prefers_header() {
        let token = TokenValidator::extract_token(Some("Bearer abc"), Some("def")).unwrap();
        assert_eq!(token, "abc");
    }

    #[test]
    fn extract_token_falls_back_to_query() {
        let token = TokenValidator::extract_token(None, Some("def")).unwrap();
        assert_eq!(token, "def");
    }

    #[test]
    fn rejects_non_hmac_algorithm() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

        // Hand-crafted token with an RS256 header and a garbage signature:
        // the algorithm allow-list must reject this before any signature
        // check is attempted.
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u1","role":"client","exp":9999999999}"#);
        let signature = URL_SAFE_NO_PAD.encode(b"not-a-real-signature");
        let token = format!("{header}.{payload}.{signature}");

        assert!(matches!(
            validator().validate(&token),
            Err(AuthError::WrongAlgorithm)
        ));
    }

    #[test]
    fn extract_token_missing() {
        assert!(matches!(
            TokenValidator::extract_token(None, None),
            Err(AuthError::Missing)
        ));
    }
}
