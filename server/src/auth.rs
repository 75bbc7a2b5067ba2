//! Bearer token issuance and verification.
//!
//! Tokens are HS256-signed JWTs carrying `{sub, role, iat, exp}` and are valid
//! for 24 hours from issuance. They are stateless: nothing is stored server
//! side, so a token is trusted if and only if its signature verifies under the
//! configured secret and its expiry has not elapsed.
//!
//! # Overview
//!
//! 1. [`TokenService::new`] is built once at startup from `JWT_SECRET`. An
//!    empty secret is a [`ConfigError`] and the server refuses to boot.
//! 2. [`TokenService::issue`] signs claims for a user after login or a
//!    federated identity exchange.
//! 3. [`TokenService::verify`] checks algorithm, signature, subject and
//!    expiry, in that order, and returns the claims.
//!
//! Expiry is evaluated against an injectable [`Clock`] rather than the system
//! time directly so the 24-hour window can be tested deterministically.
//!
//! # Example
//!
//! ```rust
//! use spotlight_server::auth::TokenService;
//! use spotlight_server::types::Role;
//!
//! let tokens = TokenService::new("local-dev-secret").unwrap();
//! let token = tokens.issue("user-1", Role::Fan).unwrap();
//! let claims = tokens.verify(&token).unwrap();
//! assert_eq!(claims.sub, "user-1");
//! ```

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use crate::error::ServerError;
use crate::types::Role;

/// Lifetime of an issued token (24 hours).
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can hand one clone to the
/// service under test and advance the other.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Claims and errors
// ============================================================================

/// Claims carried by a local bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    #[serde(default)]
    pub sub: String,

    pub role: Role,

    /// Issued at, seconds since the Unix epoch.
    pub iat: i64,

    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Reasons a bearer token is rejected.
///
/// Clients see all of these as the same `invalid_token` 401; the variant is
/// kept for logging.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Not a decodable JWT.
    #[error("malformed token")]
    Malformed,

    /// Signature does not verify under the configured secret.
    #[error("invalid signature")]
    InvalidSignature,

    /// Header names an algorithm other than HS256.
    #[error("unexpected signing algorithm")]
    InvalidAlgorithm,

    /// Subject claim is absent or blank.
    #[error("missing subject claim")]
    MissingSubject,

    /// Expiry has elapsed.
    #[error("token expired")]
    Expired,
}

impl TokenError {
    /// Returns `true` if the token was well formed but its signature or
    /// algorithm is wrong.
    pub fn is_signature_error(&self) -> bool {
        matches!(self, Self::InvalidSignature | Self::InvalidAlgorithm)
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::InvalidAlgorithm
            }
            ErrorKind::MissingRequiredClaim(claim) if claim == "sub" => Self::MissingSubject,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed,
        }
    }
}

// ============================================================================
// Token service
// ============================================================================

/// Issues and verifies HS256 bearer tokens with a single shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Creates a token service backed by the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] if `secret` is empty.
    pub fn new(secret: &str) -> Result<Self, ConfigError> {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    /// Creates a token service that reads time from `clock`.
    pub fn with_clock(secret: &str, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
        }

        // Only HS256 is accepted. Expiry is checked against our clock with
        // zero leeway, so the library check is turned off.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock,
        })
    }

    /// Signs a token for `user_id` valid for [`TOKEN_TTL_SECS`].
    pub fn issue(&self, user_id: &str, role: Role) -> Result<String, ServerError> {
        let iat = self.clock.now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat,
            exp: iat + TOKEN_TTL_SECS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|err| {
            error!(error = %err, "Failed to sign token");
            ServerError::internal("failed to sign token")
        })
    }

    /// Verifies a token and returns its claims.
    ///
    /// The subject is trimmed; a blank subject is [`TokenError::MissingSubject`].
    /// A token is expired from the second its `exp` is reached.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;

        claims.sub = claims.sub.trim().to_string();
        if claims.sub.is_empty() {
            return Err(TokenError::MissingSubject);
        }

        if self.clock.now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Current time according to the service clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &"HS256")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::*;
    use chrono::TimeZone;

    const SECRET: &str = "unit-test-secret";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn service_at(clock: &ManualClock) -> TokenService {
        TokenService::with_clock(SECRET, Arc::new(clock.clone())).unwrap()
    }

    /// Builds an unsigned-looking token from raw JSON parts.
    fn raw_token(header: &str, payload: &str, signature: &str) -> String {
        format!(
            "{}.{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(header),
            BASE64_URL_SAFE_NO_PAD.encode(payload),
            signature
        )
    }

    #[test]
    fn new_rejects_empty_secret() {
        assert!(matches!(
            TokenService::new(""),
            Err(ConfigError::MissingEnvVar(ref v)) if v == "JWT_SECRET"
        ));
        assert!(TokenService::new("  \n").is_err());
    }

    #[test]
    fn issue_then_verify_round_trips_subject_and_role() {
        let clock = ManualClock::new(start());
        let tokens = service_at(&clock);

        let token = tokens.issue("user-42", Role::Influencer).unwrap();
        let claims = tokens.verify(&token).unwrap();

        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.role, Role::Influencer);
        assert_eq!(claims.iat, start().timestamp());
        assert_eq!(claims.exp, start().timestamp() + TOKEN_TTL_SECS);
    }

    #[test]
    fn token_valid_until_just_before_expiry() {
        let clock = ManualClock::new(start());
        let tokens = service_at(&clock);
        let token = tokens.issue("user-1", Role::Fan).unwrap();

        clock.advance(Duration::hours(24) - Duration::seconds(1));
        assert!(tokens.verify(&token).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(tokens.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn token_expired_after_window() {
        let clock = ManualClock::new(start());
        let tokens = service_at(&clock);
        let token = tokens.issue("user-1", Role::Fan).unwrap();

        clock.advance(Duration::days(3));
        let err = tokens.verify(&token).unwrap_err();
        assert!(err.is_expired());
    }

    #[test]
    fn other_secret_fails_signature() {
        let clock = ManualClock::new(start());
        let issuer = service_at(&clock);
        let verifier = TokenService::with_clock("another-secret", Arc::new(clock.clone())).unwrap();

        let token = issuer.issue("user-1", Role::Fan).unwrap();
        assert_eq!(verifier.verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn tampering_any_byte_invalidates_token() {
        let clock = ManualClock::new(start());
        let tokens = service_at(&clock);
        let token = tokens.issue("user-1", Role::Fan).unwrap();

        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(
                tokens.verify(&tampered).is_err(),
                "tampered byte {i} still verified"
            );
        }
    }

    #[test]
    fn rejects_other_hmac_algorithm() {
        let clock = ManualClock::new(start());
        let tokens = service_at(&clock);
        let claims = Claims {
            sub: "user-1".to_string(),
            role: Role::Fan,
            iat: start().timestamp(),
            exp: start().timestamp() + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = tokens.verify(&token).unwrap_err();
        assert_eq!(err, TokenError::InvalidAlgorithm);
        assert!(err.is_signature_error());
    }

    #[test]
    fn rejects_unsigned_none_algorithm() {
        let clock = ManualClock::new(start());
        let tokens = service_at(&clock);
        let exp = start().timestamp() + 60;
        let token = raw_token(
            r#"{"alg":"none","typ":"JWT"}"#,
            &format!(r#"{{"sub":"user-1","role":"fan","iat":0,"exp":{exp}}}"#),
            "",
        );

        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn rejects_missing_subject() {
        let clock = ManualClock::new(start());
        let tokens = service_at(&clock);
        let claims = serde_json::json!({
            "role": "fan",
            "iat": start().timestamp(),
            "exp": start().timestamp() + 60,
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(tokens.verify(&token), Err(TokenError::MissingSubject));
    }

    #[test]
    fn trims_whitespace_around_subject() {
        let clock = ManualClock::new(start());
        let tokens = service_at(&clock);
        let token = tokens.issue("  user-7 \n", Role::Fan).unwrap();

        assert_eq!(tokens.verify(&token).unwrap().sub, "user-7");
    }

    #[test]
    fn blank_subject_is_missing() {
        let clock = ManualClock::new(start());
        let tokens = service_at(&clock);
        let token = tokens.issue("   ", Role::Fan).unwrap();

        assert_eq!(tokens.verify(&token), Err(TokenError::MissingSubject));
    }

    #[test]
    fn garbage_is_malformed() {
        let tokens = TokenService::new(SECRET).unwrap();
        assert_eq!(tokens.verify("garbage"), Err(TokenError::Malformed));
        assert_eq!(tokens.verify(""), Err(TokenError::Malformed));
    }

    #[test]
    fn debug_does_not_expose_keys() {
        let tokens = TokenService::new(SECRET).unwrap();
        let debug = format!("{tokens:?}");
        assert!(!debug.contains(SECRET));
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(start());
        let other = clock.clone();
        other.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start() + Duration::minutes(5));

        clock.set(start());
        assert_eq!(other.now(), start());
    }
}
