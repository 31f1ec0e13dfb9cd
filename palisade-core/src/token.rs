//! Signed bearer tokens
//!
//! Tokens are compact, tamper-evident JWTs (HS256 over a shared
//! secret) carrying the authenticated subject and its role claims.
//! They are stateless: nothing is persisted at issue time and there is
//! no revocation list — invalidation is exclusively by expiry.
//!
//! Verification deliberately collapses every failure mode (bad
//! signature, structural corruption, expiry) into the single
//! [`TokenError::Invalid`], so a caller probing the verifier learns
//! nothing about which check failed.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{Error, error::TokenError};

/// Claims embedded in an issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the account's username
    pub sub: String,
    /// Role claims, ordered. An absent claim decodes as empty; the
    /// edge applies the baseline role in that case rather than
    /// rejecting.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issued at in seconds (as UTC timestamp)
    pub iat: i64,
    /// Expiration time in seconds (as UTC timestamp)
    pub exp: i64,
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    /// Build claims for `subject` valid from `issued_at` for `ttl`.
    pub fn new(
        subject: impl Into<String>,
        roles: Vec<String>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sub: subject.into(),
            roles,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            iss: None,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.iss = Some(issuer.into());
        self
    }
}

/// Configuration for the token codec.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HS256 shared secret used for both signing and verifying.
    secret: Vec<u8>,
    /// Issuer claim stamped into issued tokens.
    issuer: Option<String>,
}

impl TokenConfig {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            issuer: None,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

/// Signs and verifies bearer tokens against the shared secret.
///
/// Verification is a pure computation: no locking, no I/O, safe to
/// share across tasks.
pub struct TokenCodec {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: TokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(&config.secret);
        let decoding_key = DecodingKey::from_secret(&config.secret);
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is a hard boundary; the default 60s leeway would keep
        // expired tokens verifiable for a minute.
        validation.leeway = 0;
        Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        }
    }

    /// Issue a token for `subject` carrying `roles`, valid for `ttl`
    /// from now.
    pub fn issue(&self, subject: &str, roles: Vec<String>, ttl: Duration) -> Result<String, Error> {
        let mut claims = Claims::new(subject, roles, Utc::now(), ttl);
        if let Some(issuer) = &self.config.issuer {
            claims = claims.with_issuer(issuer.clone());
        }
        self.encode(&claims)
    }

    /// Sign caller-supplied claims.
    pub fn encode(&self, claims: &Claims) -> Result<String, Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "failed to encode token");
            Error::Token(TokenError::Invalid)
        })
    }

    /// Verify a token and return its claims.
    ///
    /// Rejects uniformly on signature mismatch, structural corruption,
    /// and expiry. The underlying cause is logged at debug level and
    /// never typed into the error.
    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token verification failed");
                Error::Token(TokenError::Invalid)
            })
    }
}
