//! HS256 signed tokens keyed by `JWT_SECRET`.

use chrono::Utc;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token secret must be at least {} bytes", MIN_SECRET_LEN)]
    WeakSecret,

    #[error("Malformed token: {0}")]
    Malformed(#[source] JwtError),

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token claims: {0}")]
    Claims(#[source] JwtError),

    #[error("Token error: {0}")]
    Jwt(#[source] JwtError),
}

impl From<JwtError> for TokenError {
    fn from(err: JwtError) -> Self {
        let kind = err.kind();
        if matches!(kind, ErrorKind::InvalidSignature) {
            TokenError::InvalidSignature
        } else if matches!(kind, ErrorKind::ExpiredSignature) {
            TokenError::Expired
        } else if matches!(kind, ErrorKind::InvalidAlgorithm) {
            TokenError::UnsupportedAlgorithm(err.to_string())
        } else if matches!(
            kind,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_)
        ) {
            TokenError::Malformed(err)
        } else if matches!(kind, ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_)) {
            TokenError::Claims(err)
        } else {
            TokenError::Jwt(err)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// A TTL too large for a timestamp saturates at `i64::MAX`.
    pub fn new(sub: impl Into<String>, ttl: Duration) -> Self {
        let iat = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            sub: sub.into(),
            iat,
            exp: iat.saturating_add(ttl),
        }
    }
}

#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    /// Requires an `exp` claim and rejects any algorithm other than HS256.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        // A header that does not parse is a malformed token, not bad claims.
        let header = jsonwebtoken::decode_header(token).map_err(TokenError::Malformed)?;
        if header.alg != Algorithm::HS256 {
            return Err(TokenError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let validation = Validation::new(Algorithm::HS256);
        Ok(decode::<T>(token, &self.decoding, &validation)?.claims)
    }
}
