//! License token codec.
//!
//! Issues and verifies the signed tokens handed out on successful activation.
//! Tokens are HS256 JWTs carrying the license key, the hardware id the license
//! is bound to, and issue/expiry timestamps. The codec never consults the
//! license store - liveness beyond the token's own expiry is the heartbeat
//! service's responsibility.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims carried inside a license token.
///
/// # JSON Example
///
/// ```json
/// {
///   "license_key": "A1B2-C3D4-E5F6-A7B8-C9D0",
///   "hwid": "3f786850e387550f...",
///   "iat": 1736700000,
///   "exp": 1739292000
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// License key this token was issued for
    pub license_key: String,

    /// Hardware id authenticated at issuance
    pub hwid: String,

    /// Issue time (seconds since epoch)
    pub iat: i64,

    /// Expiry (seconds since epoch); mirrors the license's `expires_at`
    pub exp: i64,
}

/// Signs and verifies license tokens with a symmetric key.
///
/// The signing algorithm is pinned to HS256 on both sides: a token whose
/// header declares any other algorithm fails verification, which defends
/// against algorithm-substitution attacks.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    /// Create a codec from the shared secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a signed token for an activated license.
    ///
    /// The payload is exactly `{license_key, hwid, iat: now, exp: expires_at}`.
    pub fn issue(
        &self,
        license_key: &str,
        hwid: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = TokenClaims {
            license_key: license_key.to_string(),
            hwid: hwid.to_string(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Verify signature integrity and numeric expiry, returning the claims.
    ///
    /// Rejects tampered tokens, tokens signed with a different key or
    /// algorithm, and tokens whose `exp` has passed (no leeway).
    pub fn verify(&self, token: &str) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Heartbeat tests rely on the expiry boundary being exact
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}
