//! Signed session credentials.
//!
//! Tokens use the compact JWT layout `header.claims.signature`: each segment
//! is unpadded base64url, the signature is HMAC-SHA256 over
//! `header.claims` with the server secret. Validation is stateless.

use super::store::User;
use crate::clock::Clock;
use anyhow::{bail, Context};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Default session lifetime: 24 hours (seconds).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 3600;

const ALGORITHM: &str = "HS256";

/// Mints a signed session credential for a committed user.
pub trait SessionIssuer: Send + Sync {
    fn issue(&self, user: &User) -> anyhow::Result<String>;
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User ID.
    pub sub: i64,
    pub email: String,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session token is malformed")]
    Malformed,
    #[error("unsupported session algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("session signature mismatch")]
    BadSignature,
    #[error("session has expired")]
    Expired,
}

/// HMAC-SHA256 session issuer and validator.
pub struct HmacSessionIssuer {
    /// MAC keyed with the server secret; cloned per token.
    mac: HmacSha256,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl HmacSessionIssuer {
    pub fn new(secret: &str, ttl_secs: u64, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        if secret.is_empty() {
            bail!("Session secret cannot be empty");
        }
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .context("Session TTL out of range")?;
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid session secret: {e}"))?;
        Ok(Self { mac, ttl, clock })
    }

    /// Check signature and expiry, returning the claims.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::Malformed);
        };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(SessionError::UnsupportedAlgorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| SessionError::Malformed)?;
        let mut mac = self.mac.clone();
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let claims: SessionClaims = decode_segment(claims_b64)?;
        if claims.exp <= self.clock.now().timestamp() {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }
}

impl SessionIssuer for HmacSessionIssuer {
    fn issue(&self, user: &User) -> anyhow::Result<String> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .context("Session expiry out of range")?;
        let claims = SessionClaims {
            sub: user.id,
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };

        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, SessionError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| SessionError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| SessionError::Malformed)
}
