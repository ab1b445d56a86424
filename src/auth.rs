//! Capability-token signing and validation.
//!
//! A token is three URL parameters: `ts` (issue time, epoch millis), `nonce`
//! (opaque), and `sig` = hex(HMAC-SHA256(secret, "{ts}.{nonce}")). The relay
//! validates once, at connection time, with no network round-trip. There is
//! no nonce cache: replaying a captured URL inside the TTL window is
//! accepted, a documented residual risk kept small by the short TTL.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Why an upgrade request was refused. Safe to log; never carries the secret
/// or the presented signature.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("missing required parameter `{0}`")]
    MissingParam(&'static str),
    #[error("timestamp is not an integer")]
    BadTimestamp,
    #[error("token outside TTL window (skew {skew_ms}ms, ttl {ttl_ms}ms)")]
    Expired { skew_ms: u64, ttl_ms: u64 },
    #[error("signature mismatch")]
    BadSignature,
}

/// A freshly minted token, ready to be embedded in a connection URL.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub ts: u64,
    pub nonce: String,
    pub sig: String,
    pub expires_at: u64,
}

/// Mints and verifies capability tokens against one shared secret.
///
/// The secret is loaded once at startup and only ever read, so a single
/// signer is shared across all sessions without synchronization.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_ms: u64,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_ms: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_ms,
        }
    }

    /// Hex HMAC over the canonical "{ts}.{nonce}" payload.
    pub fn signature(&self, ts: u64, nonce: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{ts}.{nonce}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Issue a token valid from now until now + TTL.
    pub fn mint(&self) -> MintedToken {
        let ts = now_millis();
        let nonce = uuid::Uuid::new_v4().to_string();
        let sig = self.signature(ts, &nonce);
        MintedToken {
            ts,
            nonce,
            sig,
            expires_at: ts + self.ttl_ms,
        }
    }

    /// Validate the raw query parameters of an upgrade request at time
    /// `now_ms`.
    ///
    /// Every malformed input (missing parameter, non-numeric timestamp,
    /// bad hex, wrong digest length) is a rejection, never a panic. The
    /// signature comparison is constant-time.
    pub fn verify(
        &self,
        ts: Option<&str>,
        nonce: Option<&str>,
        sig: Option<&str>,
        now_ms: u64,
    ) -> Result<(), TokenError> {
        let ts = ts.ok_or(TokenError::MissingParam("ts"))?;
        let nonce = nonce.ok_or(TokenError::MissingParam("nonce"))?;
        let sig = sig.ok_or(TokenError::MissingParam("sig"))?;

        let ts: u64 = ts.parse().map_err(|_| TokenError::BadTimestamp)?;
        let skew_ms = now_ms.abs_diff(ts);
        if skew_ms > self.ttl_ms {
            return Err(TokenError::Expired {
                skew_ms,
                ttl_ms: self.ttl_ms,
            });
        }

        // Compare the hex encodings byte-wise. ct_eq over slices of unequal
        // length yields false without short-circuiting, so malformed or
        // truncated signatures fall out as plain mismatches.
        let expected = self.signature(ts, nonce);
        if bool::from(expected.as_bytes().ct_eq(sig.as_bytes())) {
            Ok(())
        } else {
            Err(TokenError::BadSignature)
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
