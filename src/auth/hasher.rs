//! Password hashing.
//!
//! PBKDF2-HMAC-SHA256 with a random per-password salt, encoded as a PHC
//! string (`$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`). The round count
//! is embedded in the string, so raising the cost later keeps old hashes
//! verifiable.

use super::error::{AuthError, AuthResult};
use pbkdf2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};
use rand::RngCore;

/// Default PBKDF2 round count.
pub const DEFAULT_HASH_ROUNDS: u32 = 100_000;

/// Salt byte length.
const SALT_BYTES: usize = 16;

/// Derived key length in bytes.
const OUTPUT_BYTES: usize = 32;

/// One-way password hashing used by the registration flow.
pub trait CredentialHasher: Send + Sync {
    /// Hash a plaintext password for storage.
    fn hash(&self, password: &str) -> AuthResult<String>;

    /// Check `password` against a stored hash.
    ///
    /// A mismatch is [`AuthError::InvalidCredential`]; only a malformed
    /// stored hash produces [`AuthError::HashingFailure`].
    fn verify(&self, hash: &str, password: &str) -> AuthResult<()>;
}

/// PBKDF2 hasher with a fixed cost.
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    rounds: u32,
}

impl Pbkdf2Hasher {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_ROUNDS)
    }
}

impl CredentialHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_BYTES];
        rand::rngs::OsRng
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|e| AuthError::HashingFailure(format!("salt generation: {e}")))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(hashing_failure)?;

        let params = Params {
            rounds: self.rounds,
            output_length: OUTPUT_BYTES,
        };
        let hash = Pbkdf2
            .hash_password_customized(password.as_bytes(), None, None, params, salt.as_salt())
            .map_err(hashing_failure)?;
        Ok(hash.to_string())
    }

    fn verify(&self, hash: &str, password: &str) -> AuthResult<()> {
        let parsed = PasswordHash::new(hash).map_err(hashing_failure)?;
        match Pbkdf2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(password_hash::Error::Password) => Err(AuthError::InvalidCredential),
            Err(e) => Err(hashing_failure(e)),
        }
    }
}

fn hashing_failure(err: password_hash::Error) -> AuthError {
    AuthError::HashingFailure(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low cost keeps the suite fast; production uses DEFAULT_HASH_ROUNDS.
    fn hasher() -> Pbkdf2Hasher {
        Pbkdf2Hasher::new(1_000)
    }

    #[test]
    fn hash_then_verify() {
        let h = hasher();
        let stored = h.hash("correct horse").unwrap();
        assert!(stored.starts_with("$pbkdf2-sha256$"));
        h.verify(&stored, "correct horse").unwrap();
    }

    #[test]
    fn wrong_password_is_invalid_credential() {
        let h = hasher();
        let stored = h.hash("correct horse").unwrap();
        let err = h.verify(&stored, "battery staple").unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential));
    }

    #[test]
    fn malformed_hash_is_hashing_failure() {
        let err = hasher().verify("not-a-phc-string", "pw").unwrap_err();
        assert!(matches!(err, AuthError::HashingFailure(_)));
    }

    #[test]
    fn same_password_gets_different_salts() {
        let h = hasher();
        let a = h.hash("pw").unwrap();
        let b = h.hash("pw").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn cost_is_embedded_in_hash() {
        let stored = hasher().hash("pw").unwrap();
        assert!(stored.contains("i=1000"));

        // A hasher configured with another cost still verifies old hashes
        Pbkdf2Hasher::new(2_000).verify(&stored, "pw").unwrap();
    }
}
