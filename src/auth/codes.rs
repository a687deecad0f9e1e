//! Verification code generation.
//!
//! Codes are 5 characters from `A-Z0-9` (36^5 ≈ 60M combinations), short
//! enough to type from an email. Brute-force resistance relies on the 1-hour
//! token expiry plus rate limiting in front of the service.

use super::error::{AuthError, AuthResult};
use rand::RngCore;

/// Alphabet verification codes are drawn from.
pub const CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Number of characters in a verification code.
pub const CODE_LENGTH: usize = 5;

/// Largest multiple of the alphabet size that fits in a byte; bytes at or
/// above it are rejected so every symbol is equally likely.
const REJECTION_BOUND: u8 = (256 / CODE_ALPHABET.len() * CODE_ALPHABET.len()) as u8;

/// Source of verification codes.
pub trait CodeGenerator: Send + Sync {
    fn generate_code(&self) -> AuthResult<String>;
}

/// Draws codes from the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsCodeGenerator;

impl CodeGenerator for OsCodeGenerator {
    fn generate_code(&self) -> AuthResult<String> {
        generate_code_with(&mut rand::rngs::OsRng)
    }
}

/// Generate a code from any fallible RNG. Entropy failure is returned, not retried.
pub fn generate_code_with<R: RngCore + ?Sized>(rng: &mut R) -> AuthResult<String> {
    let mut code = String::with_capacity(CODE_LENGTH);
    let mut buf = [0u8; 16];

    while code.len() < CODE_LENGTH {
        rng.try_fill_bytes(&mut buf)
            .map_err(AuthError::GenerationFailure)?;
        for &b in &buf {
            if b >= REJECTION_BOUND {
                continue;
            }
            code.push(CODE_ALPHABET[usize::from(b) % CODE_ALPHABET.len()] as char);
            if code.len() == CODE_LENGTH {
                break;
            }
        }
    }

    Ok(code)
}

/// Whether `text` has the shape of a verification code.
pub fn looks_like_code(text: &str) -> bool {
    text.len() == CODE_LENGTH && text.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// RNG whose every read fails.
    struct DeadRng;

    impl RngCore for DeadRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, _dest: &mut [u8]) {}
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::other("entropy exhausted")))
        }
    }

    /// RNG that only ever yields bytes from the rejected range, then a fixed byte.
    struct ScriptedRng {
        calls: usize,
    }

    impl RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            let byte = if self.calls == 0 { 255 } else { 1 };
            self.calls += 1;
            dest.fill(byte);
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn code_has_expected_shape() {
        for _ in 0..200 {
            let code = OsCodeGenerator.generate_code().unwrap();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(looks_like_code(&code), "unexpected code {code}");
        }
    }

    #[test]
    fn entropy_failure_is_generation_failure() {
        let err = generate_code_with(&mut DeadRng).unwrap_err();
        assert!(matches!(err, AuthError::GenerationFailure(_)));
    }

    #[test]
    fn biased_bytes_are_rejected() {
        let mut rng = ScriptedRng { calls: 0 };
        let code = generate_code_with(&mut rng).unwrap();
        // First buffer (all 255) is discarded entirely
        assert_eq!(code, "BBBBB");
        assert_eq!(rng.calls, 2);
    }

    #[test]
    fn rejection_bound_is_multiple_of_alphabet() {
        assert_eq!(REJECTION_BOUND, 252);
        assert_eq!(usize::from(REJECTION_BOUND) % CODE_ALPHABET.len(), 0);
    }

    #[test]
    fn all_symbols_appear() {
        let mut seen: HashMap<char, usize> = HashMap::new();
        for _ in 0..2_000 {
            for c in OsCodeGenerator.generate_code().unwrap().chars() {
                *seen.entry(c).or_default() += 1;
            }
        }
        assert_eq!(seen.len(), CODE_ALPHABET.len());
    }

    #[test]
    fn looks_like_code_rejects_lowercase_and_length() {
        assert!(looks_like_code("AB12C"));
        assert!(!looks_like_code("ab12c"));
        assert!(!looks_like_code("AB12"));
        assert!(!looks_like_code("AB12CD"));
    }
}
