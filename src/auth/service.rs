//! Two-phase registration: register an email, then verify the emailed code.
//!
//! ## Flow
//!
//! 1. `register(email, password)` hashes the password, caches the hash under
//!    [`cache_key`]`(email)`, persists a verification token (1-hour expiry)
//!    and emails the code. Email failure is logged, not returned.
//! 2. `verify_email_token(email, code)` loads the latest token for the email,
//!    checks the code and expiry, commits the user with the cached hash,
//!    removes the token row and the cache entry, then issues a session.
//!
//! ## Repeated registration
//! Registering the same email again overwrites the cached hash and adds a new
//! token row. Verification always reads the newest row, so only the latest
//! code (and therefore the latest password) can be redeemed.
//!
//! ## Concurrency
//! Two concurrent `register` calls for one email may leave the newest token
//! row and the surviving cache entry from different calls. The pair is not
//! written atomically.

use super::cache::{cache_key, PendingCredentialCache};
use super::codes::{CodeGenerator, OsCodeGenerator};
use super::error::{AuthError, AuthResult};
use super::hasher::CredentialHasher;
use super::session::SessionIssuer;
use super::store::{NewVerificationToken, RegistrationStore, StoreError, User, VerificationToken};
use crate::clock::{Clock, SystemClock};
use crate::email::EmailSender;
use chrono::Duration;
use std::sync::Arc;

/// Lifetime of a verification token: 1 hour.
pub const VERIFICATION_TOKEN_TTL_SECS: i64 = 3600;

/// A user together with a freshly issued session credential.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub session_token: String,
}

/// Orchestrates registration, verification and login.
///
/// Owns its pending-credential cache: separate instances never share
/// pending registrations.
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    hasher: Arc<dyn CredentialHasher>,
    mailer: Arc<dyn EmailSender>,
    sessions: Arc<dyn SessionIssuer>,
    codes: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    pending: PendingCredentialCache,
}

impl RegistrationService {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        hasher: Arc<dyn CredentialHasher>,
        mailer: Arc<dyn EmailSender>,
        sessions: Arc<dyn SessionIssuer>,
    ) -> Self {
        Self {
            store,
            hasher,
            mailer,
            sessions,
            codes: Arc::new(OsCodeGenerator),
            clock: Arc::new(SystemClock),
            pending: PendingCredentialCache::new(),
        }
    }

    /// Replace the verification code source.
    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    /// Replace the time source used for token expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // ── Registration ────────────────────────────────────────────────

    /// Start a registration. Returns the persisted token (its code has
    /// also been handed to the email sender).
    pub fn register(&self, email: &str, password: &str) -> AuthResult<VerificationToken> {
        // Nothing is written until both of these succeed
        let password_hash = self.hasher.hash(password)?;
        let code = self.codes.generate_code()?;

        let key = cache_key(email);
        self.pending.put(&key, &password_hash);

        let expires_at = self.clock.now() + Duration::seconds(VERIFICATION_TOKEN_TTL_SECS);
        let token = self
            .store
            .create_verification_token(&NewVerificationToken {
                email: email.to_string(),
                code,
                cache_key: key,
                expires_at,
            })
            .map_err(|e| AuthError::storage("create_verification_token", email, e))?;

        tracing::info!(
            email = email,
            token_id = token.id.as_str(),
            "Pending registration created (expires in {}s)",
            VERIFICATION_TOKEN_TTL_SECS
        );

        if let Err(e) = self.mailer.send_verification_email(email, &token.code) {
            tracing::warn!(email = email, "Failed to send verification email: {e:#}");
        }

        Ok(token)
    }

    /// Redeem a verification code, committing the account.
    pub fn verify_email_token(&self, email: &str, code: &str) -> AuthResult<AuthenticatedUser> {
        let token = match self.store.get_verification_token_by_email(email) {
            Ok(t) => t,
            Err(StoreError::NotFound) => return Err(AuthError::TokenNotFound(email.to_string())),
            Err(e) => return Err(AuthError::storage("get_verification_token", email, e)),
        };

        // Exact, case-sensitive match
        if code != token.code {
            tracing::warn!(email = email, token_id = token.id.as_str(), "Verification code mismatch");
            return Err(AuthError::InvalidToken);
        }

        let key = cache_key(email);

        if self.clock.now() >= token.expires_at {
            // The row stays; only a new registration can replace it
            self.pending.delete(&key);
            tracing::warn!(email = email, token_id = token.id.as_str(), "Verification token expired");
            return Err(AuthError::TokenExpired);
        }

        let Some(password_hash) = self.pending.get(&key) else {
            tracing::warn!(email = email, "Pending credential missing for valid token");
            return Err(AuthError::CredentialCacheMiss(email.to_string()));
        };

        let user = match self.store.create_user(email, &password_hash) {
            Ok(u) => u,
            Err(StoreError::Conflict) => return Err(AuthError::UserAlreadyExists(email.to_string())),
            Err(e) => return Err(AuthError::storage("create_user", email, e)),
        };

        // Row before cache: a crash in between leaves only a harmless stale row
        let removed = self
            .store
            .delete_verification_token_by_id(&token.id)
            .map_err(|e| AuthError::storage("delete_verification_token", email, e))?;
        if !removed {
            tracing::debug!(token_id = token.id.as_str(), "Verification token already removed");
        }
        self.pending.delete(&key);

        tracing::info!(email = email, user_id = user.id, "Account committed after email verification");

        let session_token = self.sessions.issue(&user).map_err(AuthError::SessionFailure)?;
        Ok(AuthenticatedUser {
            user,
            session_token,
        })
    }

    /// Whether a pending credential is cached for `email`.
    pub fn has_pending(&self, email: &str) -> bool {
        self.pending.contains(&cache_key(email))
    }

    // ── Accounts ────────────────────────────────────────────────────

    /// Authenticate an existing user by email + password.
    pub fn login(&self, email: &str, password: &str) -> AuthResult<AuthenticatedUser> {
        let user = match self.store.get_user_by_email(email) {
            Ok(u) => u,
            Err(StoreError::NotFound) => {
                // Dummy hash to keep timing close to the found-user path
                let _ = self.hasher.hash(password);
                return Err(AuthError::UserNotFound(email.to_string()));
            }
            Err(e) => return Err(AuthError::storage("get_user_by_email", email, e)),
        };

        self.hasher.verify(&user.password_hash, password)?;

        let session_token = self.sessions.issue(&user).map_err(AuthError::SessionFailure)?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok(AuthenticatedUser {
            user,
            session_token,
        })
    }

    /// Create a user directly, skipping email verification (administrative path).
    pub fn create_user(&self, email: &str, password: &str) -> AuthResult<User> {
        let password_hash = self.hasher.hash(password)?;
        let user = match self.store.create_user(email, &password_hash) {
            Ok(u) => u,
            Err(StoreError::Conflict) => return Err(AuthError::UserAlreadyExists(email.to_string())),
            Err(e) => return Err(AuthError::storage("create_user", email, e)),
        };
        tracing::info!(email = email, user_id = user.id, "User created directly");
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> AuthResult<User> {
        match self.store.get_user_by_email(email) {
            Ok(u) => Ok(u),
            Err(StoreError::NotFound) => Err(AuthError::UserNotFound(email.to_string())),
            Err(e) => Err(AuthError::storage("get_user_by_email", email, e)),
        }
    }

    pub fn list_users(&self) -> AuthResult<Vec<User>> {
        self.store
            .list_users()
            .map_err(|e| AuthError::storage("list_users", "*", e))
    }
}

/// Trim surrounding whitespace and lowercase ASCII letters.
///
/// The service hashes emails exactly as given, so callers should pass every
/// address through this (or their own normalization) first.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

// ── Tests ───────────────────────────────────────────────────────────
