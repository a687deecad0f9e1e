//! Email-verified account registration.
//!
//! Provides:
//! - Two-phase signup: `register` caches a PBKDF2 password hash in memory and
//!   persists a 5-character verification code; `verify_email_token` commits
//!   the user only once the emailed code comes back
//! - Login against committed accounts
//! - HMAC-SHA256 signed session credentials
//! - SQLite-backed persistent storage
//!
//! ## Design Decisions
//! - Pending password hashes never touch disk. They live in a cache owned by
//!   each [`RegistrationService`], so a restart invalidates unverified signups.
//! - Every collaborator (store, hasher, code source, mailer, session issuer,
//!   clock) is a trait object injected at construction.
//! - Email delivery is best-effort: registration state is consistent in the
//!   store whether or not the email went out.

pub mod cache;
pub mod codes;
pub mod error;
pub mod hasher;
pub mod service;
pub mod session;
pub mod store;

pub use cache::{cache_key, PendingCredentialCache};
pub use codes::{CodeGenerator, OsCodeGenerator};
pub use error::{AuthError, AuthResult};
pub use hasher::{CredentialHasher, Pbkdf2Hasher};
pub use service::{normalize_email, AuthenticatedUser, RegistrationService};
pub use session::{HmacSessionIssuer, SessionClaims, SessionError, SessionIssuer};
pub use store::{
    NewVerificationToken, RegistrationStore, SqliteStore, StoreError, User, VerificationToken,
};
