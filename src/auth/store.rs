//! Persistence contract for registration, plus the SQLite-backed store.
//!
//! Tables:
//! - `users`: id, email, password_hash, created_at, updated_at
//! - `verification_tokens`: id, email, code, cache_key, created_at, expires_at
//!
//! User timestamps are Unix seconds. Token timestamps are Unix nanoseconds so
//! an expiry computed from the clock survives storage unchanged.
//!
//! The registration core only depends on [`RegistrationStore`]; [`SqliteStore`]
//! is the implementation shipped with the crate.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;

/// Busy timeout for the file-backed store (milliseconds).
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// A committed account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted verification code awaiting redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationToken {
    pub id: String,
    pub email: String,
    /// The code the user must type back.
    pub code: String,
    /// Key of the pending password hash in the credential cache.
    pub cache_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Parameters for inserting a verification token.
#[derive(Debug, Clone)]
pub struct NewVerificationToken {
    pub email: String,
    pub code: String,
    pub cache_key: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    /// A uniqueness constraint rejected the write.
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable storage consumed by the registration flow.
///
/// Calls may block; they are bounded by the backend's own timeout.
pub trait RegistrationStore: Send + Sync {
    /// Insert a user row. Duplicate email → [`StoreError::Conflict`].
    fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User>;

    fn get_user_by_email(&self, email: &str) -> StoreResult<User>;

    fn get_user_by_id(&self, id: i64) -> StoreResult<User>;

    fn list_users(&self) -> StoreResult<Vec<User>>;

    fn create_verification_token(&self, new: &NewVerificationToken)
        -> StoreResult<VerificationToken>;

    /// The most recently created token row for `email`.
    fn get_verification_token_by_email(&self, email: &str) -> StoreResult<VerificationToken>;

    /// Delete a token row. Returns whether a row was removed.
    fn delete_verification_token_by_id(&self, id: &str) -> StoreResult<bool>;
}

/// SQLite-backed registration store.
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
        ))?;
        Self::init_tables(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (tests, one-shot tools).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_tables(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS verification_tokens (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                code TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_verification_tokens_email
                ON verification_tokens(email);",
        )
    }
}

impl RegistrationStore for SqliteStore {
    fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![email, password_hash, now],
        )
        .map_err(map_sqlite_err)?;

        Ok(User {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: from_epoch(now),
            updated_at: from_epoch(now),
        })
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, email, password_hash, created_at, updated_at
             FROM users WHERE email = ?1",
            rusqlite::params![email],
            user_from_row,
        )
        .map_err(map_sqlite_err)
    }

    fn get_user_by_id(&self, id: i64) -> StoreResult<User> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, email, password_hash, created_at, updated_at
             FROM users WHERE id = ?1",
            rusqlite::params![id],
            user_from_row,
        )
        .map_err(map_sqlite_err)
    }

    fn list_users(&self) -> StoreResult<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, email, password_hash, created_at, updated_at
                 FROM users ORDER BY id ASC",
            )
            .map_err(map_sqlite_err)?;
        let users = stmt
            .query_map([], user_from_row)
            .map_err(map_sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        Ok(users)
    }

    fn create_verification_token(
        &self,
        new: &NewVerificationToken,
    ) -> StoreResult<VerificationToken> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let created_nanos = to_epoch_nanos(created_at)?;
        let expires_nanos = to_epoch_nanos(new.expires_at)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO verification_tokens (id, email, code, cache_key, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                id,
                new.email,
                new.code,
                new.cache_key,
                created_nanos,
                expires_nanos,
            ],
        )
        .map_err(map_sqlite_err)?;

        Ok(VerificationToken {
            id,
            email: new.email.clone(),
            code: new.code.clone(),
            cache_key: new.cache_key.clone(),
            created_at: DateTime::from_timestamp_nanos(created_nanos),
            expires_at: DateTime::from_timestamp_nanos(expires_nanos),
        })
    }

    fn get_verification_token_by_email(&self, email: &str) -> StoreResult<VerificationToken> {
        let conn = self.conn.lock();
        // Newest insert wins. rowid only grows among live rows, unlike the
        // wall clock behind created_at.
        conn.query_row(
            "SELECT id, email, code, cache_key, created_at, expires_at
             FROM verification_tokens
             WHERE email = ?1
             ORDER BY rowid DESC
             LIMIT 1",
            rusqlite::params![email],
            |row| {
                Ok(VerificationToken {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    code: row.get(2)?,
                    cache_key: row.get(3)?,
                    created_at: DateTime::from_timestamp_nanos(row.get(4)?),
                    expires_at: DateTime::from_timestamp_nanos(row.get(5)?),
                })
            },
        )
        .map_err(map_sqlite_err)
    }

    fn delete_verification_token_by_id(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute(
                "DELETE FROM verification_tokens WHERE id = ?1",
                rusqlite::params![id],
            )
            .map_err(map_sqlite_err)?;
        Ok(deleted > 0)
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: from_epoch(row.get(3)?),
        updated_at: from_epoch(row.get(4)?),
    })
}

fn map_sqlite_err(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            StoreError::Conflict
        }
        e => StoreError::Other(e.into()),
    }
}

/// Unix seconds → UTC timestamp (out-of-range values clamp to the epoch).
fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// UTC timestamp → Unix nanoseconds. Fails past the year 2262.
fn to_epoch_nanos(ts: DateTime<Utc>) -> StoreResult<i64> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| StoreError::Other(anyhow::anyhow!("timestamp {ts} out of range")))
}

// ── Tests ───────────────────────────────────────────────────────────
