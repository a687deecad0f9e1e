//! Runtime configuration (`~/.regflow/config.toml` + `REGFLOW_*` overrides).

use crate::auth::hasher::DEFAULT_HASH_ROUNDS;
use crate::auth::session::DEFAULT_SESSION_TTL_SECS;
use crate::email::SmtpSettings;
use anyhow::{bail, Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = ".regflow";
const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_DB_FILE_NAME: &str = "regflow.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub hashing: HashingConfig,
    /// Absent → verification codes go to the log instead of email.
    pub smtp: Option<SmtpSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `~/.regflow/regflow.db`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HMAC key for session tokens. Required.
    pub secret: String,
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// PBKDF2 round count.
    pub rounds: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_HASH_ROUNDS,
        }
    }
}

impl Config {
    /// `~/.regflow`
    pub fn default_dir() -> Result<PathBuf> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(CONFIG_DIR_NAME))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `~/.regflow/config.toml` is
    /// used when present and defaults otherwise. Environment overrides are
    /// applied last, then the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Self::default_dir()?.join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    tracing::debug!(path = %default_path.display(), "No config file, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Apply `REGFLOW_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("REGFLOW_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(secret) = lookup("REGFLOW_SESSION_SECRET") {
            self.session.secret = secret;
        }

        if let Some(host) = lookup("REGFLOW_SMTP_HOST") {
            let smtp = self.smtp.get_or_insert_with(|| SmtpSettings {
                host: String::new(),
                port: 587,
                user: String::new(),
                password: String::new(),
                from: None,
            });
            smtp.host = host;
        }
        if let Some(smtp) = self.smtp.as_mut() {
            if let Some(port) = lookup("REGFLOW_SMTP_PORT") {
                smtp.port = port
                    .parse()
                    .with_context(|| format!("Invalid REGFLOW_SMTP_PORT '{port}'"))?;
            }
            if let Some(user) = lookup("REGFLOW_SMTP_USER") {
                smtp.user = user;
            }
            if let Some(password) = lookup("REGFLOW_SMTP_PASSWORD") {
                smtp.password = password;
            }
            if let Some(from) = lookup("REGFLOW_SMTP_FROM") {
                smtp.from = Some(from);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.secret.trim().is_empty() {
            bail!("session.secret is empty (set it in config.toml or REGFLOW_SESSION_SECRET)");
        }
        if self.session.ttl_secs == 0 {
            bail!("session.ttl_secs must be greater than zero");
        }
        if self.hashing.rounds == 0 {
            bail!("hashing.rounds must be greater than zero");
        }
        if let Some(smtp) = &self.smtp {
            if smtp.host.trim().is_empty() {
                bail!("smtp.host is empty");
            }
            if smtp.user.trim().is_empty() {
                bail!("smtp.user is empty");
            }
        }
        Ok(())
    }

    /// Resolved SQLite path.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(p) => Ok(p.clone()),
            None => Ok(Self::default_dir()?.join(DEFAULT_DB_FILE_NAME)),
        }
    }
}
