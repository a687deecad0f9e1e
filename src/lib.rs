//! regflow: email-verified account registration.
//!
//! A new account is only written once the user proves ownership of the
//! address by typing back a short code sent to it. See [`auth`] for the flow.

pub mod auth;
pub mod clock;
pub mod config;
pub mod email;

use anyhow::Context;
use std::sync::Arc;

pub use auth::{AuthError, AuthenticatedUser, RegistrationService};
pub use config::Config;

/// Assemble a [`RegistrationService`] from configuration: SQLite store,
/// PBKDF2 hasher, SMTP (or log) mailer and HMAC session issuer.
pub fn build_service(config: &Config) -> anyhow::Result<RegistrationService> {
    let db_path = config.database_path()?;
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let store = auth::SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let mailer: Arc<dyn email::EmailSender> = match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = smtp.host.as_str(), port = smtp.port, "SMTP email delivery enabled");
            Arc::new(email::SmtpEmailSender::new(smtp)?)
        }
        None => {
            tracing::warn!("No [smtp] configured; verification codes are written to the log");
            Arc::new(email::LogEmailSender)
        }
    };

    let clock: Arc<dyn clock::Clock> = Arc::new(clock::SystemClock);
    let sessions = auth::HmacSessionIssuer::new(
        &config.session.secret,
        config.session.ttl_secs,
        clock.clone(),
    )?;

    Ok(RegistrationService::new(
        Arc::new(store),
        Arc::new(auth::Pbkdf2Hasher::new(config.hashing.rounds)),
        mailer,
        Arc::new(sessions),
    )
    .with_clock(clock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn build_service_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = Some(tmp.path().join("nested").join("regflow.db"));
        config.session.secret = "test-secret".into();
        config.hashing.rounds = 1_000;

        let service = build_service(&config).unwrap();
        let token = service.register("a@x.com", "pw1").unwrap();
        let auth = service.verify_email_token("a@x.com", &token.code).unwrap();
        assert_eq!(auth.user.email, "a@x.com");

        assert!(tmp.path().join("nested").join("regflow.db").exists());
    }

    #[test]
    fn build_service_requires_secret() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = Some(tmp.path().join("regflow.db"));

        assert!(build_service(&config).is_err());
    }
}
