//! SMTP delivery via `lettre`.

use super::{verification_body, EmailSender, VERIFICATION_SUBJECT};
use anyhow::Context;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};

/// Port for implicit-TLS submission; anything else negotiates STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

fn default_smtp_port() -> u16 {
    587
}

/// SMTP relay settings (`[smtp]` in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Sender address; defaults to `user`.
    #[serde(default)]
    pub from: Option<String>,
}

/// Sends verification emails through an authenticated SMTP relay.
pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Build the sender. No connection is made until the first send.
    pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let from_addr = settings.from.as_deref().unwrap_or(&settings.user);
        let from: Mailbox = from_addr
            .parse()
            .with_context(|| format!("Invalid sender address '{from_addr}'"))?;

        let builder = if settings.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&settings.host)
        } else {
            SmtpTransport::starttls_relay(&settings.host)
        }
        .with_context(|| format!("Invalid SMTP host '{}'", settings.host))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, to: &str, code: &str) -> anyhow::Result<Message> {
        let to: Mailbox = to
            .parse()
            .with_context(|| format!("Invalid recipient address '{to}'"))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(VERIFICATION_SUBJECT)
            .header(ContentType::TEXT_HTML)
            .body(verification_body(code))?;
        Ok(message)
    }
}

impl EmailSender for SmtpEmailSender {
    fn send_verification_email(&self, to: &str, code: &str) -> anyhow::Result<()> {
        let message = self.build_message(to, code)?;
        self.transport
            .send(&message)
            .with_context(|| format!("Failed to send verification email to {to}"))?;
        tracing::debug!(to = to, "Verification email handed to SMTP relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".into(),
            port: 587,
            user: "noreply@example.com".into(),
            password: "secret".into(),
            from: None,
        }
    }

    #[test]
    fn message_has_subject_recipient_and_code() {
        let sender = SmtpEmailSender::new(&settings()).unwrap();
        let message = sender.build_message("a@x.com", "AB12C").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Verification Code"));
        assert!(raw.contains("To: a@x.com"));
        assert!(raw.contains("From: noreply@example.com"));
        assert!(raw.contains("AB12C"));
    }

    #[test]
    fn explicit_from_overrides_user() {
        let mut s = settings();
        s.from = Some("Signup <signup@example.com>".into());
        let sender = SmtpEmailSender::new(&s).unwrap();
        let raw = String::from_utf8(sender.build_message("a@x.com", "AB12C").unwrap().formatted())
            .unwrap();
        assert!(raw.contains("signup@example.com"));
    }

    #[test]
    fn invalid_recipient_is_error() {
        let sender = SmtpEmailSender::new(&settings()).unwrap();
        let err = sender.build_message("not an address", "AB12C").unwrap_err();
        assert!(err.to_string().contains("Invalid recipient"));
    }

    #[test]
    fn invalid_sender_is_error() {
        let mut s = settings();
        s.user = "nope".into();
        assert!(SmtpEmailSender::new(&s).is_err());
    }

    #[test]
    fn port_defaults_to_submission() {
        let parsed: SmtpSettings =
            toml::from_str("host = \"smtp.example.com\"\nuser = \"u@example.com\"").unwrap();
        assert_eq!(parsed.port, 587);
        assert!(parsed.from.is_none());
    }
}
