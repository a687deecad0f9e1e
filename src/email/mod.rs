//! Outbound verification email.
//!
//! Delivery is best-effort from the registration flow's point of view: a
//! failed send is logged by the caller and never rolls back a registration.

pub mod smtp;

pub use smtp::{SmtpEmailSender, SmtpSettings};

/// Delivers verification codes to email addresses.
pub trait EmailSender: Send + Sync {
    fn send_verification_email(&self, to: &str, code: &str) -> anyhow::Result<()>;
}

/// Development sender: records the delivery in the log instead of mailing it.
///
/// The code itself is logged so a local operator can complete signup without
/// an SMTP relay. Never use this in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send_verification_email(&self, to: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!(to = to, code = code, "Verification email (log delivery)");
        Ok(())
    }
}

/// Subject line of the verification email.
pub const VERIFICATION_SUBJECT: &str = "Verification Code";

/// HTML body of the verification email.
pub fn verification_body(code: &str) -> String {
    format!(
        "<html>
<head><title>{VERIFICATION_SUBJECT}</title></head>
<body>
<p>Hi there,</p>
<p>Please use the verification code below:</p>
<h3>{code}</h3>
<p>This code will expire in 60 minutes.</p>
<p>Thanks</p>
</body>
</html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_contains_code_and_expiry() {
        let body = verification_body("AB12C");
        assert!(body.contains("<h3>AB12C</h3>"));
        assert!(body.contains("60 minutes"));
    }

    #[test]
    fn log_sender_never_fails() {
        LogEmailSender
            .send_verification_email("a@x.com", "AB12C")
            .unwrap();
    }
}
