//! Outbound mail abstraction and the messages the auth flows send.
//!
//! The sender decides how to deliver and returns `Ok`/`Err`. `SmtpEmailSender`
//! submits over SMTP with STARTTLS. Without a configured relay the server falls back
//! to `LogEmailSender`, which logs the recipient and subject and returns `Ok(())`.
//! Message bodies carry one-time secrets, so they are never logged.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, time::Duration};
use tracing::{debug, info};

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

impl fmt::Debug for EmailMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailMessage")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Email delivery abstraction used by activation and password reset.
#[async_trait]
pub trait EmailSender: fmt::Debug + Send + Sync {
    /// Deliver a message or return an error.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// SMTP submission with STARTTLS, authenticating as the sender address.
#[derive(Clone)]
pub struct SmtpEmailSender {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl fmt::Debug for SmtpEmailSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpEmailSender")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpEmailSender {
    /// Build a sender for `host:port`. No connection is made until the first send.
    ///
    /// # Errors
    /// Returns an error if `address` is not a valid mailbox or the relay host is
    /// rejected.
    pub fn new(host: &str, port: u16, address: &str, password: &SecretString) -> Result<Self> {
        let from: Mailbox = address
            .parse()
            .with_context(|| format!("Invalid sender address: {address}"))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .with_context(|| format!("Invalid mail host: {host}"))?
            .port(port)
            .timeout(Some(SMTP_TIMEOUT))
            .credentials(Credentials::new(
                address.to_string(),
                password.expose_secret().to_string(),
            ))
            .build();
        Ok(Self { from, transport })
    }

    fn build(&self, message: &EmailMessage) -> Result<Message> {
        let to: Mailbox = message
            .to
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", message.to))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .context("Failed to build email")
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .context("SMTP delivery failed")?;
        debug!(to_email = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

pub const ACTIVATION_SUBJECT: &str = "Confirm your email";
pub const PASSWORD_RESET_SUBJECT: &str = "Reset your password";

#[must_use]
pub fn activation_email(to: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: ACTIVATION_SUBJECT.to_string(),
        html_body: render(
            "Confirm your email",
            "Thanks for signing up. Confirm your email address to activate your account.",
            "Activate account",
            link,
        ),
    }
}

#[must_use]
pub fn password_reset_email(to: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: PASSWORD_RESET_SUBJECT.to_string(),
        html_body: render(
            "Reset your password",
            "We received a request to reset your password. The link expires in one hour. \
             If you did not ask for this, you can ignore this email.",
            "Choose a new password",
            link,
        ),
    }
}

fn render(title: &str, intro: &str, action: &str, link: &str) -> String {
    let link = escape_html(link);
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<h1>{title}</h1>
<p>{intro}</p>
<p><a href="{link}">{action}</a></p>
<p>If the button does not work, copy this address into your browser:<br>{link}</p>
</body>
</html>
"#
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_email_links_escaped_url() {
        let message = activation_email(
            "a@example.com",
            "https://app.example.com/activate?user_id=1&token=abc",
        );
        assert_eq!(message.subject, ACTIVATION_SUBJECT);
        assert!(
            message
                .html_body
                .contains(r#"href="https://app.example.com/activate?user_id=1&amp;token=abc""#)
        );
    }

    #[test]
    fn debug_omits_body() {
        let message = password_reset_email("a@example.com", "https://x.test/?token=secret");
        let debug = format!("{message:?}");
        assert!(debug.contains("a@example.com"));
        assert!(!debug.contains("secret"));
    }

    fn smtp_sender(host: &str, port: u16) -> Result<SmtpEmailSender> {
        SmtpEmailSender::new(
            host,
            port,
            "noreply@example.com",
            &SecretString::from("mail-secret"),
        )
    }

    #[test]
    fn smtp_sender_rejects_invalid_sender_address() {
        let result = SmtpEmailSender::new(
            "smtp.example.com",
            587,
            "not an address",
            &SecretString::from("mail-secret"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn smtp_sender_debug_hides_credentials() -> Result<()> {
        let debug = format!("{:?}", smtp_sender("smtp.example.com", 587)?);
        assert!(debug.contains("noreply@example.com"));
        assert!(!debug.contains("mail-secret"));
        Ok(())
    }

    #[test]
    fn smtp_message_is_html_with_headers() -> Result<()> {
        let sender = smtp_sender("smtp.example.com", 587)?;
        let message = sender.build(&activation_email(
            "alice@example.com",
            "https://app.example.com/activate?user_id=1&token=abc",
        ))?;
        let raw = String::from_utf8(message.formatted())?;
        assert!(raw.contains("From: noreply@example.com"));
        assert!(raw.contains("To: alice@example.com"));
        assert!(raw.contains("Subject: Confirm your email"));
        assert!(raw.contains("Content-Type: text/html"));
        Ok(())
    }

    #[test]
    fn smtp_message_rejects_invalid_recipient() -> Result<()> {
        let sender = smtp_sender("smtp.example.com", 587)?;
        let result = sender.build(&activation_email("not an address", "https://x.test/"));
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn smtp_send_reports_unreachable_relay() -> Result<()> {
        // Nothing listens on port 1, so the connection is refused.
        let sender = smtp_sender("localhost", 1)?;
        let result = sender
            .send(&password_reset_email("a@example.com", "https://x.test/"))
            .await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn log_sender_accepts_messages() -> Result<()> {
        LogEmailSender
            .send(&password_reset_email("a@example.com", "https://x.test/"))
            .await
    }
}
