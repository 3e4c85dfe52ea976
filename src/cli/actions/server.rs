use crate::api;
use crate::auth::{AuthConfig, CredentialStore, GoogleEndpoints, GoogleProvider, TokenCodec};
use crate::email::{EmailSender, LogEmailSender, SmtpEmailSender};
use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub signing_key: SecretString,
    pub encryption_key: SecretString,
    pub public_url: String,
    pub frontend_origin: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub oauth_state_ttl_seconds: i64,
    pub activation_token_ttl_seconds: i64,
    pub password_reset_token_ttl_seconds: i64,
    pub activation_callback_url: String,
    pub password_reset_callback_url: String,
    pub google_client_id: String,
    pub google_client_secret: SecretString,
    pub oauth_timeout_seconds: u64,
    pub mail_host: Option<String>,
    pub mail_port: u16,
    pub mail_address: Option<String>,
    pub mail_password: Option<SecretString>,
}

fn mailer(args: &Args) -> Result<Arc<dyn EmailSender>> {
    let Some(host) = args.mail_host.as_deref() else {
        warn!("No mail host configured; activation and password reset emails are only logged");
        return Ok(Arc::new(LogEmailSender));
    };
    let address = args
        .mail_address
        .as_deref()
        .ok_or_else(|| anyhow!("missing required argument: --mail-address"))?;
    let password = args
        .mail_password
        .as_ref()
        .ok_or_else(|| anyhow!("missing required argument: --mail-password"))?;
    let sender = SmtpEmailSender::new(host, args.mail_port, address, password)
        .context("Failed to build SMTP sender")?;
    debug!("Mail sender: {sender:?}");
    Ok(Arc::new(sender))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the keys are unusable, the provider client cannot be built,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let mailer = mailer(&args)?;

    let codec = TokenCodec::new(&args.signing_key, &args.encryption_key)
        .context("Invalid token keys")?;

    // One-time secrets are keyed with the signing key.
    let credentials = CredentialStore::new(args.signing_key.clone());

    let auth_config = AuthConfig::new(
        args.public_url,
        args.activation_callback_url,
        args.password_reset_callback_url,
    )
    .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
    .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds)
    .with_oauth_state_ttl_seconds(args.oauth_state_ttl_seconds)
    .with_activation_token_ttl_seconds(args.activation_token_ttl_seconds)
    .with_password_reset_token_ttl_seconds(args.password_reset_token_ttl_seconds);

    let provider = GoogleProvider::new(
        args.google_client_id,
        args.google_client_secret,
        GoogleProvider::callback_url(auth_config.public_url()),
        Duration::from_secs(args.oauth_timeout_seconds),
        GoogleEndpoints::default(),
    )
    .context("Failed to build Google provider")?;

    debug!("Auth config: {:?}", auth_config);

    api::new(
        args.port,
        args.dsn,
        &args.frontend_origin,
        auth_config,
        codec,
        credentials,
        mailer,
        Arc::new(provider),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mail_host: Option<&str>) -> Args {
        Args {
            port: 8080,
            dsn: "postgres://localhost/studyplanner".to_string(),
            signing_key: SecretString::from("0123456789abcdef0123456789abcdef"),
            encryption_key: SecretString::from("fedcba9876543210fedcba9876543210"),
            public_url: "http://localhost:8080".to_string(),
            frontend_origin: "http://localhost:3000".to_string(),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 604_800,
            oauth_state_ttl_seconds: 900,
            activation_token_ttl_seconds: 86_400,
            password_reset_token_ttl_seconds: 3_600,
            activation_callback_url: "http://localhost:3000/activate".to_string(),
            password_reset_callback_url: "http://localhost:3000/reset".to_string(),
            google_client_id: "client-id".to_string(),
            google_client_secret: SecretString::from("client-secret"),
            oauth_timeout_seconds: 10,
            mail_host: mail_host.map(str::to_string),
            mail_port: 587,
            mail_address: Some("noreply@example.com".to_string()),
            mail_password: Some(SecretString::from("mail-secret")),
        }
    }

    #[test]
    fn mailer_uses_smtp_when_host_is_set() -> Result<()> {
        let mailer = mailer(&args(Some("smtp.example.com")))?;
        let debug = format!("{mailer:?}");
        assert!(debug.contains("SmtpEmailSender"));
        Ok(())
    }

    #[test]
    fn mailer_falls_back_to_log_sender() -> Result<()> {
        let mailer = mailer(&args(None))?;
        assert!(format!("{mailer:?}").contains("LogEmailSender"));
        Ok(())
    }

    #[test]
    fn mailer_requires_credentials_with_host() {
        let mut args = args(Some("smtp.example.com"));
        args.mail_password = None;
        assert!(mailer(&args).is_err());
    }
}
