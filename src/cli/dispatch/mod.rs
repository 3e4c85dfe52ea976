//! Map validated CLI arguments to an action.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, google, mail};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let google_opts = google::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        signing_key: SecretString::from(auth_opts.signing_key),
        encryption_key: SecretString::from(auth_opts.encryption_key),
        public_url: auth_opts.public_url,
        frontend_origin: auth_opts.frontend_origin,
        access_token_ttl_seconds: auth_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: auth_opts.refresh_token_ttl_seconds,
        oauth_state_ttl_seconds: auth_opts.oauth_state_ttl_seconds,
        activation_token_ttl_seconds: auth_opts.activation_token_ttl_seconds,
        password_reset_token_ttl_seconds: auth_opts.password_reset_token_ttl_seconds,
        activation_callback_url: auth_opts.activation_callback_url,
        password_reset_callback_url: auth_opts.password_reset_callback_url,
        google_client_id: google_opts.client_id,
        google_client_secret: SecretString::from(google_opts.client_secret),
        oauth_timeout_seconds: google_opts.timeout_seconds,
        mail_host: mail_opts.host,
        mail_port: mail_opts.port,
        mail_address: mail_opts.address,
        mail_password: mail_opts.password.map(SecretString::from),
    }))
}
