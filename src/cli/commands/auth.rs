//! Token keys, lifetimes and email callback URLs.

use clap::{Arg, Command};

pub const ARG_SIGNING_KEY: &str = "signing-key";
pub const ARG_ENCRYPTION_KEY: &str = "encryption-key";
pub const ARG_PUBLIC_URL: &str = "public-url";
pub const ARG_FRONTEND_ORIGIN: &str = "frontend-origin";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_OAUTH_STATE_TTL: &str = "oauth-state-ttl-seconds";
pub const ARG_ACTIVATION_TOKEN_TTL: &str = "activation-token-ttl-seconds";
pub const ARG_PASSWORD_RESET_TOKEN_TTL: &str = "password-reset-token-ttl-seconds";
pub const ARG_ACTIVATION_CALLBACK_URL: &str = "activation-callback-url";
pub const ARG_PASSWORD_RESET_CALLBACK_URL: &str = "password-reset-callback-url";

#[derive(Debug)]
pub struct Options {
    pub signing_key: String,
    pub encryption_key: String,
    pub public_url: String,
    pub frontend_origin: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub oauth_state_ttl_seconds: i64,
    pub activation_token_ttl_seconds: i64,
    pub password_reset_token_ttl_seconds: i64,
    pub activation_callback_url: String,
    pub password_reset_callback_url: String,
}

impl Options {
    /// Read auth options from validated matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> anyhow::Result<Self> {
        Ok(Self {
            signing_key: required(matches, ARG_SIGNING_KEY)?,
            encryption_key: required(matches, ARG_ENCRYPTION_KEY)?,
            public_url: required(matches, ARG_PUBLIC_URL)?,
            frontend_origin: required(matches, ARG_FRONTEND_ORIGIN)?,
            access_token_ttl_seconds: seconds(matches, ARG_ACCESS_TOKEN_TTL, 900),
            refresh_token_ttl_seconds: seconds(matches, ARG_REFRESH_TOKEN_TTL, 604_800),
            oauth_state_ttl_seconds: seconds(matches, ARG_OAUTH_STATE_TTL, 900),
            activation_token_ttl_seconds: seconds(matches, ARG_ACTIVATION_TOKEN_TTL, 86_400),
            password_reset_token_ttl_seconds: seconds(
                matches,
                ARG_PASSWORD_RESET_TOKEN_TTL,
                3_600,
            ),
            activation_callback_url: required(matches, ARG_ACTIVATION_CALLBACK_URL)?,
            password_reset_callback_url: required(matches, ARG_PASSWORD_RESET_CALLBACK_URL)?,
        })
    }
}

pub(crate) fn required(matches: &clap::ArgMatches, name: &str) -> anyhow::Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing required argument: --{name}"))
}

fn seconds(matches: &clap::ArgMatches, name: &str, default: i64) -> i64 {
    matches.get_one::<i64>(name).copied().unwrap_or(default)
}

pub fn with_args(command: Command) -> Command {
    let command = with_key_args(command);
    let command = with_url_args(command);
    with_ttl_args(command)
}

fn with_key_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long(ARG_SIGNING_KEY)
                .help("HMAC key for access/refresh tokens and one-time secrets (at least 32 bytes)")
                .env("STUDYPLANNER_SIGNING_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ENCRYPTION_KEY)
                .long(ARG_ENCRYPTION_KEY)
                .help("AES-256-GCM key for OAuth state tokens (exactly 32 bytes)")
                .env("STUDYPLANNER_ENCRYPTION_KEY")
                .hide_env_values(true)
                .required(true),
        )
}

fn with_url_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_URL)
                .long(ARG_PUBLIC_URL)
                .help("Public base URL of this API; OAuth redirects and state tokens use its host")
                .env("STUDYPLANNER_PUBLIC_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_FRONTEND_ORIGIN)
                .long(ARG_FRONTEND_ORIGIN)
                .help("Frontend origin allowed by CORS")
                .env("STUDYPLANNER_FRONTEND_ORIGIN")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_ACTIVATION_CALLBACK_URL)
                .long(ARG_ACTIVATION_CALLBACK_URL)
                .help("Frontend page that receives user_id and token from activation emails")
                .env("STUDYPLANNER_ACTIVATION_CALLBACK_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PASSWORD_RESET_CALLBACK_URL)
                .long(ARG_PASSWORD_RESET_CALLBACK_URL)
                .help("Frontend page that receives user_id and token from password reset emails")
                .env("STUDYPLANNER_PASSWORD_RESET_CALLBACK_URL")
                .required(true),
        )
}

fn with_ttl_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token TTL in seconds")
                .env("STUDYPLANNER_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long(ARG_REFRESH_TOKEN_TTL)
                .help("Refresh token and session TTL in seconds")
                .env("STUDYPLANNER_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_OAUTH_STATE_TTL)
                .long(ARG_OAUTH_STATE_TTL)
                .help("OAuth state token TTL in seconds")
                .env("STUDYPLANNER_OAUTH_STATE_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_ACTIVATION_TOKEN_TTL)
                .long(ARG_ACTIVATION_TOKEN_TTL)
                .help("Activation email token TTL in seconds")
                .env("STUDYPLANNER_ACTIVATION_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_RESET_TOKEN_TTL)
                .long(ARG_PASSWORD_RESET_TOKEN_TTL)
                .help("Password reset email token TTL in seconds")
                .env("STUDYPLANNER_PASSWORD_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}
