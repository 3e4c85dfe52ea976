use clap::{Arg, Command};

use super::auth::required;

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_OAUTH_TIMEOUT: &str = "oauth-timeout-seconds";

#[derive(Debug)]
pub struct Options {
    pub client_id: String,
    pub client_secret: String,
    pub timeout_seconds: u64,
}

impl Options {
    /// Read Google OAuth options from validated matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> anyhow::Result<Self> {
        Ok(Self {
            client_id: required(matches, ARG_GOOGLE_CLIENT_ID)?,
            client_secret: required(matches, ARG_GOOGLE_CLIENT_SECRET)?,
            timeout_seconds: matches
                .get_one::<u64>(ARG_OAUTH_TIMEOUT)
                .copied()
                .unwrap_or(10),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("STUDYPLANNER_GOOGLE_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("STUDYPLANNER_GOOGLE_CLIENT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_OAUTH_TIMEOUT)
                .long(ARG_OAUTH_TIMEOUT)
                .help("Timeout for calls to the identity provider in seconds")
                .env("STUDYPLANNER_OAUTH_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
