use clap::{Arg, Command};

pub const ARG_MAIL_HOST: &str = "mail-host";
pub const ARG_MAIL_PORT: &str = "mail-port";
pub const ARG_MAIL_ADDRESS: &str = "mail-address";
pub const ARG_MAIL_PASSWORD: &str = "mail-password";

#[derive(Debug)]
pub struct Options {
    pub host: Option<String>,
    pub port: u16,
    pub address: Option<String>,
    pub password: Option<String>,
}

impl Options {
    /// Read outbound mail options. Without a host, mail is only logged.
    #[must_use]
    pub fn parse(matches: &clap::ArgMatches) -> Self {
        Self {
            host: matches.get_one::<String>(ARG_MAIL_HOST).cloned(),
            port: matches
                .get_one::<u16>(ARG_MAIL_PORT)
                .copied()
                .unwrap_or(587),
            address: matches.get_one::<String>(ARG_MAIL_ADDRESS).cloned(),
            password: matches.get_one::<String>(ARG_MAIL_PASSWORD).cloned(),
        }
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAIL_HOST)
                .long(ARG_MAIL_HOST)
                .help("SMTP relay for activation and password reset emails (STARTTLS)")
                .env("STUDYPLANNER_MAIL_HOST")
                .requires_all([ARG_MAIL_ADDRESS, ARG_MAIL_PASSWORD]),
        )
        .arg(
            Arg::new(ARG_MAIL_PORT)
                .long(ARG_MAIL_PORT)
                .help("SMTP submission port")
                .env("STUDYPLANNER_MAIL_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
        .arg(
            Arg::new(ARG_MAIL_ADDRESS)
                .long(ARG_MAIL_ADDRESS)
                .help("Sender address, also used as the SMTP login")
                .env("STUDYPLANNER_MAIL_ADDRESS"),
        )
        .arg(
            Arg::new(ARG_MAIL_PASSWORD)
                .long(ARG_MAIL_PASSWORD)
                .help("SMTP password")
                .env("STUDYPLANNER_MAIL_PASSWORD")
                .hide_env_values(true),
        )
}
