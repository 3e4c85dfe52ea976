//! Small helpers for credential shape checks and email links.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

pub const PASSWORD_MIN_LEN: usize = 6;
pub const PASSWORD_MAX_LEN: usize = 30;

static EMAIL_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    EMAIL_REGEX
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// 6 to 30 characters, each printable ASCII without space (`!` through `~`).
#[must_use]
pub fn valid_password(password: &str) -> bool {
    (PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&password.len())
        && password.bytes().all(|b| (33..=126).contains(&b))
}

/// Append `user_id` and `token` to a callback URL used in outbound emails.
///
/// # Errors
/// Returns an error if `base` is not a valid URL.
pub fn build_callback_url(base: &str, user_id: i64, token: &str) -> Result<String> {
    let mut url = Url::parse(base).with_context(|| format!("invalid callback URL: {base}"))?;
    url.query_pairs_mut()
        .append_pair("user_id", &user_id.to_string())
        .append_pair("token", token);
    Ok(url.into())
}
