//! # Study Planner API
//!
//! `studyplanner` is the backend for a study-planning application. This crate holds
//! the account and session core that every other part of the API trusts.
//!
//! ## Tokens
//!
//! Access and refresh tokens are compact HS256 JWS values. Access tokens are short
//! lived and stateless. Refresh tokens are also recorded in the session ledger so they
//! can be rotated and revoked.
//!
//! OAuth state tokens are compact JWE values (`dir` + `A256GCM`). The browser only
//! ever sees them as opaque strings.
//!
//! ## Sessions & Reuse Detection
//!
//! Every refresh rotates the session row with a compare-and-swap on the exact token
//! value. Presenting a refresh token that was already rotated away matches nothing and
//! is reported as `403 Forbidden` rather than `401 Unauthorized`.
//!
//! ## One-Time Tokens
//!
//! Activation and password-reset secrets are random hex strings delivered by email.
//! Only their HMAC is stored, at most one per `(user, purpose)`.
//!
//! ## Federation
//!
//! Google sign-in uses the authorization-code grant. The callback hands tokens to the
//! opener window with `postMessage`, so tokens never appear in a URL.

pub mod api;
pub mod auth;
pub mod cli;
pub mod email;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
