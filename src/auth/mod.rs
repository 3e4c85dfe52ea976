//! Authentication core: token codec, credential hashing, refresh-token sessions,
//! one-time tokens and external identity providers.
//!
//! [`AuthService`] composes the pieces into the flows the HTTP layer exposes.

pub mod config;
pub mod credentials;
pub mod error;
pub mod google;
pub mod oauth;
pub mod one_time;
pub mod service;
pub mod session;
pub mod token;
pub mod utils;

pub use config::AuthConfig;
pub use credentials::CredentialStore;
pub use error::AuthError;
pub use google::{GoogleEndpoints, GoogleProvider};
pub use oauth::{OAuthProvider, ProviderError, ProviderProfile, StateClaims};
pub use one_time::{OneTimeTokenError, TokenPurpose};
pub use service::{AuthInfo, AuthService, OAuthLogin, OAuthRedirect, TokenKind, TokenPair};
pub use token::{Token, TokenCodec, TokenError};
