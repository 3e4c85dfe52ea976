//! Route handlers. Each one extracts input, calls [`AuthService`], and maps the
//! result to a response; no auth logic lives here.

pub mod activation;
pub mod auth;
pub mod cookies;
pub mod error;
pub mod google;
pub mod health;
pub mod password_reset;
pub mod types;

use crate::auth::AuthService;

/// Shared handler state, injected as an `Extension<Arc<AuthState>>`.
pub struct AuthState {
    service: AuthService,
    frontend_origin: String,
}

impl AuthState {
    #[must_use]
    pub fn new(service: AuthService, frontend_origin: String) -> Self {
        Self {
            service,
            frontend_origin,
        }
    }

    #[must_use]
    pub fn service(&self) -> &AuthService {
        &self.service
    }

    /// Origin that receives tokens from the OAuth popup.
    #[must_use]
    pub fn frontend_origin(&self) -> &str {
        &self.frontend_origin
    }

    pub(crate) fn cookie_secure(&self) -> bool {
        self.service.config().cookie_secure()
    }
}
