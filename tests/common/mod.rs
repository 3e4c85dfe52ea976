//! Shared fixtures: an `AuthService` over `MemoryStore`, a mailer that records
//! messages, and a provider that answers from a scripted profile.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use studyplanner::auth::{
    AuthConfig, AuthService, CredentialStore, OAuthProvider, ProviderError, ProviderProfile,
    TokenCodec,
};
use studyplanner::email::{EmailMessage, EmailSender};
use studyplanner::store::MemoryStore;

pub const SIGNING_KEY: &str = "0123456789abcdef0123456789abcdef";
pub const ENCRYPTION_KEY: &str = "fedcba9876543210fedcba9876543210";
pub const API_HOST: &str = "api.example.com";
pub const FRONTEND_ORIGIN: &str = "https://app.example.com";

#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<EmailMessage> {
        self.sent().pop()
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("smtp unavailable"));
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("mailer lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

pub struct ScriptedProvider {
    profile: Mutex<ProviderProfile>,
    fail_exchange: AtomicBool,
}

impl ScriptedProvider {
    pub fn new(profile: ProviderProfile) -> Self {
        Self {
            profile: Mutex::new(profile),
            fail_exchange: AtomicBool::new(false),
        }
    }

    pub fn set_profile(&self, profile: ProviderProfile) {
        if let Ok(mut current) = self.profile.lock() {
            *current = profile;
        }
    }

    pub fn fail_exchange(&self, fail: bool) {
        self.fail_exchange.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl OAuthProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.example.test/auth?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> Result<SecretString, ProviderError> {
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(ProviderError::Timeout);
        }
        Ok(SecretString::from(format!("provider-token-for-{code}")))
    }

    async fn fetch_profile(
        &self,
        _access_token: &SecretString,
    ) -> Result<ProviderProfile, ProviderError> {
        self.profile
            .lock()
            .map(|profile| profile.clone())
            .map_err(|_| ProviderError::Transport("profile lock poisoned".to_string()))
    }
}

pub fn google_profile(id: &str, email: &str, verified: bool) -> ProviderProfile {
    ProviderProfile {
        provider_user_id: id.to_string(),
        email: Some(email.to_string()),
        email_verified: verified,
        name: Some("Test User".to_string()),
    }
}

pub fn codec() -> Result<TokenCodec> {
    Ok(TokenCodec::new(
        &SecretString::from(SIGNING_KEY),
        &SecretString::from(ENCRYPTION_KEY),
    )?)
}

pub fn default_config() -> AuthConfig {
    AuthConfig::new(
        "https://api.example.com".to_string(),
        "https://app.example.com/activate".to_string(),
        "https://app.example.com/reset".to_string(),
    )
}

pub struct Harness {
    pub service: AuthService,
    pub credentials: CredentialStore,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub provider: Arc<ScriptedProvider>,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_config(default_config())
    }

    pub fn with_config(config: AuthConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let provider = Arc::new(ScriptedProvider::new(google_profile(
            "google-1",
            "alice@example.com",
            true,
        )));
        // Cheap argon2 parameters keep the suite fast.
        let credentials =
            CredentialStore::new(SecretString::from(SIGNING_KEY)).with_params(1024, 1, 1)?;

        let service = AuthService::new(
            config,
            codec()?,
            credentials.clone(),
            store.clone(),
            mailer.clone(),
            provider.clone(),
        );

        Ok(Self {
            service,
            credentials,
            store,
            mailer,
            provider,
        })
    }
}

/// Read a query parameter out of the link in an email body.
pub fn link_param(message: &EmailMessage, name: &str) -> Option<String> {
    let needle = format!("{name}=");
    let start = message.html_body.find(&needle)? + needle.len();
    let value: String = message.html_body[start..]
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect();
    if value.is_empty() { None } else { Some(value) }
}
