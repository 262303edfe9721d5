//! Authenticated identity for mutating endpoints

use super::csrf::{CookieStore, RequestCookies};
use axum::http::{header, HeaderMap};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// The caller a request was authenticated as
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    /// Identity used when authentication is switched off
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }
}

/// Source of the authenticated identity for a request
pub trait IdentityProvider: Send + Sync {
    /// `None` means the request is unauthenticated
    fn current_identity(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token -> subject
    pub tokens: HashMap<String, String>,
    /// Whether authentication is enabled
    pub enabled: bool,
    /// Token prefix on the Authorization header
    pub token_prefix: String,
    /// Cookie carrying a session token
    pub session_cookie: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            tokens: HashMap::new(),
            enabled: true,
            token_prefix: "Bearer".to_string(),
            session_cookie: "session".to_string(),
        }
    }
}

impl AuthConfig {
    /// Build from configured `(subject, token)` pairs
    pub fn from_settings(settings: &crate::config::AuthSettings) -> Self {
        Self {
            tokens: settings
                .tokens
                .iter()
                .map(|t| (t.token.expose_secret().clone(), t.subject.clone()))
                .collect(),
            enabled: settings.enabled,
            session_cookie: settings.session_cookie.clone(),
            ..Default::default()
        }
    }
}

/// Identity provider backed by a fixed set of API/session tokens
pub struct TokenAuthenticator {
    config: AuthConfig,
}

impl TokenAuthenticator {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    fn presented_token(&self, headers: &HeaderMap) -> Option<String> {
        let prefix = format!("{} ", self.config.token_prefix);
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix(prefix.as_str()))
            .map(|s| s.trim().to_string())
            .or_else(|| RequestCookies::from_headers(headers).get(&self.config.session_cookie))
    }
}

impl IdentityProvider for TokenAuthenticator {
    fn current_identity(&self, headers: &HeaderMap) -> Option<Identity> {
        if !self.config.enabled {
            return Some(Identity::anonymous());
        }

        let token = self.presented_token(headers)?;
        match self.config.tokens.get(&token) {
            Some(subject) => {
                debug!("Authenticated request as {}", subject);
                Some(Identity::new(subject.clone()))
            }
            None => {
                warn!("Authentication failed: invalid token");
                None
            }
        }
    }
}
