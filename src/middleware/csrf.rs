//! Cookie-backed CSRF tokens (double-submit pattern)

use axum::http::{header, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Token entropy in bytes (256 bits)
const TOKEN_BYTES: usize = 32;

/// CSRF cookie settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Cookie holding the authoritative token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Request header carrying the presented token
    #[serde(default = "default_header_name")]
    pub header_name: String,
    /// Cookie lifetime in seconds
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
    /// Set the `Secure` attribute (production deployments)
    #[serde(default)]
    pub secure: bool,
}

fn default_cookie_name() -> String { "csrf-token".to_string() }
fn default_header_name() -> String { "x-csrf-token".to_string() }
fn default_max_age() -> u64 { 60 * 60 * 24 }

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            header_name: default_header_name(),
            max_age_secs: default_max_age(),
            secure: false,
        }
    }
}

/// A cookie to be sent back to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub max_age_secs: u64,
    pub http_only: bool,
    pub secure: bool,
    pub path: String,
}

impl SetCookie {
    /// Render as a `Set-Cookie` header value
    pub fn to_header_string(&self) -> String {
        let mut out = format!(
            "{}={}; Path={}; Max-Age={}; SameSite=Strict",
            self.name, self.value, self.path, self.max_age_secs
        );
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }
}

/// Cookie collaborator used by [`CsrfGuard`]
pub trait CookieStore {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&mut self, cookie: SetCookie);
}

/// Cookies of a single HTTP exchange.
///
/// Reads come from the request's `Cookie` header; writes are queued as
/// `Set-Cookie` headers and are visible to later reads.
#[derive(Debug, Default, Clone)]
pub struct RequestCookies {
    values: HashMap<String, String>,
    pending: Vec<SetCookie>,
}

impl RequestCookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut values = HashMap::new();

        for raw in headers.get_all(header::COOKIE) {
            let Ok(raw) = raw.to_str() else { continue };
            for pair in raw.split(';') {
                if let Some((name, value)) = pair.trim().split_once('=') {
                    let name = name.trim();
                    if !name.is_empty() {
                        values
                            .entry(name.to_string())
                            .or_insert_with(|| unquote(value.trim()).to_string());
                    }
                }
            }
        }

        Self {
            values,
            pending: Vec::new(),
        }
    }

    /// Cookies queued by [`CookieStore::set`]
    pub fn pending(&self) -> &[SetCookie] {
        &self.pending
    }

    /// Append queued cookies to a response's headers
    pub fn write_to(&self, headers: &mut HeaderMap) {
        for cookie in &self.pending {
            match HeaderValue::from_str(&cookie.to_header_string()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => warn!("Dropping unencodable cookie {}: {}", cookie.name, e),
            }
        }
    }
}

/// Drop one pair of surrounding double quotes, as RFC 6265 allows
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

impl CookieStore for RequestCookies {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, cookie: SetCookie) {
        self.values.insert(cookie.name.clone(), cookie.value.clone());
        self.pending.retain(|c| c.name != cookie.name);
        self.pending.push(cookie);
    }
}

/// Issues and verifies CSRF tokens.
///
/// Holds no token state: the cookie is the only copy.
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    config: CsrfConfig,
}

impl CsrfGuard {
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    pub fn header_name(&self) -> &str {
        &self.config.header_name
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    /// Generate a fresh token and store it in the cookie.
    ///
    /// Overwrites any existing token.
    pub fn issue_token(&self, cookies: &mut dyn CookieStore) -> String {
        let bytes: [u8; TOKEN_BYTES] = rand::random();
        let token = hex::encode(bytes);

        cookies.set(SetCookie {
            name: self.config.cookie_name.clone(),
            value: token.clone(),
            max_age_secs: self.config.max_age_secs,
            http_only: true,
            secure: self.config.secure,
            path: "/".to_string(),
        });
        debug!("Issued CSRF token");

        token
    }

    /// Token currently held in the cookie, without issuing one
    pub fn current_token(&self, cookies: &dyn CookieStore) -> Option<String> {
        cookies
            .get(&self.config.cookie_name)
            .filter(|token| !token.is_empty())
    }

    /// Existing token, or a newly issued one
    pub fn token_or_issue(&self, cookies: &mut dyn CookieStore) -> String {
        match self.current_token(cookies) {
            Some(token) => token,
            None => self.issue_token(cookies),
        }
    }

    /// True only when `presented` exactly matches the cookie token
    pub fn verify(&self, cookies: &dyn CookieStore, presented: Option<&str>) -> bool {
        let Some(presented) = presented.filter(|t| !t.is_empty()) else {
            debug!("CSRF check failed: no token presented");
            return false;
        };
        let Some(stored) = self.current_token(cookies) else {
            debug!("CSRF check failed: no token cookie");
            return false;
        };

        presented.len() == stored.len() && bool::from(presented.as_bytes().ct_eq(stored.as_bytes()))
    }

    /// Read the presented token from request headers
    pub fn presented_token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(self.config.header_name.as_str())
            .and_then(|h| h.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(CsrfConfig::default())
    }

    #[test]
    fn test_issued_token_is_256_bit_hex() {
        let mut cookies = RequestCookies::default();
        let token = guard().issue_token(&mut cookies);

        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(cookies.get("csrf-token"), Some(token));
    }

    #[test]
    fn test_verify_without_cookie_fails() {
        let cookies = RequestCookies::default();
        assert!(!guard().verify(&cookies, Some("anything")));
        assert!(!guard().verify(&cookies, None));
    }

    #[test]
    fn test_verify_exact_match_only() {
        let guard = guard();
        let mut cookies = RequestCookies::default();
        let token = guard.issue_token(&mut cookies);

        assert!(guard.verify(&cookies, Some(&token)));

        let mut tampered = token.clone().into_bytes();
        tampered[10] = if tampered[10] == b'a' { b'b' } else { b'a' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(!guard.verify(&cookies, Some(&tampered)));

        assert!(!guard.verify(&cookies, Some(&token[..63])));
        assert!(!guard.verify(&cookies, Some("")));
        assert!(!guard.verify(&cookies, None));
    }

    #[test]
    fn test_reissue_invalidates_previous_token() {
        let guard = guard();
        let mut cookies = RequestCookies::default();

        let first = guard.issue_token(&mut cookies);
        let second = guard.issue_token(&mut cookies);

        assert_ne!(first, second);
        assert!(!guard.verify(&cookies, Some(&first)));
        assert!(guard.verify(&cookies, Some(&second)));
        assert_eq!(cookies.pending().len(), 1);
    }

    #[test]
    fn test_token_or_issue_reuses_cookie() {
        let guard = guard();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; csrf-token=abc123"));
        let mut cookies = RequestCookies::from_headers(&headers);

        assert_eq!(guard.current_token(&cookies).as_deref(), Some("abc123"));
        assert_eq!(guard.token_or_issue(&mut cookies), "abc123");
        assert!(cookies.pending().is_empty());
    }

    #[test]
    fn test_set_cookie_attributes() {
        let guard = CsrfGuard::new(CsrfConfig {
            secure: true,
            ..CsrfConfig::default()
        });
        let mut cookies = RequestCookies::default();
        let token = guard.issue_token(&mut cookies);

        let mut response_headers = HeaderMap::new();
        cookies.write_to(&mut response_headers);
        let value = response_headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();

        assert!(value.starts_with(&format!("csrf-token={}", token)));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("Secure"));
        assert!(value.contains("Max-Age=86400"));
        assert!(value.contains("Path=/"));
    }

    #[test]
    fn test_insecure_cookie_in_development() {
        let cookie = SetCookie {
            name: "csrf-token".to_string(),
            value: "v".to_string(),
            max_age_secs: 10,
            http_only: true,
            secure: false,
            path: "/".to_string(),
        };
        assert!(!cookie.to_header_string().contains("Secure"));
    }

    #[test]
    fn test_presented_token_from_header() {
        let guard = guard();
        let mut headers = HeaderMap::new();
        headers.insert("x-csrf-token", HeaderValue::from_static("tok"));

        assert_eq!(guard.presented_token(&headers), Some("tok"));
    }

    #[test]
    fn test_quoted_cookie_value_verifies() {
        let guard = guard();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("csrf-token=\"abc123\"; other=\""));
        let cookies = RequestCookies::from_headers(&headers);

        assert_eq!(cookies.get("csrf-token").as_deref(), Some("abc123"));
        assert_eq!(cookies.get("other").as_deref(), Some("\""));
        assert!(guard.verify(&cookies, Some("abc123")));
    }
}
