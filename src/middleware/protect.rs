//! Pre-flight guard for mutating endpoints: auth, rate limit, CSRF

use super::auth::{Identity, IdentityProvider};
use super::csrf::{CsrfGuard, RequestCookies};
use super::rate_limiter::{RateLimitRule, RateLimiter, FALLBACK_IDENTIFIER};
use crate::error::ApiError;
use crate::observability::GuardMetrics;
use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Per-route guard options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectOptions {
    #[serde(default)]
    pub rate_limit: RateLimitRule,
    #[serde(default = "default_require_csrf")]
    pub require_csrf: bool,
}

fn default_require_csrf() -> bool { true }

impl Default for ProtectOptions {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitRule::default(),
            require_csrf: default_require_csrf(),
        }
    }
}

/// The parts of a request the guard looks at
#[derive(Debug, Clone)]
pub struct GuardRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub peer: Option<SocketAddr>,
}

impl GuardRequest {
    /// Capture what the guard needs without touching the body
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            headers: req.headers().clone(),
            peer,
        }
    }

    /// Best-effort client address: proxy headers, then the socket peer
    pub fn client_ip(&self) -> Option<String> {
        self.headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .or_else(|| self.headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.peer.map(|peer| peer.ip().to_string()))
    }

    /// Rate-limit key: client address + method + path
    pub fn rate_limit_identifier(&self) -> String {
        let ip = self.client_ip();
        format!(
            "{}:{}:{}",
            ip.as_deref().unwrap_or(FALLBACK_IDENTIFIER),
            self.method,
            self.path
        )
    }
}

/// Composes identity, rate limiting and CSRF into one check.
///
/// Only the rate-limit counter is mutated; a request rejected for missing
/// identity never reaches it.
pub struct RouteProtector {
    identity: Arc<dyn IdentityProvider>,
    rate_limiter: Arc<RateLimiter>,
    csrf: Arc<CsrfGuard>,
    metrics: Arc<GuardMetrics>,
}

impl RouteProtector {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        rate_limiter: Arc<RateLimiter>,
        csrf: Arc<CsrfGuard>,
        metrics: Arc<GuardMetrics>,
    ) -> Self {
        Self {
            identity,
            rate_limiter,
            csrf,
            metrics,
        }
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Run the guard, returning the caller's identity on success
    pub fn check(&self, request: &GuardRequest, options: &ProtectOptions) -> Result<Identity, ApiError> {
        let Some(identity) = self.identity.current_identity(&request.headers) else {
            warn!(path = %request.path, "Rejected unauthenticated request");
            self.metrics.record_unauthorized();
            return Err(ApiError::Unauthorized);
        };

        let identifier = request.rate_limit_identifier();
        let decision = self.rate_limiter.check_rate_limit(
            &identifier,
            options.rate_limit.max_requests,
            options.rate_limit.window(),
        );
        if !decision.allowed {
            let retry_after_secs = decision.retry_after_secs(Instant::now());
            warn!(
                identifier = %identifier,
                retry_after_secs,
                "Rejected rate-limited request"
            );
            self.metrics.record_rate_limited();
            return Err(ApiError::RateLimited { retry_after_secs });
        }

        if options.require_csrf {
            let cookies = RequestCookies::from_headers(&request.headers);
            let presented = self.csrf.presented_token(&request.headers);
            if !self.csrf.verify(&cookies, presented) {
                warn!(path = %request.path, subject = %identity.subject, "Rejected request with invalid CSRF token");
                self.metrics.record_invalid_csrf();
                return Err(ApiError::InvalidCsrf);
            }
        }

        debug!(
            path = %request.path,
            subject = %identity.subject,
            remaining = decision.remaining,
            "Request passed guard"
        );
        self.metrics.record_allowed();
        Ok(identity)
    }

    /// `None` to proceed, or the terminal response to send
    pub fn protect(&self, request: &GuardRequest, options: &ProtectOptions) -> Option<Response> {
        self.check(request, options)
            .err()
            .map(IntoResponse::into_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::{AuthConfig, TokenAuthenticator};
    use crate::middleware::csrf::{CookieStore, CsrfConfig};
    use axum::http::{header, HeaderValue, StatusCode};
    use std::time::Duration;

    const TOKEN: &str = "editor-token";

    fn protector() -> RouteProtector {
        let mut auth = AuthConfig::default();
        auth.tokens.insert(TOKEN.to_string(), "editor".to_string());

        RouteProtector::new(
            Arc::new(TokenAuthenticator::new(auth)),
            Arc::new(RateLimiter::unscheduled()),
            Arc::new(CsrfGuard::new(CsrfConfig::default())),
            Arc::new(GuardMetrics::new()),
        )
    }

    fn request(authenticated: bool, csrf: Option<(&str, &str)>) -> GuardRequest {
        let mut headers = HeaderMap::new();
        if authenticated {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", TOKEN)).unwrap(),
            );
        }
        if let Some((cookie, presented)) = csrf {
            headers.insert(
                header::COOKIE,
                HeaderValue::from_str(&format!("csrf-token={}", cookie)).unwrap(),
            );
            headers.insert("x-csrf-token", HeaderValue::from_str(presented).unwrap());
        }

        GuardRequest {
            method: Method::POST,
            path: "/api/recipes".to_string(),
            headers,
            peer: Some("203.0.113.7:50000".parse().unwrap()),
        }
    }

    #[test]
    fn test_unauthenticated_does_not_touch_counter() {
        let protector = protector();
        let req = request(false, Some(("t", "t")));

        let response = protector.protect(&req, &ProtectOptions::default()).unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(protector.rate_limiter().usage(&req.rate_limit_identifier()).is_none());
        assert!(protector.rate_limiter().is_empty());
    }

    #[test]
    fn test_eleventh_request_rate_limited() {
        let protector = protector();
        let req = request(true, Some(("tok", "tok")));
        let options = ProtectOptions::default();

        for i in 0..10 {
            assert!(protector.protect(&req, &options).is_none(), "request {} should pass", i);
        }

        let response = protector.protect(&req, &options).unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap();
        assert!((59..=60).contains(&retry_after));
    }

    #[test]
    fn test_mismatched_csrf_forbidden() {
        let protector = protector();
        let guard = CsrfGuard::new(CsrfConfig::default());
        let mut cookies = RequestCookies::default();
        let issued = guard.issue_token(&mut cookies);
        let stored = cookies.get("csrf-token").unwrap();
        assert_eq!(stored, issued);

        let req = request(true, Some((issued.as_str(), "0000")));
        assert_eq!(
            protector.check(&req, &ProtectOptions::default()),
            Err(ApiError::InvalidCsrf)
        );

        let req = request(true, Some((issued.as_str(), issued.as_str())));
        assert!(protector.check(&req, &ProtectOptions::default()).is_ok());
    }

    #[test]
    fn test_csrf_can_be_skipped() {
        let protector = protector();
        let options = ProtectOptions {
            require_csrf: false,
            ..Default::default()
        };

        assert_eq!(
            protector.check(&request(true, None), &options),
            Ok(Identity::new("editor"))
        );
    }

    #[test]
    fn test_rate_limit_checked_before_csrf() {
        let protector = protector();
        let options = ProtectOptions {
            rate_limit: RateLimitRule::new(1, Duration::from_secs(60)),
            require_csrf: true,
        };
        let req = request(true, None);

        assert_eq!(protector.check(&req, &options), Err(ApiError::InvalidCsrf));
        assert!(matches!(
            protector.check(&req, &options),
            Err(ApiError::RateLimited { .. })
        ));
    }

    #[test]
    fn test_identifier_fallbacks() {
        let mut req = request(true, None);
        assert_eq!(req.rate_limit_identifier(), "203.0.113.7:POST:/api/recipes");

        req.headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.1, 10.0.0.1"));
        assert_eq!(req.rate_limit_identifier(), "198.51.100.1:POST:/api/recipes");

        req.headers.remove("x-forwarded-for");
        req.headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.44"));
        assert_eq!(req.rate_limit_identifier(), "192.0.2.44:POST:/api/recipes");

        req.headers.remove("x-real-ip");
        req.peer = None;
        assert_eq!(req.rate_limit_identifier(), "unknown:POST:/api/recipes");
    }

    #[test]
    fn test_from_request_reads_connect_info() {
        let mut req = Request::builder()
            .method(Method::DELETE)
            .uri("/api/blog/42?x=1")
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("192.0.2.9:4000".parse().unwrap()));

        let guard = GuardRequest::from_request(&req);
        assert_eq!(guard.rate_limit_identifier(), "192.0.2.9:DELETE:/api/blog/42");
    }
}
