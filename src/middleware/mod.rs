//! Request guards: identity, rate limiting, CSRF, uploads and input checks

pub mod auth;
pub mod csrf;
pub mod protect;
pub mod rate_limiter;
pub mod upload;
pub mod validator;

pub use auth::{AuthConfig, Identity, IdentityProvider, TokenAuthenticator};
pub use csrf::{CookieStore, CsrfConfig, CsrfGuard, RequestCookies, SetCookie};
pub use protect::{GuardRequest, ProtectOptions, RouteProtector};
pub use rate_limiter::{RateLimitDecision, RateLimitRule, RateLimiter};
pub use upload::{SniffPolicy, UploadError, UploadValidation, UploadValidator, UploadedFile};
pub use validator::{InputValidator, ValidationError};
