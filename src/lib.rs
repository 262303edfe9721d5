//! Site Guard - request protection for a content site's HTTP API
//!
//! Mutating endpoints pass through a [`RouteProtector`](middleware::RouteProtector)
//! that checks identity, a fixed-window rate limit and a double-submit CSRF
//! token before any work happens. Uploads are additionally checked by size,
//! declared type and magic bytes. Collection reads go through a TTL cache.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use site_guard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file_with_env("config.toml")?;
//!     site_guard::server::serve(config, site_guard::shutdown::shutdown_signal()).await
//! }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod storage;

pub use config::Config;
pub use error::{ApiError, Result, SiteError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, AppState};
    pub use crate::cache::{CacheStats, TtlCache};
    pub use crate::config::Config;
    pub use crate::error::{ApiError, Result, SiteError};
    pub use crate::middleware::{
        CsrfGuard, GuardRequest, Identity, IdentityProvider, ProtectOptions, RateLimitRule,
        RateLimiter, RouteProtector, UploadValidator, UploadedFile,
    };
    pub use crate::observability::GuardMetrics;
    pub use crate::storage::{Collection, CollectionStore, JsonFileStore, MemoryStore};
}
