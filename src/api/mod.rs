//! HTTP surface: collection CRUD, uploads, CSRF issuance

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::build_router;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::middleware::{
    AuthConfig, CsrfGuard, IdentityProvider, ProtectOptions, RateLimiter, RouteProtector,
    TokenAuthenticator, UploadValidator,
};
use crate::observability::GuardMetrics;
use crate::storage::CollectionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Per-route guard options and read caching
#[derive(Debug, Clone, Copy)]
pub struct RouteSettings {
    pub mutations: ProtectOptions,
    pub uploads: ProtectOptions,
    pub cache_ttl: Duration,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            mutations: ProtectOptions::default(),
            uploads: ProtectOptions::default(),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

impl AppState {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        cache: Arc<TtlCache<Vec<serde_json::Value>>>,
        protector: Arc<RouteProtector>,
        csrf: Arc<CsrfGuard>,
        uploads: Arc<UploadValidator>,
        metrics: Arc<GuardMetrics>,
        settings: RouteSettings,
    ) -> Self {
        Self {
            store,
            cache,
            protector,
            csrf,
            uploads,
            metrics,
            settings,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Wire every component from configuration.
    ///
    /// Starts the cache and rate-limit sweeps, so it needs a tokio runtime.
    pub fn from_config(config: &Config, store: Arc<dyn CollectionStore>) -> Self {
        let metrics = Arc::new(GuardMetrics::new());
        let csrf = Arc::new(CsrfGuard::new(config.security.effective_csrf()));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.security.rate_limit_sweep_interval(),
        ));
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(TokenAuthenticator::new(AuthConfig::from_settings(&config.auth)));
        let protector = Arc::new(RouteProtector::new(
            identity,
            rate_limiter,
            csrf.clone(),
            metrics.clone(),
        ));
        let cache = Arc::new(TtlCache::new(config.cache.sweep_interval()));
        let uploads = Arc::new(UploadValidator::new(config.uploads.sniff_policy));

        info!(
            "Route guard ready (auth enabled: {}, environment: {:?})",
            config.auth.enabled, config.security.environment
        );

        Self::new(
            store,
            cache,
            protector,
            csrf,
            uploads,
            metrics,
            RouteSettings {
                mutations: config.security.mutations,
                uploads: config.security.uploads,
                cache_ttl: config.cache.ttl(),
            },
        )
    }

    /// Stop background sweeps; the state stays usable
    pub fn dispose(&self) {
        self.cache.dispose();
        self.protector.rate_limiter().dispose();
        info!("Background sweeps stopped");
    }
}
