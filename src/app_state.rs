use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    cache::LookupCache,
    config::Config,
    dedup::KeyedLocks,
    index::StationIndex,
    lookup::LookupService,
    rate_limit::{ClientIdentity, RateLimiter},
};

pub struct AppState {
    pub lookup: LookupService,
    pub rate_limiter: RateLimiter,
    pub client_identity: ClientIdentity,
}

impl AppState {
    pub fn new(index: StationIndex, config: &Config) -> Self {
        let lookup = LookupService::new(
            Arc::new(index),
            LookupCache::new(config.cache_ttl, config.cache_max_capacity),
            KeyedLocks::new(config.lock_wait_timeout),
            config.key_policy,
        );

        AppState {
            lookup,
            rate_limiter: RateLimiter::new(config.rate_limit, config.rate_limit_window),
            client_identity: config.client_identity.clone(),
        }
    }

    /// Periodically drops expired cache entries and idle rate limit windows.
    /// The task runs until it's aborted
    pub fn spawn_maintenance(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let state = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                state.lookup.cache().run_pending_tasks().await;
                state.rate_limiter.retain_recent();

                tracing::debug!(
                    cached = state.lookup.cache().entry_count(),
                    locked_keys = state.lookup.locks().len(),
                    clients = state.rate_limiter.tracked_clients(),
                    "maintenance"
                );
            }
        })
    }
}
