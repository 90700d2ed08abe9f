use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{
    cache::LookupCache,
    dedup::{DedupError, KeyedLocks},
    index::{Nearest, StationSearch},
};

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("No stations found near this location. Please check your coordinates.")]
    NotFound,
    #[error("{0}")]
    LockWait(#[from] DedupError),
}

/// Cache and lock key for a query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey(String);

impl From<String> for LookupKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How query coordinates turn into a [`LookupKey`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum KeyPolicy {
    /// the coordinates as given, so only bit-identical queries share a key
    #[default]
    Exact,
    /// coordinates rounded to this many decimal places
    Rounded { decimals: u32 },
}

impl KeyPolicy {
    pub fn key(&self, lat: f64, lon: f64) -> LookupKey {
        match *self {
            KeyPolicy::Exact => format!("{lat},{lon}").into(),
            KeyPolicy::Rounded { decimals } => {
                let decimals = decimals as usize;
                // -0.0 would otherwise give a different key than 0.0
                let lat = round(lat, decimals) + 0.0;
                let lon = round(lon, decimals) + 0.0;
                format!("{lat:.decimals$},{lon:.decimals$}").into()
            }
        }
    }
}

fn round(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Finds the nearest station, going through the cache and making sure
/// concurrent lookups of the same key only search once
pub struct LookupService {
    search: Arc<dyn StationSearch>,
    cache: LookupCache,
    locks: KeyedLocks<LookupKey>,
    key_policy: KeyPolicy,
}

impl LookupService {
    pub fn new(
        search: Arc<dyn StationSearch>,
        cache: LookupCache,
        locks: KeyedLocks<LookupKey>,
        key_policy: KeyPolicy,
    ) -> Self {
        Self {
            search,
            cache,
            locks,
            key_policy,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn lookup(&self, lat: f64, lon: f64) -> Result<Nearest, LookupError> {
        let key = self.key_policy.key(lat, lon);

        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(%key, "cache hit");
            return Ok(hit);
        }

        self.locks
            .with_exclusive_access(key.clone(), || async {
                // whoever held the lock before us may have filled it in
                if let Some(hit) = self.cache.get(&key).await {
                    tracing::debug!(%key, "cache hit after waiting");
                    return Ok::<_, LookupError>(hit);
                }

                tracing::debug!(%key, "cache miss");
                let nearest = self.search.nearest(lat, lon)?;
                self.cache.put(key.clone(), nearest.clone()).await;

                Ok(nearest)
            })
            .await
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn locks(&self) -> &KeyedLocks<LookupKey> {
        &self.locks
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use geojson::JsonObject;

    use super::*;
    use crate::index::{MockStationSearch, Station, StationIndex};

    fn service(search: impl StationSearch + 'static, key_policy: KeyPolicy) -> LookupService {
        LookupService::new(
            Arc::new(search),
            LookupCache::new(Duration::from_secs(1800), 1000),
            KeyedLocks::new(Some(Duration::from_secs(30))),
            key_policy,
        )
    }

    fn found(id: &str) -> Nearest {
        Nearest {
            station: Arc::new(Station::new(id, 0.0, 0.0, JsonObject::new())),
            distance_km: 1.5,
        }
    }

    #[test]
    fn test_exact_keys() {
        let policy = KeyPolicy::Exact;
        assert_eq!(policy.key(1.5, -2.25).to_string(), "1.5,-2.25");
        assert_ne!(policy.key(0.1 + 0.2, 0.0), policy.key(0.3, 0.0));
    }

    #[test]
    fn test_rounded_keys() {
        let policy = KeyPolicy::Rounded { decimals: 4 };
        assert_eq!(policy.key(0.1 + 0.2, 0.0), policy.key(0.3, 0.0));
        assert_eq!(policy.key(-0.00001, 0.0), policy.key(0.0, 0.0));
        assert_eq!(policy.key(51.50736, -0.12776).to_string(), "51.5074,-0.1278");
        assert_ne!(policy.key(51.5073, 0.0), policy.key(51.5074, 0.0));
    }

    #[tokio::test]
    async fn test_second_lookup_is_cached() {
        let mut search = MockStationSearch::new();
        search
            .expect_nearest()
            .times(1)
            .returning(|_, _| Ok(found("A")));
        let service = service(search, KeyPolicy::Exact);

        let first = service.lookup(1.0, 2.0).await.unwrap();
        let second = service.lookup(1.0, 2.0).await.unwrap();

        assert!(Arc::ptr_eq(&first.station, &second.station));
        assert!(service.locks().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_search_once() {
        let mut search = MockStationSearch::new();
        search.expect_nearest().times(1).returning(|_, _| {
            // hold the lock long enough for everyone else to queue up
            std::thread::sleep(Duration::from_millis(50));
            Ok(found("A"))
        });
        let service = Arc::new(service(search, KeyPolicy::Exact));

        let tasks = (0..32)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.lookup(10.0, 20.0).await })
            })
            .collect::<Vec<_>>();

        let mut results = vec![];
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }

        assert!(results
            .iter()
            .all(|r| Arc::ptr_eq(&r.station, &results[0].station)));
        assert!(service.locks().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let mut search = MockStationSearch::new();
        search
            .expect_nearest()
            .times(2)
            .returning(|_, _| Err(LookupError::NotFound));
        let service = service(search, KeyPolicy::Exact);

        assert!(matches!(
            service.lookup(1.0, 2.0).await,
            Err(LookupError::NotFound)
        ));
        assert!(matches!(
            service.lookup(1.0, 2.0).await,
            Err(LookupError::NotFound)
        ));
        assert!(service.locks().is_empty());
    }

    #[tokio::test]
    async fn test_rounded_policy_shares_results() {
        let mut search = MockStationSearch::new();
        search
            .expect_nearest()
            .times(1)
            .returning(|_, _| Ok(found("A")));
        let service = service(search, KeyPolicy::Rounded { decimals: 3 });

        service.lookup(1.00001, 2.0).await.unwrap();
        service.lookup(1.00002, 2.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_with_real_index() {
        let index = StationIndex::new(vec![
            Station::new("A", 0.0, 0.0, JsonObject::new()),
            Station::new("B", 0.0, 1.0, JsonObject::new()),
        ]);
        let service = service(index, KeyPolicy::Exact);

        assert_eq!(service.lookup(0.0, 0.4).await.unwrap().station.id, "A");
        assert_eq!(service.lookup(0.0, 0.6).await.unwrap().station.id, "B");
        assert_eq!(service.lookup(0.0, 0.4).await.unwrap().station.id, "A");
    }

    #[tokio::test]
    async fn test_empty_index_is_not_found() {
        let service = service(StationIndex::default(), KeyPolicy::Exact);
        assert!(matches!(
            service.lookup(0.0, 0.0).await,
            Err(LookupError::NotFound)
        ));
    }
}
