// libs/appointment-cell/src/services/cache.rs
use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::models::SlotBucket;

/// Per-hospital generation. Every invalidation moves it forward, and a snapshot
/// is only served under the generation it was read in.
pub type CacheStamp = u64;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis pool error: {0}")]
    Pool(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(Vec<SlotBucket>),
    /// Nothing fresh. Read the ledger, then `put` under this stamp.
    Miss(CacheStamp),
    /// Caching is off or the shared store is unreachable.
    Unavailable,
}

struct CachedRange {
    fetched_at: Instant,
    buckets: Vec<SlotBucket>,
}

#[derive(Default)]
struct LocalStore {
    versions: HashMap<String, CacheStamp>,
    entries: HashMap<(String, NaiveDate, NaiveDate), (CacheStamp, CachedRange)>,
}

enum Store {
    Local(RwLock<LocalStore>),
    Redis(Pool),
}

/// Short-lived snapshots of range counts for calendar views.
///
/// Advisory only: nothing that decides whether a booking fits reads from here.
/// With `REDIS_URL` set, snapshots and generations live in Redis so every worker
/// sees every invalidation.
pub struct AvailabilityCache {
    ttl: Duration,
    store: Store,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            store: Store::Local(RwLock::new(LocalStore::default())),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Builds the pool without connecting; an unreachable server surfaces later
    /// as `CacheLookup::Unavailable`.
    pub fn with_redis(ttl: Duration, redis_url: &str) -> Result<Self, CacheError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Pool(e.to_string()))?;

        Ok(Self {
            ttl,
            store: Store::Redis(pool),
        })
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let ttl = Duration::from_secs(config.availability_cache_ttl_secs);
        match config.redis_url.as_deref() {
            Some(url) if !ttl.is_zero() => match Self::with_redis(ttl, url) {
                Ok(cache) => {
                    info!("Availability cache: Redis, ttl {}s", ttl.as_secs());
                    cache
                }
                Err(e) => {
                    warn!("{}, using per-process availability cache", e);
                    Self::new(ttl)
                }
            },
            _ => Self::new(ttl),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.store, Store::Redis(_))
    }

    pub async fn lookup(&self, hospital_id: &str, from: NaiveDate, to: NaiveDate) -> CacheLookup {
        if !self.is_enabled() {
            return CacheLookup::Unavailable;
        }

        match &self.store {
            Store::Local(local) => {
                let local = local.read().await;
                let stamp = local.versions.get(hospital_id).copied().unwrap_or(0);
                local
                    .entries
                    .get(&(hospital_id.to_string(), from, to))
                    .filter(|(cached_stamp, cached)| *cached_stamp == stamp && cached.fetched_at.elapsed() < self.ttl)
                    .map_or(CacheLookup::Miss(stamp), |(_, cached)| CacheLookup::Hit(cached.buckets.clone()))
            }
            Store::Redis(pool) => match redis_lookup(pool, hospital_id, from, to).await {
                Ok(lookup) => lookup,
                Err(e) => {
                    warn!("Availability cache read failed for {}: {}", hospital_id, e);
                    CacheLookup::Unavailable
                }
            },
        }
    }

    /// Stores a snapshot read under `stamp`. If the hospital was invalidated
    /// since, the snapshot is dropped (local) or lands under a generation no
    /// reader asks for (Redis).
    pub async fn put(
        &self,
        hospital_id: &str,
        stamp: CacheStamp,
        from: NaiveDate,
        to: NaiveDate,
        buckets: Vec<SlotBucket>,
    ) {
        if !self.is_enabled() {
            return;
        }

        match &self.store {
            Store::Local(local) => {
                let mut local = local.write().await;
                if local.versions.get(hospital_id).copied().unwrap_or(0) != stamp {
                    debug!("Discarding stale snapshot for {} {}..={}", hospital_id, from, to);
                    return;
                }

                let ttl = self.ttl;
                local.entries.retain(|_, (_, cached)| cached.fetched_at.elapsed() < ttl);
                local.entries.insert(
                    (hospital_id.to_string(), from, to),
                    (stamp, CachedRange { fetched_at: Instant::now(), buckets }),
                );
            }
            Store::Redis(pool) => {
                if let Err(e) = redis_put(pool, self.ttl, hospital_id, stamp, from, to, &buckets).await {
                    warn!("Availability cache write failed for {}: {}", hospital_id, e);
                }
            }
        }
    }

    /// Retires every snapshot for the hospital, including ones still being read.
    pub async fn invalidate(&self, hospital_id: &str) {
        if !self.is_enabled() {
            return;
        }

        match &self.store {
            Store::Local(local) => {
                let mut local = local.write().await;
                let version = local.versions.entry(hospital_id.to_string()).or_insert(0);
                *version = version.wrapping_add(1);

                let before = local.entries.len();
                local.entries.retain(|(cached_hospital, _, _), _| cached_hospital != hospital_id);
                debug!("Invalidated {} cached ranges for {}", before - local.entries.len(), hospital_id);
            }
            Store::Redis(pool) => {
                let bumped = async {
                    let mut conn = connection(pool).await?;
                    let version: CacheStamp = conn.incr(version_key(hospital_id), 1).await?;
                    Ok::<_, CacheError>(version)
                };
                match bumped.await {
                    Ok(version) => debug!("Availability cache for {} now at generation {}", hospital_id, version),
                    Err(e) => warn!("Availability cache invalidation failed for {}: {}", hospital_id, e),
                }
            }
        }
    }
}

fn version_key(hospital_id: &str) -> String {
    format!("availability:{}:version", hospital_id)
}

fn range_key(hospital_id: &str, stamp: CacheStamp, from: NaiveDate, to: NaiveDate) -> String {
    format!("availability:{}:{}:{}:{}", hospital_id, stamp, from, to)
}

async fn connection(pool: &Pool) -> Result<Connection, CacheError> {
    pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))
}

async fn redis_lookup(
    pool: &Pool,
    hospital_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<CacheLookup, CacheError> {
    let mut conn = connection(pool).await?;
    let stamp: Option<CacheStamp> = conn.get(version_key(hospital_id)).await?;
    let stamp = stamp.unwrap_or(0);

    let cached: Option<String> = conn.get(range_key(hospital_id, stamp, from, to)).await?;
    match cached {
        Some(raw) => Ok(CacheLookup::Hit(serde_json::from_str(&raw)?)),
        None => Ok(CacheLookup::Miss(stamp)),
    }
}

async fn redis_put(
    pool: &Pool,
    ttl: Duration,
    hospital_id: &str,
    stamp: CacheStamp,
    from: NaiveDate,
    to: NaiveDate,
    buckets: &[SlotBucket],
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(buckets)?;
    let mut conn = connection(pool).await?;
    let _: () = redis::cmd("SET")
        .arg(range_key(hospital_id, stamp, from, to))
        .arg(raw)
        .arg("EX")
        .arg(ttl.as_secs().max(1))
        .query_async(&mut conn)
        .await?;
    Ok(())
}
