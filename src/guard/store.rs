/// Shared ephemeral store behind the login guard
///
/// Keys expire on their own; the guard never sweeps. The in-process store
/// reads time from a [`Clock`] so expiry can be driven in tests, and drops
/// lapsed keys on writes at most once per [`SWEEP_INTERVAL_SECS`].
use crate::{clock::Clock, error::AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::debug;

/// Minimum clock time between full sweeps of the in-process map
pub const SWEEP_INTERVAL_SECS: i64 = 60;

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Atomically add one to a counter, starting its TTL when it is created
    async fn increment(&self, key: &str, ttl_secs: u64) -> AppResult<i64>;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Store a value that expires after `ttl_secs`
    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> AppResult<()>;

    async fn delete(&self, keys: &[String]) -> AppResult<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    next_sweep_at: Option<DateTime<Utc>>,
}

impl Entries {
    /// Drop every lapsed key once the sweep interval has passed
    fn sweep(&mut self, now: DateTime<Utc>) {
        if self.next_sweep_at.is_some_and(|at| now < at) {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, entry| entry.expires_at > now);
        let dropped = before - self.map.len();
        if dropped > 0 {
            debug!("Attempt store swept {} expired entries", dropped);
        }
        self.next_sweep_at = Some(now + Duration::seconds(SWEEP_INTERVAL_SECS));
    }
}

/// In-process TTL map
pub struct MemoryAttemptStore {
    entries: Mutex<Entries>,
    clock: Arc<dyn Clock>,
}

impl MemoryAttemptStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            clock,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Keys currently held, lapsed or not
    pub fn len(&self) -> usize {
        self.entries().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entry for `key`, dropping it when expired
    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            debug!("Attempt store entry expired: {}", key);
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn increment(&self, key: &str, ttl_secs: u64) -> AppResult<i64> {
        let now = self.clock.now();
        let mut entries = self.entries();
        entries.sweep(now);
        let entries = &mut entries.map;

        let count = match Self::live(entries, key, now) {
            Some(entry) => {
                let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
                entry.value = count.to_string();
                count
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + Duration::seconds(ttl_secs as i64),
                    },
                );
                1
            }
        };

        debug!("Attempt store INCR: {} = {}", key, count);
        Ok(count)
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.entries();
        Ok(Self::live(&mut entries.map, key, now).map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> AppResult<()> {
        let now = self.clock.now();
        let mut entries = self.entries();
        entries.sweep(now);
        entries.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + Duration::seconds(ttl_secs as i64),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> AppResult<()> {
        let mut entries = self.entries();
        for key in keys {
            entries.map.remove(key);
        }
        Ok(())
    }
}
