/// Login guard
///
/// Per-address failed-attempt counter with a timed block. State lives in an
/// [`AttemptStore`] under two keys per address, both expiring after the
/// block window:
///
/// - `login:attempts:{ip}` counts failures, its TTL starting at the first one
/// - `login:block:{ip}` holds the JSON [`BlockRecord`] once the threshold is hit
///
/// While a block exists the caller must not check credentials at all.

pub mod redis;
pub mod store;

pub use self::redis::RedisAttemptStore;
pub use store::{AttemptStore, MemoryAttemptStore};

use crate::{
    clock::Clock,
    config::LoginGuardConfig,
    error::{AppError, AppResult},
    metrics,
};
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tracing::{debug, info, warn};

/// Attempts against the store before a transient failure is surfaced
const STORE_ATTEMPTS: u32 = 3;

const BLOCK_MESSAGES: &[&str] = &[
    "Patience is bitter, but its fruit is sweet.",
    "Slow down. Even rivers reach the sea by waiting.",
    "A locked door is a good moment to remember the right key.",
    "Rest a while; the form will still be here when you return.",
    "He that can have patience can have what he will.",
    "Take a breath. Typing faster will not make the password right.",
];

/// Stored block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub ip: String,
    pub message: String,
    pub blocked_at: DateTime<Utc>,
    pub blocked_until: DateTime<Utc>,
}

/// Block as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub ip: String,
    pub message: String,
    pub blocked_at: DateTime<Utc>,
    pub blocked_until: DateTime<Utc>,
    pub retry_after_seconds: i64,
}

impl BlockContext {
    fn from_record(record: BlockRecord, now: DateTime<Utc>) -> Self {
        let retry_after_seconds = (record.blocked_until - now).num_seconds().max(0);
        Self {
            ip: record.ip,
            message: record.message,
            blocked_at: record.blocked_at,
            blocked_until: record.blocked_until,
            retry_after_seconds,
        }
    }
}

/// Outcome of a login attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LoginDecision {
    Success,
    Unauthorized { remaining_attempts: u32 },
    Blocked { context: BlockContext },
}

#[derive(Clone)]
pub struct LoginGuard {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    config: LoginGuardConfig,
}

impl LoginGuard {
    pub fn new(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>, config: LoginGuardConfig) -> Self {
        Self { store, clock, config }
    }

    fn attempts_key(ip: &str) -> String {
        format!("login:attempts:{}", ip)
    }

    fn block_key(ip: &str) -> String {
        format!("login:block:{}", ip)
    }

    /// Active block for `ip`, if any
    pub async fn check(&self, ip: &str) -> AppResult<Option<BlockContext>> {
        let key = Self::block_key(ip);
        let raw = self.with_retry("get", || self.store.get(&key)).await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let record: BlockRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding unreadable block record for {}: {}", ip, e);
                self.with_retry("delete", || self.store.delete(std::slice::from_ref(&key)))
                    .await?;
                return Ok(None);
            }
        };

        let now = self.clock.now();
        if record.blocked_until <= now {
            // Store TTLs are second-granular; the record's own bound wins
            return Ok(None);
        }

        Ok(Some(BlockContext::from_record(record, now)))
    }

    /// Count a credential failure, blocking once the threshold is reached
    pub async fn record_failure(&self, ip: &str) -> AppResult<LoginDecision> {
        let window = self.config.block_window_secs;
        let attempts_key = Self::attempts_key(ip);

        let count = self
            .with_retry("increment", || self.store.increment(&attempts_key, window))
            .await?;
        let max_attempts = i64::from(self.config.max_attempts);

        if count < max_attempts {
            let remaining_attempts = (max_attempts - count) as u32;
            info!("Failed login from {} ({} attempts left)", ip, remaining_attempts);
            return Ok(LoginDecision::Unauthorized { remaining_attempts });
        }

        let blocked_at = self.clock.now();
        let message = BLOCK_MESSAGES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("Too many failed attempts.")
            .to_string();
        let record = BlockRecord {
            ip: ip.to_string(),
            message,
            blocked_at,
            blocked_until: blocked_at + Duration::seconds(window as i64),
        };

        let payload = serde_json::to_string(&record)
            .map_err(|e| AppError::Internal(format!("Block record serialization failed: {}", e)))?;
        let block_key = Self::block_key(ip);
        self.with_retry("set_ex", || self.store.set_ex(&block_key, payload.clone(), window))
            .await?;

        warn!(
            "Blocked {} after {} failed logins until {}",
            ip, count, record.blocked_until
        );

        Ok(LoginDecision::Blocked {
            context: BlockContext::from_record(record, blocked_at),
        })
    }

    /// Forget failures and any block for `ip`
    pub async fn record_success(&self, ip: &str) -> AppResult<()> {
        let keys = [Self::attempts_key(ip), Self::block_key(ip)];
        self.with_retry("delete", || self.store.delete(&keys)).await
    }

    /// Retry transient store failures; other errors pass through
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(AppError::Cache(e)) if attempt < STORE_ATTEMPTS => {
                    debug!("Attempt store {} failed (attempt {}): {}", operation, attempt, e);
                    metrics::record_store_retry(operation);
                    tokio::time::sleep(std::time::Duration::from_millis(25 * u64::from(attempt))).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
