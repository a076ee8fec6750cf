/// Redis-backed attempt store
///
/// Shares login counters and blocks between service instances.
use super::store::AttemptStore;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct RedisAttemptStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisAttemptStore {
    pub async fn connect(redis_url: &str, key_prefix: &str) -> AppResult<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = Client::open(redis_url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::Cache(format!("Redis client creation failed: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            AppError::Cache(format!("Redis connection failed: {}", e))
        })?;

        info!("✓ Redis connection established");

        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(|e| {
            error!("Redis PING failed: {}", e);
            AppError::Cache(format!("Redis ping failed: {}", e))
        })?;

        if pong != "PONG" {
            return Err(AppError::Cache("Unexpected Redis PING response".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl AttemptStore for RedisAttemptStore {
    async fn increment(&self, key: &str, ttl_secs: u64) -> AppResult<i64> {
        let store_key = self.build_key(key);
        debug!("Redis INCR: {} (TTL: {}s)", store_key, ttl_secs);

        let mut conn = self.connection.clone();

        let count: i64 = conn.incr(&store_key, 1).await.map_err(|e| {
            warn!("Redis INCR failed for {}: {}", store_key, e);
            AppError::Cache(format!("Counter increment failed: {}", e))
        })?;

        // The window starts with the first failure
        if count == 1 {
            conn.expire::<_, ()>(&store_key, ttl_secs as i64)
                .await
                .map_err(|e| {
                    warn!("Redis EXPIRE failed for {}: {}", store_key, e);
                    AppError::Cache(format!("Counter expire failed: {}", e))
                })?;
        }

        Ok(count)
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let store_key = self.build_key(key);
        debug!("Redis GET: {}", store_key);

        let mut conn = self.connection.clone();
        conn.get(&store_key).await.map_err(|e| {
            warn!("Redis GET failed for {}: {}", store_key, e);
            AppError::Cache(format!("Get failed: {}", e))
        })
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> AppResult<()> {
        let store_key = self.build_key(key);
        debug!("Redis SET: {} (TTL: {}s)", store_key, ttl_secs);

        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(&store_key, value, ttl_secs)
            .await
            .map_err(|e| {
                warn!("Redis SET failed for {}: {}", store_key, e);
                AppError::Cache(format!("Set failed: {}", e))
            })
    }

    async fn delete(&self, keys: &[String]) -> AppResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let store_keys: Vec<String> = keys.iter().map(|k| self.build_key(k)).collect();
        debug!("Redis DEL: {:?}", store_keys);

        let mut conn = self.connection.clone();
        conn.del::<_, ()>(&store_keys).await.map_err(|e| {
            warn!("Redis DEL failed for {:?}: {}", store_keys, e);
            AppError::Cache(format!("Delete failed: {}", e))
        })
    }
}
