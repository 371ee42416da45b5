use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// Thin async Redis client used for hot task reads.
///
/// `MultiplexedConnection` is cheap to clone and pipelines concurrent
/// requests, so each call works on its own clone.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    prefix: String,
}

impl RedisCache {
    /// Create new Redis cache client
    pub async fn new(redis_url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            connection,
            prefix: prefix.into(),
        })
    }

    /// Namespaced key for `name`
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Set a key-value pair with expiration (in seconds)
    pub async fn set_ex(&self, key: &str, value: &str, expiration_secs: u64) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, expiration_secs)
            .await
            .context("Failed to set Redis key with expiration")?;
        Ok(())
    }

    /// Get a value by key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let val: Option<String> = conn.get(key).await.context("Failed to get Redis key")?;
        Ok(val)
    }

    /// Delete a key
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key)
            .await
            .context("Failed to delete Redis key")?;
        Ok(())
    }

    /// Store a JSON value with expiration
    pub async fn set_json_ex<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        expiration_secs: u64,
    ) -> Result<()> {
        let json_str =
            serde_json::to_string(value).context("Failed to serialize value to JSON")?;
        self.set_ex(key, &json_str, expiration_secs).await
    }

    /// Get and deserialize a JSON value
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(json_str) => {
                let value = serde_json::from_str(&json_str)
                    .context("Failed to deserialize JSON from Redis")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Ping Redis to check connection
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Failed to ping Redis")?;
        Ok(())
    }
}
