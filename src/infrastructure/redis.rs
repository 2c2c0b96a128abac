use crate::domain::CacheRepository;
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};
use tracing::{error, info};

/// Snapshot archive backed by Redis. Without a URL every call is a no-op.
pub struct RedisRepository {
    pool: Option<Pool>,
}

impl RedisRepository {
    pub fn new(url: Option<String>) -> Self {
        if let Some(redis_url) = url {
            match Config::from_url(&redis_url).create_pool(Some(Runtime::Tokio1)) {
                Ok(pool) => {
                    info!("Redis connection pool initialized");
                    Self { pool: Some(pool) }
                }
                Err(e) => {
                    error!("Failed to create Redis connection pool: {}", e);
                    Self { pool: None }
                }
            }
        } else {
            info!("Redis URL not provided, snapshot archive disabled");
            Self { pool: None }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }
}

#[async_trait]
impl CacheRepository for RedisRepository {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        if let Some(pool) = &self.pool {
            match pool.get().await {
                Ok(mut conn) => {
                    let result: Option<String> = conn.get(key).await.ok();
                    Ok(result)
                }
                Err(e) => {
                    error!("Failed to get Redis connection from pool: {}", e);
                    Ok(None)
                }
            }
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()> {
        if let Some(pool) = &self.pool {
            match pool.get().await {
                Ok(mut conn) => {
                    let _: () = conn.set_ex(key, value, ttl_seconds).await?;
                }
                Err(e) => {
                    error!("Failed to get Redis connection from pool: {}", e);
                }
            }
        }
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        let Some(pool) = &self.pool else {
            return false;
        };
        match pool.get().await {
            Ok(mut conn) => {
                let pong: Result<String, _> =
                    deadpool_redis::redis::cmd("PING").query_async(&mut conn).await;
                pong.is_ok()
            }
            Err(_) => false,
        }
    }
}
