use std::{env, ops::Deref, sync::Arc};

use crate::error::Error;

/// Pooled connection handle to a single redis-compatible store.
///
/// Cloning a `RedisPool` is cheap; all clones share the same underlying
/// `deadpool_redis::Pool`.
#[derive(Clone)]
pub struct RedisPool(Arc<RedisPoolInner>);

struct RedisPoolInner {
    pool: deadpool_redis::Pool,
}

impl Deref for RedisPool {
    type Target = deadpool_redis::Pool;

    fn deref(&self) -> &Self::Target {
        &self.0.pool
    }
}

impl RedisPool {
    /// Build a connection pool from an explicit host/port/password, falling back to
    /// `REDIS_URL` when `host` is `None`.
    pub fn new(host: Option<&str>, port: Option<u16>, password: Option<&str>) -> Result<RedisPool, Error> {
        let url = match host {
            Some(host) => {
                let port = port.unwrap_or(6379);
                match password {
                    Some(password) => format!("redis://:{}@{}:{}", password, host, port),
                    None => format!("redis://{}:{}", host, port),
                }
            }
            None => env::var("REDIS_URL")
                .map_err(|_| Error::ConfigError("REDIS_URL is required when no host is given".to_string()))?,
        };

        Self::from_url(url)
    }

    /// Build a connection pool directly from a `redis://` URL.
    pub fn from_url(url: impl Into<String>) -> Result<RedisPool, Error> {
        let pool = deadpool_redis::Config {
            url: Some(url.into()),
            connection: None,
            pool: None,
        }
        .create_pool()?;

        Ok(RedisPool(Arc::new(RedisPoolInner { pool })))
    }

    pub fn pool(&self) -> &deadpool_redis::Pool {
        &self.0.pool
    }

    pub async fn get(&self) -> Result<deadpool_redis::Connection, Error> {
        self.0.pool.get().await.map_err(Error::from)
    }
}
