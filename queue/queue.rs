use std::sync::Arc;

use chrono::Utc;
use tracing::{event, Level};

use crate::{
    config::QueueConfig,
    error::Error,
    keys::{self, QueueKeys},
    task::{self, Args},
};

/// A named queue handle: configuration plus key derivation, cheaply `Clone`-able and
/// shared across every worker registered against it.
#[derive(Clone)]
pub struct Queue(pub(crate) Arc<QueueInner>);

pub(crate) struct QueueInner {
    pub(crate) pool: fairy_database::RedisPool,
    pub(crate) name: String,
    pub(crate) keys: QueueKeys,
    pub(crate) config: QueueConfig,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.0.name)
            .field("config", &self.0.config)
            .finish()
    }
}

impl Queue {
    pub(crate) fn new(pool: fairy_database::RedisPool, name: &str, config: QueueConfig) -> Queue {
        Queue(Arc::new(QueueInner {
            pool,
            keys: QueueKeys::new(name),
            name: name.to_string(),
            config,
        }))
    }

    pub fn name(&self) -> &str {
        self.0.name.as_str()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.0.config
    }

    /// Append `args` to `SOURCE` and increment `STATISTICS.total`. No validation beyond
    /// store acceptance, no deduplication; ordering of concurrent enqueues is the
    /// store's list-append order.
    pub async fn enqueue(&self, args: Args) -> Result<(), Error> {
        let mut conn = self.0.pool.get().await?;
        let encoded = task::encode_with_timestamp(&args, Utc::now().timestamp_millis())?;

        redis::pipe()
            .cmd("RPUSH")
            .arg(self.0.keys.source())
            .arg(&encoded)
            .cmd("HINCRBY")
            .arg(self.0.keys.statistics())
            .arg("total")
            .arg(1)
            .cmd("SADD")
            .arg(keys::QUEUES_KEY)
            .arg(&self.0.name)
            .query_async::<_, ()>(&mut conn)
            .await?;

        event!(Level::DEBUG, queue = %self.0.name, "enqueued task");
        Ok(())
    }

    /// Enqueue several tasks as a single round-trip.
    pub async fn enqueue_multiple(&self, items: Vec<Args>) -> Result<(), Error> {
        if items.is_empty() {
            return Ok(());
        }

        let mut conn = self.0.pool.get().await?;
        let now = Utc::now().timestamp_millis();
        let mut pipe = redis::pipe();
        for args in &items {
            let encoded = task::encode_with_timestamp(args, now)?;
            pipe.cmd("RPUSH").arg(self.0.keys.source()).arg(encoded);
        }
        pipe.cmd("HINCRBY")
            .arg(self.0.keys.statistics())
            .arg("total")
            .arg(items.len() as i64)
            .cmd("SADD")
            .arg(keys::QUEUES_KEY)
            .arg(&self.0.name);

        pipe.query_async::<_, ()>(&mut conn).await?;

        event!(Level::DEBUG, queue = %self.0.name, count = items.len(), "enqueued tasks");
        Ok(())
    }

    pub(crate) fn keys(&self) -> &QueueKeys {
        &self.0.keys
    }

    pub(crate) async fn conn(&self) -> Result<deadpool_redis::Connection, Error> {
        Ok(self.0.pool.get().await?)
    }
}
