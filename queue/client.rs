//! `Client` owns the redis pool and a per-process `Queue` cache, so a named queue is
//! created once and handed out from there on rather than living behind a hidden
//! module-level singleton.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use fairy_database::RedisPool;

use crate::{config::QueueConfig, error::Error, introspection::Statistics, keys, queue::Queue, store};

/// Shared entry point: one `Client` per redis-compatible store, any number of named
/// queues created lazily from it.
#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

struct ClientInner {
    pool: RedisPool,
    queues: Mutex<HashMap<String, Queue>>,
}

impl Client {
    /// Connect to the store. `host: None` falls back to `REDIS_URL`, matching
    /// [`fairy_database::RedisPool::new`].
    pub fn connect(host: Option<&str>, port: Option<u16>, password: Option<&str>) -> Result<Client, Error> {
        let pool = RedisPool::new(host, port, password)?;
        Ok(Client(Arc::new(ClientInner {
            pool,
            queues: Mutex::new(HashMap::new()),
        })))
    }

    /// Wrap an already-built pool, e.g. one shared with other parts of an embedding
    /// application.
    pub fn from_pool(pool: RedisPool) -> Client {
        Client(Arc::new(ClientInner {
            pool,
            queues: Mutex::new(HashMap::new()),
        }))
    }

    /// Get or create a named queue, caching the handle for subsequent calls. The queue
    /// is registered into the global `FAIRY:QUEUES` set the first time it enqueues a
    /// task, not here — this method alone never touches the store. Later calls ignore
    /// `config` once a queue is cached.
    pub fn queue(&self, name: &str, config: QueueConfig) -> Queue {
        let mut queues = self.0.queues.lock().expect("queue registry poisoned");
        if let Some(existing) = queues.get(name) {
            return existing.clone();
        }

        let queue = Queue::new(self.0.pool.clone(), name, config);
        queues.insert(name.to_string(), queue.clone());
        queue
    }

    /// List every queue name ever registered against this store, including ones
    /// created by other processes.
    pub async fn queues(&self) -> Result<Vec<String>, Error> {
        let mut conn = self.0.pool.get().await?;
        store::set_members(&mut conn, keys::QUEUES_KEY).await
    }

    /// Aggregate [`Queue::statistics`] across every registered queue, for a dashboard
    /// that doesn't know queue names in advance.
    pub async fn statistics(&self) -> Result<Vec<(String, Statistics)>, Error> {
        let names = self.queues().await?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let config = {
                let queues = self.0.queues.lock().expect("queue registry poisoned");
                queues.get(&name).map(|q| q.config().clone())
            };
            let config = config.unwrap_or_default();
            let queue = self.queue(&name, config);
            let stats = queue.statistics().await?;
            out.push((name, stats));
        }
        Ok(out)
    }
}
