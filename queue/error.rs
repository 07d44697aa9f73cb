use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Redis error {0}")]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] fairy_database::Error),

    #[error("Redis connection error {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    /// A list/hash/zset element could not be decoded as the positional JSON array the
    /// protocol requires. The engine treats this as a store-level fault rather than
    /// silently dropping the element.
    #[error("Malformed task in {0}: {1}")]
    MalformedTask(&'static str, String),
}
