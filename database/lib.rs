mod error;
mod pool;

pub use error::Error;
pub use pool::RedisPool;
