use std::time::Duration;

/// Per-queue tuning. Mirrors the defaults called out in the store's external-interface
/// contract: a 5ms idle poll, a 100ms retry backoff, two retries before a task is
/// archived, and ten-entry `RECENT`/`SLOWEST` windows.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub polling_interval: Duration,
    pub retry_delay: Duration,
    pub retry_limit: u32,
    pub recent_size: usize,
    pub slowest_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            polling_interval: Duration::from_millis(5),
            retry_delay: Duration::from_millis(100),
            retry_limit: 2,
            recent_size: 10,
            slowest_size: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_5ms_100ms_2_retries_10_10() {
        let config = QueueConfig::default();
        assert_eq!(config.polling_interval, Duration::from_millis(5));
        assert_eq!(config.retry_delay, Duration::from_millis(100));
        assert_eq!(config.retry_limit, 2);
        assert_eq!(config.recent_size, 10);
        assert_eq!(config.slowest_size, 10);
    }
}
