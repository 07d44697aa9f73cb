mod client;
mod config;
mod dispatch;
mod error;
mod failure;
mod introspection;
mod keys;
mod process;
mod queue;
mod reschedule;
mod store;
mod task;
mod worker;

pub use self::{
    client::Client,
    config::QueueConfig,
    error::Error,
    failure::{BlockDirective, HandlerFailure},
    introspection::{BlockedSummary, Statistics},
    queue::Queue,
    task::Args,
    worker::{TaskHandler, WorkerHandle},
};

#[cfg(all(test, feature = "test_redis"))]
mod tests {
    use std::{
        future::Future,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use async_trait::async_trait;
    use fairy_graceful_shutdown::GracefulShutdown;
    use futures::FutureExt;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::*;

    fn test_config() -> QueueConfig {
        QueueConfig {
            polling_interval: std::time::Duration::from_millis(2),
            retry_delay: std::time::Duration::from_millis(5),
            retry_limit: 2,
            recent_size: 10,
            slowest_size: 10,
        }
    }

    /// Run `test` against a uniquely-named queue, then scan and delete every key it
    /// touched, mirroring `queues/lib.rs`'s `run_queue_test` harness.
    async fn run_queue_test<T, Fut>(test: T)
    where
        T: FnOnce(Queue) -> Fut,
        Fut: Future<Output = ()>,
    {
        dotenv::dotenv().ok();
        let queue_name = format!("test-{}", uuid::Uuid::new_v4());
        let client = Client::connect(None, None, None).expect("REDIS_URL must be set for redis-gated tests");
        let queue = client.queue(&queue_name, test_config());

        let result = std::panic::AssertUnwindSafe(test(queue.clone()))
            .catch_unwind()
            .await;

        let mut conn = queue.conn().await.expect("cleanup: acquiring connection");
        let key_pattern = format!("FAIRY:*:{}*", queue_name);
        let mut cmd = redis::cmd("SCAN");
        let mut iter: redis::AsyncIter<String> = cmd
            .cursor_arg(0)
            .arg("MATCH")
            .arg(&key_pattern)
            .arg("COUNT")
            .arg(100)
            .clone()
            .iter_async(&mut *conn)
            .await
            .expect("cleanup: scanning keyspace");

        let mut del_cmd = redis::cmd("DEL");
        let mut any = false;
        while let Some(key) = iter.next_item().await {
            del_cmd.arg(&key);
            any = true;
        }
        if any {
            del_cmd
                .query_async::<_, ()>(&mut conn)
                .await
                .expect("cleanup: deleting keys");
        }

        redis::cmd("SREM")
            .arg(keys::QUEUES_KEY)
            .arg(&queue_name)
            .query_async::<_, ()>(&mut conn)
            .await
            .ok();

        result.expect("test panicked");
    }

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    #[async_trait]
    impl TaskHandler for RecordingHandler {
        async fn handle(&self, args: &[serde_json::Value]) -> Result<(), HandlerFailure> {
            self.seen.lock().await.push(args[1].clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn single_group_tasks_run_in_order() {
        run_queue_test(|queue| async move {
            for i in 0..5 {
                queue.enqueue(vec![json!("g1"), json!(i)]).await.unwrap();
            }

            let seen = Arc::new(Mutex::new(Vec::new()));
            let shutdown = GracefulShutdown::new();
            let handle = queue.register_worker(RecordingHandler { seen: seen.clone() }, shutdown.consumer(), None);

            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            handle.stop().await.unwrap();

            let seen = seen.lock().await;
            let expected: Vec<serde_json::Value> = (0..5).map(|i| json!(i)).collect();
            assert_eq!(*seen, expected);
        })
        .await;
    }

    #[tokio::test]
    async fn cross_group_tasks_run_concurrently() {
        run_queue_test(|queue| async move {
            queue.enqueue(vec![json!("a"), json!(1)]).await.unwrap();
            queue.enqueue(vec![json!("b"), json!(2)]).await.unwrap();

            let seen = Arc::new(Mutex::new(Vec::new()));
            let shutdown = GracefulShutdown::new();
            let h1 = queue.register_worker(RecordingHandler { seen: seen.clone() }, shutdown.consumer(), None);
            let h2 = queue.register_worker(RecordingHandler { seen: seen.clone() }, shutdown.consumer(), None);

            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            h1.stop().await.unwrap();
            h2.stop().await.unwrap();

            assert_eq!(seen.lock().await.len(), 2);
        })
        .await;
    }

    struct FlakyHandler {
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler for FlakyHandler {
        async fn handle(&self, _args: &[serde_json::Value]) -> Result<(), HandlerFailure> {
            if self.failures_left.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(HandlerFailure::new("not yet"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds_within_limit() {
        run_queue_test(|queue| async move {
            queue.enqueue(vec![json!("g1"), json!("x")]).await.unwrap();

            let shutdown = GracefulShutdown::new();
            let handle = queue.register_worker(
                FlakyHandler { failures_left: AtomicUsize::new(2) },
                shutdown.consumer(),
                None,
            );

            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            handle.stop().await.unwrap();

            let stats = queue.statistics().await.unwrap();
            assert_eq!(stats.finished, 1);
            assert_eq!(stats.failed_tasks, 0);
        })
        .await;
    }

    struct AlwaysBlocks;

    #[async_trait]
    impl TaskHandler for AlwaysBlocks {
        async fn handle(&self, _args: &[serde_json::Value]) -> Result<(), HandlerFailure> {
            Err(HandlerFailure::block_after_retry("nope"))
        }
    }

    #[tokio::test]
    async fn block_after_retry_archives_and_blocks_group() {
        run_queue_test(|queue| async move {
            queue.enqueue(vec![json!("g1"), json!("x")]).await.unwrap();

            let shutdown = GracefulShutdown::new();
            let handle = queue.register_worker(AlwaysBlocks, shutdown.consumer(), None);

            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            handle.stop().await.unwrap();

            let blocked = queue.blocked_groups().await.unwrap();
            assert_eq!(blocked, vec!["g1".to_string()]);
            let failed = queue.failed_tasks().await.unwrap();
            assert_eq!(failed.len(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn reschedule_recovers_blocked_and_failed_work() {
        run_queue_test(|queue| async move {
            queue.enqueue(vec![json!("g1"), json!("x")]).await.unwrap();

            let shutdown = GracefulShutdown::new();
            let handle = queue.register_worker(AlwaysBlocks, shutdown.consumer(), None);
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            handle.stop().await.unwrap();

            assert_eq!(queue.blocked_groups().await.unwrap().len(), 1);

            let requeued = queue.reschedule().await.unwrap();
            assert_eq!(requeued, 1);
            assert!(queue.blocked_groups().await.unwrap().is_empty());
            assert!(queue.failed_tasks().await.unwrap().is_empty());
        })
        .await;
    }

    struct AlwaysFails;

    #[async_trait]
    impl TaskHandler for AlwaysFails {
        async fn handle(&self, _args: &[serde_json::Value]) -> Result<(), HandlerFailure> {
            Err(HandlerFailure::new("permanent"))
        }
    }

    #[tokio::test]
    async fn non_blocking_failure_drains_group_and_counts_as_finished() {
        run_queue_test(|queue| async move {
            queue.enqueue(vec![json!("g1"), json!(1)]).await.unwrap();
            queue.enqueue(vec![json!("g1"), json!(2)]).await.unwrap();

            let shutdown = GracefulShutdown::new();
            let handle = queue.register_worker(AlwaysFails, shutdown.consumer(), None);
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            handle.stop().await.unwrap();

            let failed = queue.failed_tasks().await.unwrap();
            assert_eq!(failed.len(), 2);
            let stats = queue.statistics().await.unwrap();
            assert_eq!(stats.finished, 2);
            assert!(queue.blocked_groups().await.unwrap().is_empty());
        })
        .await;
    }
}
