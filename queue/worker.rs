//! Worker registration: one registered handler drives one `tokio` task running an
//! explicit `loop { }` through dispatch → process → retry/drain, rather than cyclic
//! self-scheduling tail calls for the same control flow.

use std::sync::Arc;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use fairy_graceful_shutdown::GracefulShutdownConsumer;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{event, Level};

use crate::{
    dispatch::{self, DispatchOutcome},
    failure::{self, FailureAction, HandlerFailure},
    process::{self, TaskInvocation},
    queue::Queue,
};

/// A user-supplied task handler. Receives only the user arguments (`args[0]` is still
/// the group id, kept in the slice for handlers that want it); metadata positions
/// never reach the handler.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, args: &[serde_json::Value]) -> Result<(), HandlerFailure>;
}

/// Handle to a running worker task. Dropping this has no effect on the worker — call
/// [`WorkerHandle::stop`] to ask it to exit once any in-flight task completes.
pub struct WorkerHandle {
    closer: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the worker to stop after its current task (if any) finishes, then wait for
    /// it to exit.
    pub async fn stop(mut self) -> Result<(), tokio::task::JoinError> {
        if let Some(closer) = self.closer.take() {
            let _ = closer.send(());
        }
        self.join.await
    }
}

impl Queue {
    /// The backoff applied to store errors encountered during `poll`/`process` when no
    /// caller-supplied backoff is given to [`Queue::register_worker`].
    pub fn default_backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: std::time::Duration::from_millis(50),
            initial_interval: std::time::Duration::from_millis(50),
            max_interval: std::time::Duration::from_secs(5),
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Start one worker driving `handler` against this queue. Call this `N` times to
    /// run `N` independent workers; none of them are bound to any particular group, so
    /// any idle worker can pick up any group whose head is free. `backoff` governs the
    /// retry delay after a store error during `poll`/`process`; `None` uses
    /// [`Queue::default_backoff`].
    pub fn register_worker<H: TaskHandler>(
        &self,
        handler: H,
        mut shutdown: GracefulShutdownConsumer,
        backoff: Option<Box<dyn Backoff + Send>>,
    ) -> WorkerHandle {
        let queue = self.clone();
        let handler = Arc::new(handler);
        let (closer_tx, mut closer_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut error_backoff = backoff.unwrap_or_else(|| Box::new(Queue::default_backoff()));

            loop {
                if shutdown.shutting_down() {
                    break;
                }
                if closer_rx.try_recv().is_ok() {
                    break;
                }

                match dispatch::poll(&queue).await {
                    Ok(DispatchOutcome::Dispatched {
                        group,
                        queued_key,
                        args,
                        queued_time,
                    }) => {
                        error_backoff.reset();
                        match process::start_new(&queue, group, queued_key, args, queued_time).await {
                            Ok(invocation) => {
                                run_group(&queue, handler.as_ref(), invocation).await;
                            }
                            Err(e) => {
                                event!(Level::ERROR, queue = %queue.name(), error = %e, "failed to start task");
                            }
                        }
                    }
                    Ok(DispatchOutcome::Busy) => {
                        // Another worker owns this group's head; look for other work
                        // immediately, no sleep.
                    }
                    Ok(DispatchOutcome::Empty) => {
                        tokio::select! {
                            biased;
                            _ = shutdown.wait_for_shutdown() => break,
                            _ = &mut closer_rx => break,
                            _ = tokio::time::sleep(queue.config().polling_interval) => {},
                        }
                    }
                    Err(e) => {
                        event!(Level::ERROR, queue = %queue.name(), error = %e, "dispatch error");
                        let sleep_for = error_backoff.next_backoff().unwrap_or(queue.config().polling_interval);
                        tokio::time::sleep(sleep_for).await;
                    }
                }
            }
        });

        WorkerHandle {
            closer: Some(closer_tx),
            join,
        }
    }
}

/// Drive one task to completion, then keep draining same-group successors until the
/// group is empty or blocked.
async fn run_group<H: TaskHandler>(queue: &Queue, handler: &H, mut invocation: TaskInvocation) {
    loop {
        let outcome = handler.handle(&invocation.args).await;

        match outcome {
            Ok(()) => match process::retire_head(queue, &invocation).await {
                Ok(Some((group, queued_key, args, queued_time))) => {
                    match process::start_new(queue, group, queued_key, args, queued_time).await {
                        Ok(next) => invocation = next,
                        Err(e) => {
                            event!(Level::ERROR, queue = %queue.name(), error = %e, "failed to start successor task");
                            return;
                        }
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    event!(Level::ERROR, queue = %queue.name(), error = %e, "failed to retire completed task");
                    return;
                }
            },
            Err(failure) => match failure::handle_failure(queue, &mut invocation, failure).await {
                Ok(FailureAction::Retry) => {
                    tokio::time::sleep(queue.config().retry_delay).await;
                    process::restart_attempt(&mut invocation);
                }
                Ok(FailureAction::Blocked) => return,
                Ok(FailureAction::SkippedAndDrained(Some((group, queued_key, args, queued_time)))) => {
                    match process::start_new(queue, group, queued_key, args, queued_time).await {
                        Ok(next) => invocation = next,
                        Err(e) => {
                            event!(Level::ERROR, queue = %queue.name(), error = %e, "failed to start successor task");
                            return;
                        }
                    }
                }
                Ok(FailureAction::SkippedAndDrained(None)) => return,
                Err(e) => {
                    event!(Level::ERROR, queue = %queue.name(), error = %e, "failed to record task failure");
                    return;
                }
            },
        }
    }
}
