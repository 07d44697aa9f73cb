//! The failure path and its error taxonomy: bounded retries, then either archive-and-
//! block or archive-and-skip, depending on the directive the handler attaches to its
//! error.

use chrono::Utc;
use tracing::{event, Level};

use crate::{
    error::Error,
    process::{self, NextInGroup, TaskInvocation},
    queue::Queue,
    task,
};

/// What a failing handler asks the engine to do, the idiomatic-Rust replacement for
/// the JS `{ do: "block" | "block-after-retry" }` error shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDirective {
    /// Archive immediately and block the group; no retries.
    Block,
    /// Retry up to the configured limit, then archive and block.
    BlockAfterRetry,
}

/// The error a handler returns. `directive: None` (the default, via [`HandlerFailure::new`])
/// retries up to the limit, then archives and quietly drains the group.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub message: String,
    pub directive: Option<BlockDirective>,
}

impl HandlerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerFailure {
            message: message.into(),
            directive: None,
        }
    }

    pub fn block(message: impl Into<String>) -> Self {
        HandlerFailure {
            message: message.into(),
            directive: Some(BlockDirective::Block),
        }
    }

    pub fn block_after_retry(message: impl Into<String>) -> Self {
        HandlerFailure {
            message: message.into(),
            directive: Some(BlockDirective::BlockAfterRetry),
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerFailure {}

/// What the worker loop should do next after [`handle_failure`] runs.
pub(crate) enum FailureAction {
    /// Archived and blocked; the group is stuck until `reschedule`. Return to dispatch.
    Blocked,
    /// Retries remain; sleep `retry_delay` and re-invoke the handler on the same task.
    Retry,
    /// Retries exhausted with no blocking directive: archived, and the group was
    /// drained via the success path. Continue with the reported successor, if any.
    SkippedAndDrained(NextInGroup),
}

/// Run the failure-path decision table.
pub(crate) async fn handle_failure(
    queue: &Queue,
    invocation: &mut TaskInvocation,
    failure: HandlerFailure,
) -> Result<FailureAction, Error> {
    invocation.errors.push(failure.message.clone());

    match failure.directive {
        Some(BlockDirective::Block) => {
            archive(queue, invocation).await?;
            mark_blocked(queue, invocation).await?;
            event!(Level::WARN, queue = %queue.name(), group = %invocation.group, "group blocked");
            Ok(FailureAction::Blocked)
        }
        Some(BlockDirective::BlockAfterRetry) => {
            if take_retry(invocation) {
                Ok(FailureAction::Retry)
            } else {
                archive(queue, invocation).await?;
                mark_blocked(queue, invocation).await?;
                event!(Level::WARN, queue = %queue.name(), group = %invocation.group, "group blocked after exhausting retries");
                Ok(FailureAction::Blocked)
            }
        }
        None => {
            if take_retry(invocation) {
                Ok(FailureAction::Retry)
            } else {
                archive(queue, invocation).await?;
                event!(Level::WARN, queue = %queue.name(), group = %invocation.group, "task archived, draining group");
                let next = process::retire_head(queue, invocation).await?;
                Ok(FailureAction::SkippedAndDrained(next))
            }
        }
    }
}

/// Decrement the retry budget, returning `true` if another attempt remains.
fn take_retry(invocation: &mut TaskInvocation) -> bool {
    if invocation.retry_count == 0 {
        return false;
    }
    invocation.retry_count -= 1;
    true
}

async fn archive(queue: &Queue, invocation: &TaskInvocation) -> Result<(), Error> {
    let mut conn = queue.conn().await?;
    let now = Utc::now().timestamp_millis();
    let record = task::encode_failed(&invocation.args, invocation.queued_time, now, &invocation.errors)?;
    redis::cmd("RPUSH")
        .arg(queue.keys().failed())
        .arg(record)
        .query_async::<_, ()>(&mut conn)
        .await?;
    Ok(())
}

async fn mark_blocked(queue: &Queue, invocation: &TaskInvocation) -> Result<(), Error> {
    let mut conn = queue.conn().await?;
    redis::pipe()
        .cmd("HDEL")
        .arg(queue.keys().processing())
        .arg(&invocation.processing_token)
        .cmd("SADD")
        .arg(queue.keys().blocked())
        .arg(&invocation.group)
        .query_async::<_, ()>(&mut conn)
        .await?;
    Ok(())
}
