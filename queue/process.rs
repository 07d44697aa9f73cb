//! The process loop: the explicit per-task state a worker carries through retries,
//! plus the success path ("next") that drains a finished group head and reports its
//! same-group successor, if any.

use chrono::Utc;
use tracing::{event, Level};

use crate::{error::Error, queue::Queue, store, task};

/// Owned by the worker loop for the lifetime of one task's attempts, including
/// retries, rather than threaded through closures captured by a completion
/// continuation.
pub(crate) struct TaskInvocation {
    pub group: String,
    pub queued_key: String,
    pub args: task::Args,
    pub queued_time: i64,
    pub processing_token: String,
    pub retry_count: u32,
    pub errors: Vec<String>,
    pub start_time: i64,
}

/// The next task this worker should immediately continue processing, or `None` if the
/// group drained and the worker should return to dispatch.
pub(crate) type NextInGroup = Option<(String, String, task::Args, i64)>;

/// Start a freshly-dispatched task: allocate a processing token, record it in
/// `PROCESSING`, and reset the retry budget.
pub(crate) async fn start_new(
    queue: &Queue,
    group: String,
    queued_key: String,
    args: task::Args,
    queued_time: i64,
) -> Result<TaskInvocation, Error> {
    let token = uuid::Uuid::new_v4().to_string();
    let start_time = Utc::now().timestamp_millis();

    let mut conn = queue.conn().await?;
    let encoded = task::encode_with_timestamp(&args, start_time)?;
    redis::cmd("HSET")
        .arg(queue.keys().processing())
        .arg(&token)
        .arg(encoded)
        .query_async::<_, ()>(&mut conn)
        .await?;

    Ok(TaskInvocation {
        group,
        queued_key,
        args,
        queued_time,
        processing_token: token,
        retry_count: queue.config().retry_limit,
        errors: Vec::new(),
        start_time,
    })
}

/// Stamp a fresh `start_time` before invoking the handler again (every attempt,
/// including retries, gets its own `start_time`; only the first attempt's is recorded
/// into the long-lived `PROCESSING` entry).
pub(crate) fn restart_attempt(invocation: &mut TaskInvocation) {
    invocation.start_time = Utc::now().timestamp_millis();
}

/// The success path ("next"): delete the `PROCESSING` entry, pop the drained head off
/// `QUEUED:<group>`, update statistics/`RECENT`/`SLOWEST`, and report the group's next
/// task if one is queued behind it.
///
/// Also used by the non-blocking-skip failure branch, which archives to `FAILED` and
/// then drains the group exactly as a success would.
pub(crate) async fn retire_head(queue: &Queue, invocation: &TaskInvocation) -> Result<NextInGroup, Error> {
    let mut conn = queue.conn().await?;

    redis::cmd("HDEL")
        .arg(queue.keys().processing())
        .arg(&invocation.processing_token)
        .query_async::<_, ()>(&mut conn)
        .await?;

    let (_popped, new_head): (Option<String>, Option<String>) = loop {
        store::watch(&mut conn, &[&invocation.queued_key]).await?;

        let result: Option<(Option<String>, Option<String>)> = redis::pipe()
            .atomic()
            .cmd("LPOP")
            .arg(&invocation.queued_key)
            .cmd("LINDEX")
            .arg(&invocation.queued_key)
            .arg(0)
            .query_async(&mut conn)
            .await?;

        match result {
            Some(result) => break result,
            None => continue,
        }
    };

    let finish_time = Utc::now().timestamp_millis();
    record_completion(queue, &mut conn, invocation, finish_time).await?;

    match new_head {
        Some(raw) => {
            let (args, queued_time) = task::split_queued_entry(&raw)?;
            Ok(Some((
                invocation.group.clone(),
                invocation.queued_key.clone(),
                args,
                queued_time,
            )))
        }
        None => Ok(None),
    }
}

async fn record_completion(
    queue: &Queue,
    conn: &mut deadpool_redis::Connection,
    invocation: &TaskInvocation,
    finish_time: i64,
) -> Result<(), Error> {
    let pending_time = invocation.start_time - invocation.queued_time;
    let processing_time = finish_time - invocation.start_time;
    let recent_entry = task::encode_with_timestamp(&invocation.args, finish_time)?;

    let mut pipe = redis::pipe();
    pipe.cmd("HINCRBY")
        .arg(queue.keys().statistics())
        .arg("finished")
        .arg(1)
        .cmd("HINCRBY")
        .arg(queue.keys().statistics())
        .arg("total_pending_time")
        .arg(pending_time)
        .cmd("HINCRBY")
        .arg(queue.keys().statistics())
        .arg("total_processing_time")
        .arg(processing_time)
        .cmd("LPUSH")
        .arg(queue.keys().recent())
        .arg(&recent_entry)
        .cmd("LTRIM")
        .arg(queue.keys().recent())
        .arg(0)
        .arg(queue.config().recent_size as isize - 1);

    let slowest_member = task::encode_plain(&invocation.args)?;
    pipe.cmd("ZADD")
        .arg(queue.keys().slowest())
        .arg(processing_time)
        .arg(&slowest_member)
        .cmd("ZREMRANGEBYRANK")
        .arg(queue.keys().slowest())
        .arg(0)
        .arg(-(queue.config().slowest_size as isize) - 1);

    pipe.query_async::<_, ()>(conn).await?;

    event!(
        Level::DEBUG,
        queue = %queue.name(),
        group = %invocation.group,
        pending_time,
        processing_time,
        "task retired"
    );

    Ok(())
}
