//! The dispatch loop: atomically promote the head of `SOURCE` into the tail of the
//! correct per-group list, and decide whether this worker now owns that group's head.

use tracing::{event, Level};

use crate::{error::Error, queue::Queue, store, task};

pub(crate) enum DispatchOutcome {
    /// This worker caused `QUEUED:<group>` to transition from empty to non-empty, so
    /// it now owns processing that group's head.
    Dispatched {
        group: String,
        queued_key: String,
        args: task::Args,
        queued_time: i64,
    },
    /// `SOURCE` was empty.
    Empty,
    /// A task was moved, but another worker already owns that group's head.
    Busy,
}

/// Run one iteration of the dispatch protocol.
pub(crate) async fn poll(queue: &Queue) -> Result<DispatchOutcome, Error> {
    let mut conn = queue.conn().await?;
    let source_key = queue.keys().source().to_string();

    loop {
        store::watch(&mut conn, &[&source_key]).await?;

        let head = match store::head_peek(&mut conn, &source_key).await {
            Ok(head) => head,
            Err(e) => {
                store::unwatch(&mut conn).await.ok();
                return Err(e);
            }
        };

        let head = match head {
            Some(head) => head,
            None => {
                store::unwatch(&mut conn).await?;
                return Ok(DispatchOutcome::Empty);
            }
        };

        let (args, queued_time) = task::split_queued_entry(&head)?;
        let group = crate::keys::group_token(&args)?;
        let queued_key = queue.keys().queued(&group);

        let result: Option<(Option<String>, i64)> = redis::pipe()
            .atomic()
            .cmd("LPOP")
            .arg(&source_key)
            .cmd("RPUSH")
            .arg(&queued_key)
            .arg(&head)
            .query_async(&mut conn)
            .await?;

        let (_popped, new_len) = match result {
            Some(result) => result,
            None => {
                // Another worker mutated SOURCE between our peek and our commit.
                continue;
            }
        };

        if new_len == 1 {
            event!(Level::DEBUG, queue = %queue.name(), group = %group, "dispatched task");
            return Ok(DispatchOutcome::Dispatched {
                group,
                queued_key,
                args,
                queued_time,
            });
        }

        return Ok(DispatchOutcome::Busy);
    }
}
