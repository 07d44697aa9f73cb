//! `reschedule`: collapse `FAILED` and the survivors of every blocked group's
//! `QUEUED:<group>` list back into `SOURCE`, clearing `FAILED` and `BLOCKED` as a
//! single atomic action.

use tracing::{event, Level};

use crate::{error::Error, queue::Queue, store, task};

impl Queue {
    /// Re-ingest every archived failure and every blocked group's pending survivors
    /// back into `SOURCE`. Idempotent when `FAILED` and `BLOCKED` are both empty.
    pub async fn reschedule(&self) -> Result<usize, Error> {
        let mut conn = self.conn().await?;
        let failed_key = self.keys().failed().to_string();
        let blocked_key = self.keys().blocked().to_string();
        let source_key = self.keys().source().to_string();

        loop {
            store::watch(&mut conn, &[&failed_key, &blocked_key]).await?;

            let failed_records = store::range_all(&mut conn, &failed_key).await?;
            let mut buffer = Vec::with_capacity(failed_records.len());
            for record in &failed_records {
                buffer.push(task::failed_to_source(record)?);
            }

            let blocked_groups = store::set_members(&mut conn, &blocked_key).await?;
            let queued_keys: Vec<String> = blocked_groups
                .iter()
                .map(|group| self.keys().queued(group))
                .collect();

            if !queued_keys.is_empty() {
                let watch_refs: Vec<&str> = queued_keys.iter().map(String::as_str).collect();
                store::watch(&mut conn, &watch_refs).await?;

                for key in &queued_keys {
                    let tail = store::range_tail(&mut conn, key).await?;
                    buffer.extend(tail);
                }
            }

            let requeued = buffer.len();

            let mut pipe = redis::pipe();
            pipe.atomic();
            if !buffer.is_empty() {
                pipe.cmd("RPUSH").arg(&source_key).arg(&buffer);
            }
            pipe.cmd("DEL").arg(&failed_key);
            if !queued_keys.is_empty() {
                pipe.cmd("DEL").arg(&queued_keys);
            }
            pipe.cmd("DEL").arg(&blocked_key);

            let result: Option<()> = pipe.query_async(&mut conn).await?;
            match result {
                Some(()) => {
                    event!(Level::INFO, queue = %self.name(), count = requeued, "rescheduled tasks");
                    return Ok(requeued);
                }
                None => continue,
            }
        }
    }
}
