//! Read-only aggregations for an external dashboard. `statistics` composes two atomic
//! reads for a consistent snapshot; the other listings are direct decodings of their
//! backing structures and need no transaction.

use serde::Serialize;

use crate::{error::Error, queue::Queue, store, task::{self, Args}};

#[derive(Debug, Clone, Serialize)]
pub struct BlockedSummary {
    pub groups: usize,
    pub tasks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total: i64,
    pub finished: i64,
    pub failed_tasks: usize,
    pub pending_tasks: i64,
    pub blocked: BlockedSummary,
    /// `None` means no task has finished yet.
    pub average_pending_time: Option<f64>,
    pub average_processing_time: Option<f64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Queue {
    pub async fn statistics(&self) -> Result<Statistics, Error> {
        let mut conn = self.conn().await?;

        let (stats_fields, failed_len, blocked_groups): (
            std::collections::HashMap<String, i64>,
            usize,
            Vec<String>,
        ) = {
            let result: Option<(std::collections::HashMap<String, i64>, usize, Vec<String>)> =
                redis::pipe()
                    .atomic()
                    .cmd("HGETALL")
                    .arg(self.keys().statistics())
                    .cmd("LLEN")
                    .arg(self.keys().failed())
                    .cmd("SMEMBERS")
                    .arg(self.keys().blocked())
                    .query_async(&mut conn)
                    .await?;
            result.expect("unwatched transaction never aborts")
        };

        let total = stats_fields.get("total").copied().unwrap_or(0);
        let finished = stats_fields.get("finished").copied().unwrap_or(0);
        let total_pending_time = stats_fields.get("total_pending_time").copied().unwrap_or(0);
        let total_processing_time = stats_fields
            .get("total_processing_time")
            .copied()
            .unwrap_or(0);

        let blocked_tasks = if blocked_groups.is_empty() {
            0usize
        } else {
            let mut pipe = redis::pipe();
            pipe.atomic();
            for group in &blocked_groups {
                pipe.cmd("LLEN").arg(self.keys().queued(group));
            }
            let lens: Option<Vec<usize>> = pipe.query_async(&mut conn).await?;
            let lens = lens.expect("unwatched transaction never aborts");
            lens.into_iter().sum::<usize>() - blocked_groups.len()
        };

        let failed_tasks = failed_len;
        let pending_tasks = total - finished - blocked_tasks as i64 - failed_tasks as i64;

        Ok(Statistics {
            total,
            finished,
            failed_tasks,
            pending_tasks,
            blocked: BlockedSummary {
                groups: blocked_groups.len(),
                tasks: blocked_tasks,
            },
            average_pending_time: if finished == 0 {
                None
            } else {
                Some(round2(total_pending_time as f64 / finished as f64))
            },
            average_processing_time: if finished == 0 {
                None
            } else {
                Some(round2(total_processing_time as f64 / finished as f64))
            },
        })
    }

    pub async fn recently_finished_tasks(&self) -> Result<Vec<(Args, i64)>, Error> {
        let mut conn = self.conn().await?;
        let raw = store::range_all(&mut conn, self.keys().recent()).await?;
        raw.iter()
            .map(|entry| task::decode_with_timestamp("RECENT", entry))
            .collect()
    }

    pub async fn failed_tasks(&self) -> Result<Vec<(Args, i64, i64, Vec<String>)>, Error> {
        let mut conn = self.conn().await?;
        let raw = store::range_all(&mut conn, self.keys().failed()).await?;
        raw.iter().map(|entry| task::decode_failed(entry)).collect()
    }

    pub async fn blocked_groups(&self) -> Result<Vec<String>, Error> {
        let mut conn = self.conn().await?;
        store::set_members(&mut conn, self.keys().blocked()).await
    }

    pub async fn slowest_tasks(&self) -> Result<Vec<(Args, i64)>, Error> {
        let mut conn = self.conn().await?;
        let raw = store::zrevrange_withscores(&mut conn, self.keys().slowest()).await?;
        raw.into_iter()
            .map(|(member, score)| task::decode_plain("SLOWEST", &member).map(|args| (args, score)))
            .collect()
    }

    pub async fn processing_tasks(&self) -> Result<Vec<(String, Args, i64)>, Error> {
        let mut conn = self.conn().await?;
        let entries = store::hash_get_all_entries(&mut conn, self.keys().processing()).await?;
        entries
            .into_iter()
            .map(|(token, raw)| {
                task::decode_with_timestamp("PROCESSING", &raw).map(|(args, start_time)| (token, args, start_time))
            })
            .collect()
    }
}
