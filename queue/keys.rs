use serde_json::Value;

/// Global registry of queue names, not scoped to any one queue.
pub const QUEUES_KEY: &str = "FAIRY:QUEUES";

/// Key derivation for the per-queue kinds enumerated in the data model: `SOURCE`,
/// `QUEUED:<group>`, `PROCESSING`, `FAILED`, `BLOCKED`, `RECENT`, `SLOWEST`, `STATISTICS`.
#[derive(Debug, Clone)]
pub(crate) struct QueueKeys {
    queue_name: String,
    source: String,
    processing: String,
    failed: String,
    blocked: String,
    recent: String,
    slowest: String,
    statistics: String,
}

impl QueueKeys {
    pub fn new(queue_name: &str) -> Self {
        QueueKeys {
            queue_name: queue_name.to_string(),
            source: format!("FAIRY:SOURCE:{}", queue_name),
            processing: format!("FAIRY:PROCESSING:{}", queue_name),
            failed: format!("FAIRY:FAILED:{}", queue_name),
            blocked: format!("FAIRY:BLOCKED:{}", queue_name),
            recent: format!("FAIRY:RECENT:{}", queue_name),
            slowest: format!("FAIRY:SLOWEST:{}", queue_name),
            statistics: format!("FAIRY:STATISTICS:{}", queue_name),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn processing(&self) -> &str {
        &self.processing
    }

    pub fn failed(&self) -> &str {
        &self.failed
    }

    pub fn blocked(&self) -> &str {
        &self.blocked
    }

    pub fn recent(&self) -> &str {
        &self.recent
    }

    pub fn slowest(&self) -> &str {
        &self.slowest
    }

    pub fn statistics(&self) -> &str {
        &self.statistics
    }

    pub fn queued(&self, group: &str) -> String {
        format!("FAIRY:QUEUED:{}:{}", self.queue_name, group)
    }
}

/// Render a task's group id (`args[0]`) to a stable string suitable for use as a redis
/// key segment or `BLOCKED` set member.
///
/// A JSON string is used as-is; any other JSON scalar/array/object is rendered via its
/// compact JSON encoding. This single function is the only place a group token is ever
/// produced, so there is no ambiguity decoding `BLOCKED` members back (we never decode
/// them as arbitrary JSON — they're always treated as the token this function made).
pub(crate) fn group_token(args: &[Value]) -> Result<String, crate::Error> {
    let group = args
        .first()
        .ok_or_else(|| crate::Error::MalformedTask("task", "task has no arguments".to_string()))?;

    Ok(match group {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
