use serde_json::Value;

use crate::Error;

/// A task's user-supplied positional arguments. `args[0]` is always the group id.
pub type Args = Vec<Value>;

fn decode(location: &'static str, raw: &str) -> Result<Vec<Value>, Error> {
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(Error::MalformedTask(
            location,
            format!("expected a JSON array, got {}", raw),
        )),
    }
}

fn split_tail(
    location: &'static str,
    mut items: Vec<Value>,
    tail_len: usize,
) -> Result<(Vec<Value>, Vec<Value>), Error> {
    if items.len() < tail_len {
        return Err(Error::MalformedTask(
            location,
            format!("expected at least {} element(s)", tail_len),
        ));
    }
    let args = items.split_off(items.len() - tail_len);
    Ok((items, args))
}

fn as_i64(location: &'static str, value: &Value) -> Result<i64, Error> {
    value
        .as_i64()
        .ok_or_else(|| Error::MalformedTask(location, format!("expected an integer, got {}", value)))
}

/// Encode `[args…, timestamp_ms]`, the shape shared by `SOURCE`, `QUEUED:<group>`,
/// `PROCESSING`, and `RECENT` entries.
pub(crate) fn encode_with_timestamp(args: &[Value], timestamp_ms: i64) -> Result<String, Error> {
    let mut items = Vec::with_capacity(args.len() + 1);
    items.extend_from_slice(args);
    items.push(Value::from(timestamp_ms));
    Ok(serde_json::to_string(&items)?)
}

/// Decode `[args…, timestamp_ms]` back into its parts.
pub(crate) fn decode_with_timestamp(location: &'static str, raw: &str) -> Result<(Args, i64), Error> {
    let items = decode(location, raw)?;
    let (args, mut tail) = split_tail(location, items, 1)?;
    let timestamp = as_i64(location, &tail.remove(0))?;
    Ok((args, timestamp))
}

/// Encode a bare `[args…]` array, the shape used by `SLOWEST` members.
pub(crate) fn encode_plain(args: &[Value]) -> Result<String, Error> {
    Ok(serde_json::to_string(args)?)
}

/// Decode a bare `[args…]` array.
pub(crate) fn decode_plain(location: &'static str, raw: &str) -> Result<Args, Error> {
    decode(location, raw)
}

/// Encode a `FAILED` record: `[args…, enqueued_at_ms, failed_at_ms, [err_msg…]]`.
pub(crate) fn encode_failed(
    args: &[Value],
    enqueued_at_ms: i64,
    failed_at_ms: i64,
    errors: &[String],
) -> Result<String, Error> {
    let mut items = Vec::with_capacity(args.len() + 3);
    items.extend_from_slice(args);
    items.push(Value::from(enqueued_at_ms));
    items.push(Value::from(failed_at_ms));
    items.push(Value::from(errors.to_vec()));
    Ok(serde_json::to_string(&items)?)
}

/// Decode a `FAILED` record.
pub(crate) fn decode_failed(raw: &str) -> Result<(Args, i64, i64, Vec<String>), Error> {
    const LOC: &str = "FAILED";
    let items = decode(LOC, raw)?;
    let (args, mut tail) = split_tail(LOC, items, 3)?;
    let enqueued_at = as_i64(LOC, &tail[0])?;
    let failed_at = as_i64(LOC, &tail[1])?;
    let errors: Vec<String> = serde_json::from_value(tail.remove(2))
        .map_err(|e| Error::MalformedTask(LOC, e.to_string()))?;
    Ok((args, enqueued_at, failed_at, errors))
}

/// Strip the trailing `(failed_at, errors)` pair from a `FAILED` record, restoring the
/// pre-failure `[args…, enqueued_at_ms]` tuple for re-ingestion into `SOURCE`.
pub(crate) fn failed_to_source(raw: &str) -> Result<String, Error> {
    let (args, enqueued_at, _failed_at, _errors) = decode_failed(raw)?;
    encode_with_timestamp(&args, enqueued_at)
}

/// Strip the trailing `enqueued_at_ms` from a `QUEUED`/`SOURCE` entry, recovering the
/// original task's entry and its queued timestamp.
pub(crate) fn split_queued_entry(raw: &str) -> Result<(Args, i64), Error> {
    decode_with_timestamp("QUEUED", raw)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn round_trips_source_entry() {
        let args = vec![json!("group-a"), json!(1), json!("payload")];
        let encoded = encode_with_timestamp(&args, 1_000).unwrap();
        let (decoded_args, ts) = decode_with_timestamp("SOURCE", &encoded).unwrap();
        assert_eq!(decoded_args, args);
        assert_eq!(ts, 1_000);
    }

    #[test]
    fn round_trips_failed_record() {
        let args = vec![json!("group-a"), json!(1)];
        let errors = vec!["boom".to_string(), "boom again".to_string()];
        let encoded = encode_failed(&args, 1_000, 2_000, &errors).unwrap();
        let (decoded_args, enqueued_at, failed_at, decoded_errors) =
            decode_failed(&encoded).unwrap();
        assert_eq!(decoded_args, args);
        assert_eq!(enqueued_at, 1_000);
        assert_eq!(failed_at, 2_000);
        assert_eq!(decoded_errors, errors);
    }

    #[test]
    fn failed_record_strips_back_to_source_shape() {
        let args = vec![json!("group-a")];
        let encoded = encode_failed(&args, 1_000, 2_000, &["x".to_string()]).unwrap();
        let restored = failed_to_source(&encoded).unwrap();
        let (restored_args, ts) = decode_with_timestamp("SOURCE", &restored).unwrap();
        assert_eq!(restored_args, args);
        assert_eq!(ts, 1_000);
    }

    #[test]
    fn rejects_non_array_payload() {
        let err = decode_with_timestamp("SOURCE", r#""not an array""#).unwrap_err();
        assert_matches!(err, Error::MalformedTask("SOURCE", _));
    }

    #[test]
    fn rejects_short_array() {
        let err = decode_with_timestamp("SOURCE", "[]").unwrap_err();
        assert_matches!(err, Error::MalformedTask("SOURCE", _));
    }
}
