//! Thin typed wrapper over the redis primitives the state machine needs: list/hash/
//! set/sorted-set commands, plus the `WATCH`/`UNWATCH` half of the optimistic-transaction
//! protocol. The `MULTI`/`EXEC` half is built per call site
//! with `redis::pipe().atomic()`, since each transaction in dispatch.rs/process.rs/
//! reschedule.rs commits a differently-shaped result; this module only centralizes the
//! parts that are identical everywhere.

use deadpool_redis::Connection;

use crate::Error;

/// Begin an optimistic watch on the given keys. A subsequent `MULTI`/`EXEC` pipeline
/// aborts (returns `None` when queried as `Option<T>`) if any watched key changes
/// before the commit.
pub(crate) async fn watch(conn: &mut Connection, keys: &[&str]) -> Result<(), Error> {
    if keys.is_empty() {
        return Ok(());
    }
    let mut cmd = redis::cmd("WATCH");
    for key in keys {
        cmd.arg(*key);
    }
    cmd.query_async::<_, ()>(conn).await?;
    Ok(())
}

/// Release a watch taken without following through on a transaction (e.g. because
/// there was nothing to dispatch).
pub(crate) async fn unwatch(conn: &mut Connection) -> Result<(), Error> {
    redis::cmd("UNWATCH").query_async::<_, ()>(conn).await?;
    Ok(())
}

/// Peek the head of a list without popping it.
pub(crate) async fn head_peek(conn: &mut Connection, key: &str) -> Result<Option<String>, Error> {
    let value: Option<String> = redis::cmd("LINDEX")
        .arg(key)
        .arg(0)
        .query_async(conn)
        .await?;
    Ok(value)
}

/// Read every element of a list, head to tail.
pub(crate) async fn range_all(conn: &mut Connection, key: &str) -> Result<Vec<String>, Error> {
    let values: Vec<String> = redis::cmd("LRANGE")
        .arg(key)
        .arg(0)
        .arg(-1)
        .query_async(conn)
        .await?;
    Ok(values)
}

/// Read every element of a list except the head (used by reschedule to collect the
/// survivors of a blocked group).
pub(crate) async fn range_tail(conn: &mut Connection, key: &str) -> Result<Vec<String>, Error> {
    let values: Vec<String> = redis::cmd("LRANGE")
        .arg(key)
        .arg(1)
        .arg(-1)
        .query_async(conn)
        .await?;
    Ok(values)
}

pub(crate) async fn len(conn: &mut Connection, key: &str) -> Result<usize, Error> {
    let n: usize = redis::cmd("LLEN").arg(key).query_async(conn).await?;
    Ok(n)
}

pub(crate) async fn set_members(conn: &mut Connection, key: &str) -> Result<Vec<String>, Error> {
    let members: Vec<String> = redis::cmd("SMEMBERS").arg(key).query_async(conn).await?;
    Ok(members)
}

pub(crate) async fn set_add(conn: &mut Connection, key: &str, member: &str) -> Result<(), Error> {
    redis::cmd("SADD")
        .arg(key)
        .arg(member)
        .query_async::<_, ()>(conn)
        .await?;
    Ok(())
}

pub(crate) async fn hash_get_all_entries(
    conn: &mut Connection,
    key: &str,
) -> Result<Vec<(String, String)>, Error> {
    let entries: Vec<(String, String)> = redis::cmd("HGETALL").arg(key).query_async(conn).await?;
    Ok(entries)
}

pub(crate) async fn zrevrange_withscores(
    conn: &mut Connection,
    key: &str,
) -> Result<Vec<(String, i64)>, Error> {
    let raw: Vec<(String, i64)> = redis::cmd("ZREVRANGE")
        .arg(key)
        .arg(0)
        .arg(-1)
        .arg("WITHSCORES")
        .query_async(conn)
        .await?;
    Ok(raw)
}
