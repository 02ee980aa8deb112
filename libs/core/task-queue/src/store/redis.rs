use super::{Placement, QueueStore};
use crate::error::{QueueError, QueueResult};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, Script};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Picks the target queue server-side so the decision and the write are atomic.
///
/// KEYS: ready, delayed. ARGV: member, priority, due_ms, now_ms.
/// Returns 0 for the ready queue, 1 for the delayed queue.
const ENQUEUE_SCRIPT: &str = r"
if tonumber(ARGV[3]) <= tonumber(ARGV[4]) then
    redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
    return 0
else
    redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
    return 1
end
";

/// Redis-backed [`QueueStore`].
///
/// Regular commands share one [`ConnectionManager`]. Blocking pops get a
/// dedicated connection per key so a waiting `BZPOPMAX` never holds up the
/// shared connection. Those connections have no client-side response timeout,
/// the server replies once the pop's own timeout elapses.
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
    blocking: Mutex<HashMap<String, ConnectionManager>>,
    enqueue_script: Script,
}

impl RedisStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str) -> QueueResult<Self> {
        let client = Client::open(url)?;
        let mut manager = ConnectionManager::new(client.clone()).await?;

        let _: String = redis::cmd("PING").query_async(&mut manager).await?;
        info!("Connected to Redis");

        Ok(Self {
            client,
            manager,
            blocking: Mutex::new(HashMap::new()),
            enqueue_script: Script::new(ENQUEUE_SCRIPT),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    async fn blocking_conn(&self, key: &str) -> QueueResult<ConnectionManager> {
        let mut connections = self.blocking.lock().await;
        if let Some(conn) = connections.get(key) {
            return Ok(conn.clone());
        }

        let config = ConnectionManagerConfig::new().set_response_timeout(None);
        let conn = ConnectionManager::new_with_config(self.client.clone(), config).await?;
        debug!(key = %key, "Opened dedicated blocking connection");
        connections.insert(key.to_string(), conn.clone());
        Ok(conn)
    }

    async fn drop_blocking_conn(&self, key: &str) {
        self.blocking.lock().await.remove(key);
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn enqueue(
        &self,
        ready_key: &str,
        delayed_key: &str,
        member: &str,
        priority: i32,
        due_ms: i64,
        now_ms: i64,
    ) -> QueueResult<Placement> {
        let mut conn = self.conn();
        let placed: i32 = self
            .enqueue_script
            .key(ready_key)
            .key(delayed_key)
            .arg(member)
            .arg(priority)
            .arg(due_ms)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;

        match placed {
            0 => Ok(Placement::Ready),
            1 => Ok(Placement::Delayed),
            other => Err(QueueError::store(format!(
                "enqueue script returned unexpected value {other}"
            ))),
        }
    }

    async fn pop_max(&self, key: &str, timeout: Duration) -> QueueResult<Option<String>> {
        let mut conn = self.blocking_conn(key).await?;

        let result: redis::RedisResult<Option<(String, String, f64)>> = redis::cmd("BZPOPMAX")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await;

        match result {
            Ok(popped) => Ok(popped.map(|(_, member, _)| member)),
            Err(e) => {
                warn!(key = %key, error = %e, "Blocking pop failed, resetting connection");
                self.drop_blocking_conn(key).await;
                Err(e.into())
            }
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> QueueResult<()> {
        let mut conn = self.conn();
        let _: i64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_remove(&self, key: &str, value: &str) -> QueueResult<usize> {
        let mut conn = self.conn();
        let removed: usize = redis::cmd("LREM")
            .arg(key)
            .arg(1)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn range_by_score(
        &self,
        key: &str,
        max: i64,
        limit: usize,
    ) -> QueueResult<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(max)
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn sorted_insert(&self, key: &str, member: &str, score: f64) -> QueueResult<()> {
        let mut conn = self.conn();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> QueueResult<bool> {
        let mut conn = self.conn();
        let removed: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn incr_field(&self, key: &str, field: &str, by: i64) -> QueueResult<i64> {
        let mut conn = self.conn();
        let value: i64 = redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(by)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn fields(&self, key: &str) -> QueueResult<HashMap<String, i64>> {
        let mut conn = self.conn();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        Ok(raw
            .into_iter()
            .map(|(field, value)| {
                let parsed = value.parse().unwrap_or(0);
                (field, parsed)
            })
            .collect())
    }

    async fn list_len(&self, key: &str) -> QueueResult<usize> {
        let mut conn = self.conn();
        let len: usize = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>> {
        let mut conn = self.conn();
        let values: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
