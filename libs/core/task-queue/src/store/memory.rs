use super::{Placement, QueueStore};
use crate::error::QueueResult;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

#[derive(Default)]
struct State {
    sorted: HashMap<String, HashMap<String, f64>>,
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, i64>>,
}

impl State {
    fn zadd(&mut self, key: &str, member: &str, score: f64) {
        self.sorted
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
    }

    /// Ascending by score, then member, matching Redis ordering.
    fn zsorted(&self, key: &str) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> = self
            .sorted
            .get(key)
            .map(|set| set.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        members
    }

    fn zpopmax(&mut self, key: &str) -> Option<String> {
        let (member, _) = self.zsorted(key).pop()?;
        if let Some(set) = self.sorted.get_mut(key) {
            set.remove(&member);
        }
        Some(member)
    }
}

/// In-process [`QueueStore`] with Redis semantics, for tests and local runs.
///
/// Sorted sets pop the highest score first with ties broken by the
/// lexicographically greatest member; lists push to the head; blocking pops
/// wake on any sorted-set insert.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    inserted: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted set contents, ascending by score.
    pub async fn sorted_members(&self, key: &str) -> Vec<(String, f64)> {
        self.state.lock().await.zsorted(key)
    }

    /// List contents from head to tail.
    pub async fn list(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True when nothing at all is stored.
    pub async fn is_empty(&self) -> bool {
        let state = self.state.lock().await;
        state.sorted.values().all(HashMap::is_empty)
            && state.lists.values().all(VecDeque::is_empty)
            && state.hashes.values().all(HashMap::is_empty)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn enqueue(
        &self,
        ready_key: &str,
        delayed_key: &str,
        member: &str,
        priority: i32,
        due_ms: i64,
        now_ms: i64,
    ) -> QueueResult<Placement> {
        let placement = {
            let mut state = self.state.lock().await;
            if due_ms <= now_ms {
                state.zadd(ready_key, member, f64::from(priority));
                Placement::Ready
            } else {
                state.zadd(delayed_key, member, due_ms as f64);
                Placement::Delayed
            }
        };
        self.inserted.notify_waiters();
        Ok(placement)
    }

    async fn pop_max(&self, key: &str, timeout: Duration) -> QueueResult<Option<String>> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.inserted.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(member) = self.state.lock().await.zpopmax(key) {
                return Ok(Some(member));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> QueueResult<()> {
        self.state
            .lock()
            .await
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn list_remove(&self, key: &str, value: &str) -> QueueResult<usize> {
        let mut state = self.state.lock().await;
        let Some(list) = state.lists.get_mut(key) else {
            return Ok(0);
        };
        match list.iter().position(|v| v == value) {
            Some(index) => {
                list.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn range_by_score(
        &self,
        key: &str,
        max: i64,
        limit: usize,
    ) -> QueueResult<Vec<String>> {
        let max = max as f64;
        Ok(self
            .state
            .lock()
            .await
            .zsorted(key)
            .into_iter()
            .filter(|(_, score)| *score <= max)
            .take(limit)
            .map(|(member, _)| member)
            .collect())
    }

    async fn sorted_insert(&self, key: &str, member: &str, score: f64) -> QueueResult<()> {
        self.state.lock().await.zadd(key, member, score);
        self.inserted.notify_waiters();
        Ok(())
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .sorted
            .get_mut(key)
            .and_then(|set| set.remove(member))
            .is_some())
    }

    async fn incr_field(&self, key: &str, field: &str, by: i64) -> QueueResult<i64> {
        let mut state = self.state.lock().await;
        let value = state
            .hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert(0);
        *value += by;
        Ok(*value)
    }

    async fn fields(&self, key: &str) -> QueueResult<HashMap<String, i64>> {
        Ok(self
            .state
            .lock()
            .await
            .hashes
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_len(&self, key: &str) -> QueueResult<usize> {
        Ok(self
            .state
            .lock()
            .await
            .lists
            .get(key)
            .map_or(0, VecDeque::len))
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>> {
        let state = self.state.lock().await;
        let Some(list) = state.lists.get(key) else {
            return Ok(Vec::new());
        };

        let len = list.len() as isize;
        let resolve = |index: isize| if index < 0 { len + index } else { index };
        let start = resolve(start).max(0);
        let stop = resolve(stop).min(len - 1);
        if start > stop {
            return Ok(Vec::new());
        }

        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_enqueue_placement() {
        let store = MemoryStore::new();

        let ready = store.enqueue("pq", "dq", "a", 2, 100, 100).await.unwrap();
        let delayed = store.enqueue("pq", "dq", "b", 2, 200, 100).await.unwrap();

        assert_eq!(ready, Placement::Ready);
        assert_eq!(delayed, Placement::Delayed);
        assert_eq!(store.sorted_members("pq").await, vec![("a".to_string(), 2.0)]);
        assert_eq!(store.sorted_members("dq").await, vec![("b".to_string(), 200.0)]);
    }

    #[tokio::test]
    async fn test_pop_max_order() {
        let store = MemoryStore::new();
        store.sorted_insert("pq", "low", 1.0).await.unwrap();
        store.sorted_insert("pq", "high-a", 3.0).await.unwrap();
        store.sorted_insert("pq", "high-b", 3.0).await.unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(store.pop_max("pq", timeout).await.unwrap().as_deref(), Some("high-b"));
        assert_eq!(store.pop_max("pq", timeout).await.unwrap().as_deref(), Some("high-a"));
        assert_eq!(store.pop_max("pq", timeout).await.unwrap().as_deref(), Some("low"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_max_times_out() {
        let store = MemoryStore::new();
        let popped = store.pop_max("pq", Duration::from_secs(1)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_pop_max_wakes_on_insert() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.pop_max("pq", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.sorted_insert("pq", "task", 1.0).await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("task"));
    }

    #[tokio::test]
    async fn test_range_by_score_bounds() {
        let store = MemoryStore::new();
        for (member, score) in [("c", 30.0), ("a", 10.0), ("b", 20.0)] {
            store.sorted_insert("dq", member, score).await.unwrap();
        }

        assert_eq!(store.range_by_score("dq", 20, 10).await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.range_by_score("dq", 30, 1).await.unwrap(), vec!["a"]);
        assert!(store.sorted_remove("dq", "a").await.unwrap());
        assert!(!store.sorted_remove("dq", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_semantics() {
        let store = MemoryStore::new();
        store.list_push("l", "x").await.unwrap();
        store.list_push("l", "y").await.unwrap();
        store.list_push("l", "x").await.unwrap();

        assert_eq!(store.list("l").await, vec!["x", "y", "x"]);
        assert_eq!(store.list_remove("l", "x").await.unwrap(), 1);
        assert_eq!(store.list("l").await, vec!["y", "x"]);
        assert_eq!(store.list_remove("l", "missing").await.unwrap(), 0);
        assert_eq!(store.list_len("l").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_range_indexes() {
        let store = MemoryStore::new();
        for value in ["c", "b", "a"] {
            store.list_push("l", value).await.unwrap();
        }

        assert_eq!(store.list_range("l", 0, -1).await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(store.list_range("l", 1, 1).await.unwrap(), vec!["b"]);
        assert_eq!(store.list_range("l", -2, 10).await.unwrap(), vec!["b", "c"]);
        assert!(store.list_range("l", 5, 9).await.unwrap().is_empty());
        assert!(store.list_range("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counters() {
        let store = MemoryStore::new();
        store.incr_field("m", "success", 1).await.unwrap();
        assert_eq!(store.incr_field("m", "success", 2).await.unwrap(), 3);

        let fields = store.fields("m").await.unwrap();
        assert_eq!(fields.get("success"), Some(&3));
        assert!(store.fields("other").await.unwrap().is_empty());
    }
}
