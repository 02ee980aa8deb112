//! Integration tests against a real Redis
//!
//! Run with `cargo test -- --ignored` on a machine with Docker.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use task_queue::{
    DelayPromoter, KeySpace, Outcome, Placement, QueueConfig, QueueError, RedisStore,
    RetryPolicy, ShardWorker, SimulatedExecutor, Task, TaskExecutor, TaskQueue,
};
use test_utils::{TestDataBuilder, TestRedis};

struct AlwaysFails;

#[async_trait]
impl TaskExecutor for AlwaysFails {
    async fn execute(&self, _task: &Task) -> Result<(), QueueError> {
        Err(QueueError::execution("nope"))
    }

    fn name(&self) -> &'static str {
        "always-fails"
    }
}

fn config(builder: &TestDataBuilder) -> QueueConfig {
    QueueConfig::new(2)
        .with_keys(KeySpace {
            priority_prefix: builder.key("priority_queue"),
            delayed_prefix: builder.key("delayed_queue"),
            processing_prefix: builder.key("processing_queue"),
            dead_letter: builder.key("dead_letter_queue"),
            metrics: builder.key("task_metrics"),
        })
        .with_block_timeout(Duration::from_millis(200))
        .with_retry(RetryPolicy::new(2, Duration::from_millis(100), 2.0))
}

async fn zscore(redis: &TestRedis, key: &str, member: &str) -> Option<f64> {
    let mut conn = redis.connection();
    redis::cmd("ZSCORE")
        .arg(key)
        .arg(member)
        .query_async(&mut conn)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_enqueue_and_process_on_redis() {
    let redis = TestRedis::new().await;
    let builder = TestDataBuilder::from_test_name("redis_enqueue_and_process");
    let config = config(&builder);
    let store = Arc::new(RedisStore::connect(redis.connection_string()).await.unwrap());
    let executor = Arc::new(SimulatedExecutor::new(Duration::from_millis(1)));
    let queue = TaskQueue::new(store.clone(), executor.clone(), config.clone()).unwrap();

    let enqueued = queue
        .add_task(builder.payload("ready"), 3, None)
        .await
        .unwrap();
    assert_eq!(enqueued.placement, Placement::Ready);

    let worker = ShardWorker::new(enqueued.shard, store, executor, &config);
    assert_eq!(worker.poll_once().await.unwrap(), Some(Outcome::Succeeded));
    assert_eq!(worker.poll_once().await.unwrap(), None);

    let snapshot = queue.metrics().snapshot().await.unwrap();
    assert_eq!(snapshot.success, 1);
    assert_eq!(snapshot.total_processed, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_delayed_task_scored_in_millis_and_promoted() {
    let redis = TestRedis::new().await;
    let builder = TestDataBuilder::from_test_name("redis_delayed");
    let config = config(&builder);
    let store = Arc::new(RedisStore::connect(redis.connection_string()).await.unwrap());
    let queue = TaskQueue::new(
        store.clone(),
        Arc::new(SimulatedExecutor::default()),
        config.clone(),
    )
    .unwrap();

    let due = Utc::now() + TimeDelta::seconds(10);
    let enqueued = queue
        .add_task(builder.payload("later"), 1, Some(due))
        .await
        .unwrap();
    assert_eq!(enqueued.placement, Placement::Delayed);

    let promoter = DelayPromoter::new(enqueued.shard, store, &config);
    let batch = promoter.promote_due(due).await.unwrap();
    assert_eq!(batch.promoted, 1);

    let mut conn = redis.connection();
    let ready: Vec<String> = redis::cmd("ZRANGE")
        .arg(config.keys.priority_queue(enqueued.shard))
        .arg(0)
        .arg(-1)
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(
        zscore(&redis, &config.keys.priority_queue(enqueued.shard), &ready[0]).await,
        Some(1.0)
    );
    assert_eq!(
        zscore(&redis, &config.keys.delayed_queue(enqueued.shard), &ready[0]).await,
        None
    );
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_exhausted_task_lands_in_dead_letter_list() {
    let redis = TestRedis::new().await;
    let builder = TestDataBuilder::from_test_name("redis_dead_letter");
    let config = config(&builder);
    let store = Arc::new(RedisStore::connect(redis.connection_string()).await.unwrap());
    let queue = TaskQueue::new(store.clone(), Arc::new(AlwaysFails), config.clone()).unwrap();

    let enqueued = queue
        .add_task(builder.payload("doomed"), 2, None)
        .await
        .unwrap();
    let worker = ShardWorker::new(enqueued.shard, store.clone(), Arc::new(AlwaysFails), &config);
    let promoter = DelayPromoter::new(enqueued.shard, store, &config);

    let Some(Outcome::Retried { execute_at, .. }) = worker.poll_once().await.unwrap() else {
        panic!("first failure should retry");
    };
    promoter.promote_due(execute_at).await.unwrap();

    assert_eq!(
        worker.poll_once().await.unwrap(),
        Some(Outcome::DeadLettered { attempts: 2 })
    );

    let dead = queue.dead_letters().list(0, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, enqueued.task_id);
    assert_eq!(queue.metrics().snapshot().await.unwrap().dead_letter, 1);
}
