//! Redis test infrastructure
//!
//! Provides a `TestRedis` helper that starts a throwaway Redis container.

use redis::aio::MultiplexedConnection;
use redis::Client;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

/// Test Redis wrapper that ensures proper cleanup
///
/// The container is stopped and removed when this struct is dropped.
pub struct TestRedis {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    connection: MultiplexedConnection,
    connection_string: String,
}

impl TestRedis {
    /// Start Redis 8 Alpine and open a connection for raw inspection.
    pub async fn new() -> Self {
        let container = Redis::default()
            .with_tag("8-alpine")
            .start()
            .await
            .expect("Failed to start Redis container");

        let host_port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        let connection_string = format!("redis://127.0.0.1:{}", host_port);

        let connection = Client::open(connection_string.clone())
            .expect("Failed to create Redis client")
            .get_multiplexed_async_connection()
            .await
            .expect("Failed to connect to Redis");

        tracing::info!(port = host_port, "Test Redis ready (Redis 8-alpine)");

        Self {
            container,
            connection,
            connection_string,
        }
    }

    /// Raw connection for asserting on stored keys
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// URL for `RedisStore::connect`
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl Drop for TestRedis {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test Redis container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_sorted_set_round_trip() {
        let redis = TestRedis::new().await;
        let mut conn = redis.connection();

        let _: i64 = redis::cmd("ZADD")
            .arg("pq:0")
            .arg(3)
            .arg("task")
            .query_async(&mut conn)
            .await
            .unwrap();

        let members: Vec<String> = redis::cmd("ZRANGE")
            .arg("pq:0")
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(members, vec!["task"]);
    }
}
