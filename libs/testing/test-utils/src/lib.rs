//! Shared test utilities for the task queue crates
//!
//! - `TestRedis`: Redis container with automatic cleanup (feature: "redis")
//! - `TestDataBuilder`: deterministic payloads, ids and key prefixes (always available)
//!
//! # Redis Testing
//!
//! Add `features = ["redis"]` to your dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["redis"] }
//! ```
//!
//! Then in your tests:
//!
//! ```rust,ignore
//! use test_utils::TestRedis;
//!
//! #[tokio::test]
//! #[ignore] // Requires Docker
//! async fn my_redis_test() {
//!     let redis = TestRedis::new().await;
//!     let store = task_queue::RedisStore::connect(redis.connection_string()).await.unwrap();
//! }
//! ```

use uuid::Uuid;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// Builder for test data with deterministic randomization
///
/// Seeded from the test name so reruns produce the same data, while separate
/// tests sharing one Redis never collide on keys.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_dead_letter");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Deterministic task id in UUID form
    pub fn task_id(&self) -> String {
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes).to_string()
    }

    /// Task payload unique to this test
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let payload = TestDataBuilder::new(7).payload("email");
    /// assert_eq!(payload, "test-payload-7-email");
    /// ```
    pub fn payload(&self, suffix: &str) -> String {
        format!("test-payload-{}-{}", self.seed, suffix)
    }

    /// Key prefix unique to this test, e.g. `test-7:priority_queue`
    pub fn key(&self, name: &str) -> String {
        format!("test-{}:{}", self.seed, name)
    }
}
