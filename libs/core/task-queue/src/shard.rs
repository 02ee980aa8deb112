use crate::error::{QueueError, QueueResult};

/// Maps task ids onto shards.
///
/// `crc32(id) mod shard_count` with the IEEE polynomial. The mapping only stays
/// valid while the shard count is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    shard_count: u32,
}

impl ShardRouter {
    pub fn new(shard_count: u32) -> QueueResult<Self> {
        if shard_count == 0 {
            return Err(QueueError::Config("shard count must be at least 1".into()));
        }
        Ok(Self { shard_count })
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn shard(&self, task_id: &str) -> u32 {
        crc32fast::hash(task_id.as_bytes()) % self.shard_count
    }

    pub fn shards(&self) -> impl Iterator<Item = u32> {
        0..self.shard_count
    }
}
