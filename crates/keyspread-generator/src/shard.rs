//! Time-derived shard tags.

use chrono::{DateTime, SecondsFormat, Utc};
use keyspread_core::ShardTag;

use crate::generator::GeneratorError;

pub const DEFAULT_SHARD_COUNT: u32 = 10;

/// Assigns `crc32c(timestamp) % shard_count` tags.
///
/// Tags are for post-hoc analysis only and never affect where a record is
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardAssigner {
    shard_count: u32,
}

impl ShardAssigner {
    pub fn new(shard_count: u32) -> Result<Self, GeneratorError> {
        if shard_count == 0 {
            return Err(GeneratorError::InvalidShardCount(shard_count));
        }
        Ok(Self { shard_count })
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Tag for a generation timestamp, formatted as RFC 3339 with nanoseconds.
    pub fn assign(&self, now: DateTime<Utc>) -> ShardTag {
        self.tag_for(&now.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    /// Tag for an already formatted timestamp.
    pub fn tag_for(&self, formatted: &str) -> ShardTag {
        ShardTag(crc32c::crc32c(formatted.as_bytes()) % self.shard_count)
    }
}

impl Default for ShardAssigner {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
        }
    }
}
