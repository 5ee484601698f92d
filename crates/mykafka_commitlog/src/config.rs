//! Partition configuration.

use std::time::Duration;

/// Default capacity ceiling of a segment index file (10 MiB).
pub const DEFAULT_MAX_INDEX_SIZE: u64 = 10 * 1024 * 1024;

/// Configuration for opening a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionConfig {
    /// Size after which the active segment is rolled over.
    ///
    /// Checked after each write, so a segment may exceed this by one record.
    pub max_segment_size: u64,

    /// Upper bound on the partition's physical size (0 = unbounded).
    pub max_partition_size: u64,

    /// Age after which an inactive segment is deleted (zero = disabled).
    pub segment_ttl: Duration,

    /// Capacity ceiling of each segment's index file, in bytes.
    pub max_index_size: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            max_segment_size: 64 * 1024 * 1024, // 64 MB
            max_partition_size: 0,              // unbounded
            segment_ttl: Duration::ZERO,        // disabled
            max_index_size: DEFAULT_MAX_INDEX_SIZE,
        }
    }
}

impl PartitionConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rollover threshold of a segment.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the partition size bound (0 = unbounded).
    #[must_use]
    pub const fn max_partition_size(mut self, size: u64) -> Self {
        self.max_partition_size = size;
        self
    }

    /// Sets the segment time-to-live (zero = disabled).
    #[must_use]
    pub const fn segment_ttl(mut self, ttl: Duration) -> Self {
        self.segment_ttl = ttl;
        self
    }

    /// Sets the capacity ceiling of each index file.
    #[must_use]
    pub const fn max_index_size(mut self, size: u64) -> Self {
        self.max_index_size = size;
        self
    }

    /// Returns true when either a size or an age bound is configured.
    ///
    /// Rollover only pays for a retention pass when this holds.
    #[must_use]
    pub fn has_retention(&self) -> bool {
        self.max_partition_size != 0 || !self.segment_ttl.is_zero()
    }
}
