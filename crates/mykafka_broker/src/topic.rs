//! Topic/partition keys and per-partition settings.

use crate::error::{BrokerError, BrokerResult};
use mykafka_commitlog::PartitionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest accepted topic name.
pub const MAX_TOPIC_LEN: usize = 249;

/// Key of a partition: the topic name plus the partition number.
///
/// Rendered as `<topic>-<partition>`, which is also the config file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicPartition {
    /// Topic name.
    pub topic: String,
    /// Partition number within the topic.
    pub partition: u32,
}

impl TopicPartition {
    /// Creates a key after validating the topic name.
    ///
    /// # Errors
    ///
    /// Returns `Topic` if the name is empty, too long, `.`/`..`, or holds
    /// characters other than ASCII alphanumerics, `.`, `_` and `-`.
    pub fn new(topic: impl Into<String>, partition: u32) -> BrokerResult<Self> {
        let topic = topic.into();
        validate_topic(&topic)?;
        Ok(Self { topic, partition })
    }

    /// Parses a `<topic>-<partition>` string, splitting at the last `-`.
    ///
    /// Returns `None` if there is no `-`, the partition is not a plain
    /// decimal number, or the topic name is invalid.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (topic, partition) = s.rsplit_once('-')?;
        if partition.is_empty() || !partition.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Self::new(topic, partition.parse().ok()?).ok()
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Checks that `topic` can be used as a directory and file name.
pub fn validate_topic(topic: &str) -> BrokerResult<()> {
    if topic.is_empty() {
        return Err(BrokerError::topic("topic name is empty"));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(BrokerError::topic(format!(
            "topic name is {} bytes long, the limit is {MAX_TOPIC_LEN}",
            topic.len()
        )));
    }
    if topic == "." || topic == ".." {
        return Err(BrokerError::topic(format!("invalid topic name '{topic}'")));
    }
    if let Some(c) = topic
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(BrokerError::topic(format!(
            "invalid character {c:?} in topic name '{topic}'"
        )));
    }
    Ok(())
}

/// Size and age bounds of one partition, persisted in its config record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSettings {
    /// Rollover threshold of a segment, in bytes.
    pub max_segment_size: u64,
    /// Bound on the partition size in bytes (0 = unbounded).
    pub max_partition_size: u64,
    /// Age after which inactive segments are removed (zero = disabled).
    pub segment_ttl: Duration,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        let config = PartitionConfig::default();
        Self {
            max_segment_size: config.max_segment_size,
            max_partition_size: config.max_partition_size,
            segment_ttl: config.segment_ttl,
        }
    }
}

impl PartitionSettings {
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

    /// Builds the engine configuration for these settings.
    #[must_use]
    pub fn to_partition_config(&self) -> PartitionConfig {
        PartitionConfig::new()
            .max_segment_size(self.max_segment_size)
            .max_partition_size(self.max_partition_size)
            .segment_ttl(self.segment_ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse() {
        let tp = TopicPartition::new("book-store", 3).unwrap();
        assert_eq!(tp.to_string(), "book-store-3");
        assert_eq!(TopicPartition::parse("book-store-3"), Some(tp));

        assert_eq!(TopicPartition::parse("events"), None);
        assert_eq!(TopicPartition::parse("events-"), None);
        assert_eq!(TopicPartition::parse("events-x1"), None);
        assert_eq!(TopicPartition::parse("events-+1"), None);
        assert_eq!(TopicPartition::parse("-1"), None);
    }

    #[test]
    fn topic_names() {
        assert!(validate_topic("events.v2_raw-1").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("..").is_err());
        assert!(validate_topic("a/b").is_err());
        assert!(validate_topic("with space").is_err());
        assert!(validate_topic(&"x".repeat(MAX_TOPIC_LEN)).is_ok());
        assert!(validate_topic(&"x".repeat(MAX_TOPIC_LEN + 1)).is_err());
    }

    #[test]
    fn keys_order_by_topic_then_partition() {
        let mut keys = vec![
            TopicPartition::new("b", 0).unwrap(),
            TopicPartition::new("a", 10).unwrap(),
            TopicPartition::new("a", 2).unwrap(),
        ];
        keys.sort();
        let rendered: Vec<_> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["a-2", "a-10", "b-0"]);
    }

    #[test]
    fn settings_map_to_partition_config() {
        let settings = PartitionSettings::default()
            .max_segment_size(1024)
            .max_partition_size(4096)
            .segment_ttl(Duration::from_secs(60));
        let config = settings.to_partition_config();
        assert_eq!(config.max_segment_size, 1024);
        assert_eq!(config.max_partition_size, 4096);
        assert_eq!(config.segment_ttl, Duration::from_secs(60));
        assert!(config.has_retention());
    }
}
