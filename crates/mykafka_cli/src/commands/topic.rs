//! Create and delete commands.

use super::open_broker;
use mykafka_broker::{PartitionSettings, TopicPartition};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Settings given on the command line; unset fields keep the defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct SettingsOverrides {
    /// Segment rollover size in bytes.
    pub segment_size: Option<u64>,
    /// Partition size bound in bytes.
    pub partition_size: Option<u64>,
    /// Segment time-to-live in seconds.
    pub ttl: Option<u64>,
}

impl SettingsOverrides {
    fn apply(self, mut settings: PartitionSettings) -> PartitionSettings {
        if let Some(size) = self.segment_size {
            settings = settings.max_segment_size(size);
        }
        if let Some(size) = self.partition_size {
            settings = settings.max_partition_size(size);
        }
        if let Some(secs) = self.ttl {
            settings = settings.segment_ttl(Duration::from_secs(secs));
        }
        settings
    }
}

/// Runs the create command.
pub fn create<W: Write>(
    root: &Path,
    topic: &str,
    partition: u32,
    overrides: SettingsOverrides,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = open_broker(root)?;
    let key = TopicPartition::new(topic, partition)?;
    let settings = overrides.apply(PartitionSettings::default());

    broker.create_partition(&key, Some(settings))?;
    writeln!(out, "Created partition {key}")?;

    broker.close()?;
    Ok(())
}

/// Runs the delete command.
pub fn delete<W: Write>(
    root: &Path,
    topic: &str,
    partition: Option<u32>,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = open_broker(root)?;

    match partition {
        Some(partition) => {
            let key = TopicPartition::new(topic, partition)?;
            broker.delete_partition(&key)?;
            writeln!(out, "Deleted partition {key}")?;
        }
        None => {
            let count = broker.delete_topic(topic)?;
            writeln!(out, "Deleted topic {topic} ({count} partitions)")?;
        }
    }

    broker.close()?;
    Ok(())
}
