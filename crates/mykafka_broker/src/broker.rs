//! The broker: a registry of partitions rooted in one directory.
//!
//! ```text
//! <root>/
//! ├─ LOCK
//! ├─ config/<topic>-<partition>.cfg
//! └─ data/<topic>/<partition>/<base_offset>.{log,index}
//! ```

use crate::config_store::{ConfigRecord, ConfigStore};
use crate::error::{BrokerError, BrokerResult};
use crate::topic::{validate_topic, PartitionSettings, TopicPartition};
use fs2::FileExt;
use mykafka_commitlog::{CommitLogError, Partition};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const LOCK_FILE: &str = "LOCK";
const DATA_DIR: &str = "data";
const CONFIG_DIR: &str = "config";

/// Configuration for opening a broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Root directory holding config records and partition data.
    pub root: PathBuf,
    /// Settings used when a partition is created without explicit ones.
    pub default_settings: PartitionSettings,
}

impl BrokerConfig {
    /// Creates a configuration rooted at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_settings: PartitionSettings::default(),
        }
    }

    /// Sets the settings applied to partitions created without explicit ones.
    #[must_use]
    pub fn default_settings(mut self, settings: PartitionSettings) -> Self {
        self.default_settings = settings;
        self
    }
}

/// The three offsets reported for a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Offsets {
    /// Offset of the oldest retained record.
    pub oldest: Option<u64>,
    /// Last committed consumer offset.
    pub commit: Option<u64>,
    /// Offset the next write will receive.
    pub newest: Option<u64>,
}

/// Snapshot of one partition for [`BrokerInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    /// Partition number.
    pub partition: u32,
    /// Current offsets.
    pub offsets: Offsets,
    /// Bytes of header and payload retained.
    pub physical_size: u64,
    /// Number of segments retained.
    pub segment_count: usize,
    /// Persisted settings.
    pub settings: PartitionSettings,
}

/// Snapshot of one topic for [`BrokerInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    /// Topic name.
    pub name: String,
    /// Partitions in ascending order.
    pub partitions: Vec<PartitionInfo>,
}

/// Snapshot of every topic and partition the broker holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerInfo {
    /// Root directory.
    pub root: PathBuf,
    /// Topics in name order.
    pub topics: Vec<TopicInfo>,
}

#[derive(Debug)]
struct BrokerState {
    partitions: BTreeMap<TopicPartition, Arc<Partition>>,
    configs: ConfigStore,
    closed: bool,
    lock_file: Option<File>,
}

/// Owns every partition under a root directory.
///
/// # Thread Safety
///
/// The partition table and config store sit behind one reader-writer lock.
/// Message traffic only holds it long enough to clone the partition handle,
/// so sends and reads on different partitions do not contend.
#[derive(Debug)]
pub struct Broker {
    root: PathBuf,
    default_settings: PartitionSettings,
    state: RwLock<BrokerState>,
}

impl Broker {
    /// Opens the broker rooted at `config.root`, creating it if missing,
    /// and opens every partition that has a config record.
    ///
    /// # Errors
    ///
    /// Returns `Topic` if another process holds the root, and any config
    /// or partition error encountered while loading.
    pub fn open(config: BrokerConfig) -> BrokerResult<Self> {
        let root = config.root;
        fs::create_dir_all(root.join(DATA_DIR))
            .map_err(|e| BrokerError::file("create", root.join(DATA_DIR), e))?;
        let lock_file = lock_root(&root)?;
        let configs = ConfigStore::open(root.join(CONFIG_DIR))?;

        let mut partitions = BTreeMap::new();
        for (key, record) in configs.iter() {
            let partition = Partition::open(
                partition_dir(&root, key),
                record.settings.to_partition_config(),
            )?;
            partitions.insert(key.clone(), Arc::new(partition));
        }

        info!(
            root = %root.display(),
            partitions = partitions.len(),
            "opened broker"
        );

        Ok(Self {
            root,
            default_settings: config.default_settings,
            state: RwLock::new(BrokerState {
                partitions,
                configs,
                closed: false,
                lock_file: Some(lock_file),
            }),
        })
    }

    /// Creates a partition with the given settings, or the broker's
    /// defaults when `None`.
    ///
    /// # Errors
    ///
    /// Returns `Topic` if the partition already exists.
    pub fn create_partition(
        &self,
        key: &TopicPartition,
        settings: Option<PartitionSettings>,
    ) -> BrokerResult<()> {
        validate_topic(&key.topic)?;
        let settings = settings.unwrap_or(self.default_settings);

        let mut state = self.state.write();
        ensure_open(&state)?;
        if state.partitions.contains_key(key) {
            return Err(BrokerError::topic(format!("partition {key} already exists")));
        }

        state.configs.create(key, settings)?;
        let partition =
            match Partition::open(partition_dir(&self.root, key), settings.to_partition_config()) {
                Ok(partition) => partition,
                Err(err) => {
                    if let Err(cleanup) = state.configs.remove(key) {
                        warn!(%key, error = %cleanup, "failed to remove config of unopened partition");
                    }
                    return Err(err.into());
                }
            };
        state.partitions.insert(key.clone(), Arc::new(partition));

        info!(%key, ?settings, "created partition");
        Ok(())
    }

    /// Deletes a partition: its data directory and its config record.
    pub fn delete_partition(&self, key: &TopicPartition) -> BrokerResult<()> {
        let mut state = self.state.write();
        ensure_open(&state)?;
        self.delete_locked(&mut state, key)
    }

    /// Deletes every partition of `topic` and returns how many there were.
    pub fn delete_topic(&self, topic: &str) -> BrokerResult<usize> {
        let mut state = self.state.write();
        ensure_open(&state)?;

        let keys: Vec<TopicPartition> = state
            .partitions
            .keys()
            .filter(|key| key.topic == topic)
            .cloned()
            .collect();
        if keys.is_empty() {
            return Err(BrokerError::not_found(format!("topic {topic} does not exist")));
        }

        for key in &keys {
            self.delete_locked(&mut state, key)?;
        }
        info!(topic, partitions = keys.len(), "deleted topic");
        Ok(keys.len())
    }

    fn delete_locked(&self, state: &mut BrokerState, key: &TopicPartition) -> BrokerResult<()> {
        let partition = state
            .partitions
            .remove(key)
            .ok_or_else(|| partition_not_found(key))?;
        partition.delete()?;
        state.configs.remove(key)?;

        // Only succeeds once the topic has no partitions left.
        let topic_dir = self.root.join(DATA_DIR).join(&key.topic);
        if fs::remove_dir(&topic_dir).is_ok() {
            info!(topic = %key.topic, "removed empty topic directory");
        }

        info!(%key, "deleted partition");
        Ok(())
    }

    /// Appends `payload` to a partition and returns its offset.
    pub fn send_message(&self, key: &TopicPartition, payload: &[u8]) -> BrokerResult<u64> {
        let partition = self.partition(key)?;
        Ok(partition.write(payload)?)
    }

    /// Reads the payload stored at `offset` in a partition.
    pub fn get_message(&self, key: &TopicPartition, offset: u64) -> BrokerResult<Vec<u8>> {
        let partition = self.partition(key)?;
        Ok(partition.read_at(offset)?)
    }

    /// Returns the oldest, committed and newest offsets of a partition.
    pub fn get_offsets(&self, key: &TopicPartition) -> BrokerResult<Offsets> {
        let state = self.state.read();
        ensure_open(&state)?;
        let partition = state
            .partitions
            .get(key)
            .ok_or_else(|| partition_not_found(key))?;
        let record = state.configs.get(key)?;

        Ok(Offsets {
            oldest: partition.oldest_offset(),
            commit: record.commit_offset,
            newest: partition.newest_offset(),
        })
    }

    /// Records `offset` as the committed consumer offset of a partition.
    ///
    /// # Errors
    ///
    /// Returns `Partition` if `offset` is past the newest offset.
    pub fn commit_offset(&self, key: &TopicPartition, offset: u64) -> BrokerResult<()> {
        let mut state = self.state.write();
        ensure_open(&state)?;
        let newest = state
            .partitions
            .get(key)
            .ok_or_else(|| partition_not_found(key))?
            .newest_offset()
            .unwrap_or(0);
        if offset > newest {
            return Err(CommitLogError::partition(format!(
                "cannot commit offset {offset} past newest offset {newest}"
            ))
            .into());
        }

        let record = ConfigRecord {
            commit_offset: Some(offset),
            ..*state.configs.get(key)?
        };
        state.configs.update(key, record)
    }

    /// Returns a snapshot of every topic and partition.
    pub fn info(&self) -> BrokerResult<BrokerInfo> {
        let state = self.state.read();
        ensure_open(&state)?;

        let mut topics: Vec<TopicInfo> = Vec::new();
        for (key, partition) in &state.partitions {
            let record = state.configs.get(key)?;
            let info = PartitionInfo {
                partition: key.partition,
                offsets: Offsets {
                    oldest: partition.oldest_offset(),
                    commit: record.commit_offset,
                    newest: partition.newest_offset(),
                },
                physical_size: partition.physical_size(),
                segment_count: partition.segment_count(),
                settings: record.settings,
            };

            match topics.last_mut() {
                Some(topic) if topic.name == key.topic => topic.partitions.push(info),
                _ => topics.push(TopicInfo {
                    name: key.topic.clone(),
                    partitions: vec![info],
                }),
            }
        }

        Ok(BrokerInfo {
            root: self.root.clone(),
            topics,
        })
    }

    /// Returns the handle of a partition.
    pub fn partition(&self, key: &TopicPartition) -> BrokerResult<Arc<Partition>> {
        let state = self.state.read();
        ensure_open(&state)?;
        state
            .partitions
            .get(key)
            .cloned()
            .ok_or_else(|| partition_not_found(key))
    }

    /// Returns every partition key in order.
    #[must_use]
    pub fn partitions(&self) -> Vec<TopicPartition> {
        self.state.read().partitions.keys().cloned().collect()
    }

    /// Returns the number of distinct topics.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        let state = self.state.read();
        let mut count = 0;
        let mut previous: Option<&str> = None;
        for key in state.partitions.keys() {
            if previous != Some(key.topic.as_str()) {
                count += 1;
                previous = Some(key.topic.as_str());
            }
        }
        count
    }

    /// Returns the number of partitions across all topics.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.state.read().partitions.len()
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Closes every partition and releases the root lock.
    ///
    /// Calling this on a closed broker is a no-op.
    pub fn close(&self) -> BrokerResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        let mut result = Ok(());
        for (key, partition) in std::mem::take(&mut state.partitions) {
            if let Err(err) = partition.close() {
                warn!(%key, error = %err, "failed to close partition");
                if result.is_ok() {
                    result = Err(err.into());
                }
            }
        }
        state.lock_file = None;

        info!(root = %self.root.display(), "closed broker");
        result
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(root = %self.root.display(), error = %err, "failed to close broker");
        }
    }
}

fn partition_dir(root: &Path, key: &TopicPartition) -> PathBuf {
    root.join(DATA_DIR)
        .join(&key.topic)
        .join(key.partition.to_string())
}

fn partition_not_found(key: &TopicPartition) -> BrokerError {
    BrokerError::not_found(format!("partition {key} does not exist"))
}

fn ensure_open(state: &BrokerState) -> BrokerResult<()> {
    if state.closed {
        return Err(BrokerError::topic("broker is closed"));
    }
    Ok(())
}

fn lock_root(root: &Path) -> BrokerResult<File> {
    let lock_path = root.join(LOCK_FILE);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| BrokerError::file("open", &lock_path, e))?;

    if lock_file.try_lock_exclusive().is_err() {
        return Err(BrokerError::topic(format!(
            "{} is locked by another broker",
            root.display()
        )));
    }
    Ok(lock_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(topic: &str, partition: u32) -> TopicPartition {
        TopicPartition::new(topic, partition).unwrap()
    }

    #[test]
    fn open_creates_layout() {
        let dir = tempdir().unwrap();
        let broker = Broker::open(BrokerConfig::new(dir.path())).unwrap();
        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("config").is_dir());
        assert!(dir.path().join("LOCK").exists());
        assert_eq!(broker.partition_count(), 0);
        assert_eq!(broker.topic_count(), 0);
    }

    #[test]
    fn root_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let broker = Broker::open(BrokerConfig::new(dir.path())).unwrap();
        assert!(matches!(
            Broker::open(BrokerConfig::new(dir.path())),
            Err(BrokerError::Topic { .. })
        ));
        broker.close().unwrap();
        Broker::open(BrokerConfig::new(dir.path())).unwrap();
    }

    #[test]
    fn create_uses_defaults_and_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let defaults = PartitionSettings::default().max_segment_size(512);
        let broker = Broker::open(BrokerConfig::new(dir.path()).default_settings(defaults)).unwrap();

        broker.create_partition(&key("events", 0), None).unwrap();
        assert!(dir.path().join("data/events/0").is_dir());
        assert!(dir.path().join("config/events-0.cfg").exists());
        assert_eq!(broker.partition(&key("events", 0)).unwrap().config().max_segment_size, 512);

        let err = broker.create_partition(&key("events", 0), None).unwrap_err();
        assert!(matches!(err, BrokerError::Topic { .. }));
    }

    #[test]
    fn invalid_topic_rejected() {
        let dir = tempdir().unwrap();
        let broker = Broker::open(BrokerConfig::new(dir.path())).unwrap();
        let bad = TopicPartition {
            topic: "../escape".to_string(),
            partition: 0,
        };
        assert!(matches!(
            broker.create_partition(&bad, None),
            Err(BrokerError::Topic { .. })
        ));
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn unknown_partition_is_not_found() {
        let dir = tempdir().unwrap();
        let broker = Broker::open(BrokerConfig::new(dir.path())).unwrap();
        let missing = key("ghost", 1);

        assert!(broker.send_message(&missing, b"x").unwrap_err().is_not_found());
        assert!(broker.get_message(&missing, 0).unwrap_err().is_not_found());
        assert!(broker.get_offsets(&missing).unwrap_err().is_not_found());
        assert!(broker.commit_offset(&missing, 0).unwrap_err().is_not_found());
        assert!(broker.delete_partition(&missing).unwrap_err().is_not_found());
        assert!(broker.delete_topic("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn commit_offset_bounds() {
        let dir = tempdir().unwrap();
        let broker = Broker::open(BrokerConfig::new(dir.path())).unwrap();
        let events = key("events", 0);
        broker.create_partition(&events, None).unwrap();
        broker.send_message(&events, b"a").unwrap();

        broker.commit_offset(&events, 1).unwrap();
        assert_eq!(broker.get_offsets(&events).unwrap().commit, Some(1));

        let err = broker.commit_offset(&events, 2).unwrap_err();
        assert!(err.to_string().contains("past newest offset 1"));
    }

    #[test]
    fn closed_broker_rejects_operations() {
        let dir = tempdir().unwrap();
        let broker = Broker::open(BrokerConfig::new(dir.path())).unwrap();
        let events = key("events", 0);
        broker.create_partition(&events, None).unwrap();
        let handle = broker.partition(&events).unwrap();

        broker.close().unwrap();
        broker.close().unwrap();
        assert!(handle.is_closed());
        assert_eq!(broker.partition_count(), 0);
        assert!(matches!(
            broker.create_partition(&key("other", 0), None),
            Err(BrokerError::Topic { .. })
        ));
        assert!(broker.send_message(&events, b"x").is_err());
        assert!(broker.info().is_err());
    }
}
