//! Persistent per-partition config records.
//!
//! One file per partition, named `<topic>-<partition>.cfg`:
//!
//! ```text
//! | magic "MKCF" (4) | version (4, u32 LE) |
//! | max_segment_size (8, i64 LE) | max_partition_size (8, i64 LE) |
//! | segment_ttl_ms (8, i64 LE) | commit_offset (8, i64 LE, -1 = none) |
//! ```
//!
//! Records are replaced with write-then-rename, so a crash leaves either
//! the old or the new record on disk.

use crate::error::{BrokerError, BrokerResult};
use crate::topic::{PartitionSettings, TopicPartition};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const MAGIC: &[u8; 4] = b"MKCF";
const VERSION: u32 = 1;
const CONFIG_SUFFIX: &str = "cfg";
const TEMP_SUFFIX: &str = "cfg.tmp";

/// Size of an encoded record in bytes.
pub const RECORD_SIZE: usize = 8 + 4 * 8;

/// What the store keeps for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRecord {
    /// Size and age bounds of the partition.
    pub settings: PartitionSettings,
    /// Last committed consumer offset, if any.
    pub commit_offset: Option<u64>,
}

impl ConfigRecord {
    /// Creates a record with no commit offset.
    #[must_use]
    pub fn new(settings: PartitionSettings) -> Self {
        Self {
            settings,
            commit_offset: None,
        }
    }

    /// Encodes the record into its on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let fields = [
            clamp_i64(self.settings.max_segment_size),
            clamp_i64(self.settings.max_partition_size),
            clamp_i64(u64::try_from(self.settings.segment_ttl.as_millis()).unwrap_or(u64::MAX)),
            self.commit_offset.map_or(-1, clamp_i64),
        ];

        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
        for (i, field) in fields.iter().enumerate() {
            let start = 8 + i * 8;
            buf[start..start + 8].copy_from_slice(&field.to_le_bytes());
        }
        buf
    }

    /// Decodes a record, checking magic, version and field ranges.
    pub fn decode(data: &[u8]) -> BrokerResult<Self> {
        if data.len() != RECORD_SIZE {
            return Err(BrokerError::config(format!(
                "record is {} bytes, expected {RECORD_SIZE}",
                data.len()
            )));
        }
        if &data[0..4] != MAGIC {
            return Err(BrokerError::config("bad magic"));
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != VERSION {
            return Err(BrokerError::config(format!(
                "unsupported record version {version}"
            )));
        }

        let field = |i: usize| {
            let start = 8 + i * 8;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[start..start + 8]);
            i64::from_le_bytes(bytes)
        };
        let non_negative = |name: &str, value: i64| {
            u64::try_from(value)
                .map_err(|_| BrokerError::config(format!("negative {name}: {value}")))
        };

        let settings = PartitionSettings {
            max_segment_size: non_negative("max_segment_size", field(0))?,
            max_partition_size: non_negative("max_partition_size", field(1))?,
            segment_ttl: Duration::from_millis(non_negative("segment_ttl", field(2))?),
        };
        let commit_offset = match field(3) {
            -1 => None,
            value => Some(non_negative("commit_offset", value)?),
        };

        Ok(Self {
            settings,
            commit_offset,
        })
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Directory of config records, cached in memory.
#[derive(Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    records: BTreeMap<TopicPartition, ConfigRecord>,
}

impl ConfigStore {
    /// Opens the store in `dir`, creating the directory if needed, and
    /// loads every `*.cfg` record.
    ///
    /// Files whose name is not a valid `<topic>-<partition>` are skipped;
    /// leftover temporary files from an interrupted update are removed.
    ///
    /// # Errors
    ///
    /// Returns a file error if the directory cannot be read, and `Config`
    /// if a record is malformed.
    pub fn open(dir: impl AsRef<Path>) -> BrokerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| BrokerError::file("create", &dir, e))?;

        let mut records = BTreeMap::new();
        let entries = fs::read_dir(&dir).map_err(|e| BrokerError::file("scan", &dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| BrokerError::file("scan", &dir, e))?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.ends_with(&format!(".{TEMP_SUFFIX}")) {
                debug!(path = %path.display(), "removing stale temporary config");
                fs::remove_file(&path).map_err(|e| BrokerError::file("unlink", &path, e))?;
                continue;
            }

            let Some(stem) = name.strip_suffix(&format!(".{CONFIG_SUFFIX}")) else {
                continue;
            };
            let Some(key) = TopicPartition::parse(stem) else {
                warn!(path = %path.display(), "skipping config file with invalid name");
                continue;
            };

            let data = fs::read(&path).map_err(|e| BrokerError::file("read", &path, e))?;
            let record = ConfigRecord::decode(&data)
                .map_err(|e| BrokerError::config(format!("{}: {e}", path.display())))?;
            records.insert(key, record);
        }

        debug!(dir = %dir.display(), records = records.len(), "loaded config store");
        Ok(Self { dir, records })
    }

    /// Persists a new record for `key`.
    ///
    /// # Errors
    ///
    /// Returns `Topic` if a record for `key` already exists.
    pub fn create(&mut self, key: &TopicPartition, settings: PartitionSettings) -> BrokerResult<()> {
        let path = self.record_path(key);
        if self.records.contains_key(key) || path.exists() {
            return Err(BrokerError::topic(format!("config for {key} already exists")));
        }

        let record = ConfigRecord::new(settings);
        self.write_record(&path, &record)?;
        self.records.insert(key.clone(), record);
        Ok(())
    }

    /// Returns the record for `key`.
    pub fn get(&self, key: &TopicPartition) -> BrokerResult<&ConfigRecord> {
        self.records
            .get(key)
            .ok_or_else(|| BrokerError::not_found(format!("no config for {key}")))
    }

    /// Replaces the record for `key`, on disk and in memory.
    pub fn update(&mut self, key: &TopicPartition, record: ConfigRecord) -> BrokerResult<()> {
        if !self.records.contains_key(key) {
            return Err(BrokerError::not_found(format!("no config for {key}")));
        }
        let path = self.record_path(key);
        self.write_record(&path, &record)?;
        self.records.insert(key.clone(), record);
        Ok(())
    }

    /// Forgets the record for `key` and unlinks its file.
    pub fn remove(&mut self, key: &TopicPartition) -> BrokerResult<()> {
        if self.records.remove(key).is_none() {
            return Err(BrokerError::not_found(format!("no config for {key}")));
        }
        let path = self.record_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(BrokerError::file("unlink", &path, e)),
        }
        self.sync_directory()
    }

    /// Iterates over all keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &TopicPartition> {
        self.records.keys()
    }

    /// Iterates over all records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&TopicPartition, &ConfigRecord)> {
        self.records.iter()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &TopicPartition) -> PathBuf {
        self.dir.join(format!("{key}.{CONFIG_SUFFIX}"))
    }

    /// Writes to a temporary file, syncs it, renames it over `path`, then
    /// syncs the directory.
    fn write_record(&self, path: &Path, record: &ConfigRecord) -> BrokerResult<()> {
        let temp_path = path.with_extension(TEMP_SUFFIX);

        let mut file =
            File::create(&temp_path).map_err(|e| BrokerError::file("create", &temp_path, e))?;
        file.write_all(&record.encode())
            .map_err(|e| BrokerError::file("write", &temp_path, e))?;
        file.sync_all()
            .map_err(|e| BrokerError::file("sync", &temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, path).map_err(|e| BrokerError::file("rename", &temp_path, e))?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> BrokerResult<()> {
        let dir = File::open(&self.dir).map_err(|e| BrokerError::file("open", &self.dir, e))?;
        dir.sync_all()
            .map_err(|e| BrokerError::file("sync", &self.dir, e))
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> BrokerResult<()> {
        // NTFS journals metadata; directories cannot be fsynced.
        Ok(())
    }
}
