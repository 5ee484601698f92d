//! Partitions: one logical log made of bounded segments.
//!
//! ```text
//! <partition_dir>/
//! ├─ LOCK                        # advisory lock while open
//! ├─ 00000000000000000000.log
//! ├─ 00000000000000000000.index
//! ├─ 00000000000000000042.log    # base offset 42
//! └─ 00000000000000000042.index
//! ```
//!
//! Segments are kept sorted by base offset. The last one is the active
//! segment: it takes every write and is never removed by retention.

use crate::config::PartitionConfig;
use crate::error::{CommitLogError, CommitLogResult};
use crate::segment::{self, LogCheck, Segment, HEADER_SIZE, LOG_SUFFIX};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Advisory lock file held while a partition is open.
const LOCK_FILE: &str = "LOCK";

#[derive(Debug)]
struct PartitionState {
    /// Sorted by base offset; the last one is active.
    segments: Vec<Segment>,
    physical_size: u64,
    closed: bool,
    lock_file: Option<File>,
}

/// An append-only, offset-addressed log stored in one directory.
///
/// # Thread Safety
///
/// A reader-writer lock guards the segment list. Writes, rollover,
/// retention and close take it exclusively. Reads and offset queries share
/// it; each segment serializes its own file access.
///
/// # Example
///
/// ```no_run
/// use mykafka_commitlog::{Partition, PartitionConfig};
///
/// let partition = Partition::open("data/events/0", PartitionConfig::default()).unwrap();
/// let offset = partition.write(b"hello").unwrap();
/// assert_eq!(partition.read_at(offset).unwrap(), b"hello");
/// ```
#[derive(Debug)]
pub struct Partition {
    path: PathBuf,
    config: PartitionConfig,
    state: RwLock<PartitionState>,
}

impl Partition {
    /// Opens the partition stored in `path`, creating it if missing.
    ///
    /// Every `<base_offset>.log` file found becomes a segment; an empty
    /// directory gets a single segment at offset 0. One retention pass runs
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilename` for an empty path, `Partition` if another
    /// process holds the directory, and the first segment error otherwise.
    pub fn open(path: impl AsRef<Path>, config: PartitionConfig) -> CommitLogResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(CommitLogError::invalid_filename("empty partition path given"));
        }
        let path =
            std::path::absolute(path).map_err(|e| CommitLogError::file("resolve", path, e))?;

        fs::create_dir_all(&path).map_err(|e| CommitLogError::file("create", &path, e))?;
        let lock_file = lock_directory(&path)?;

        let mut segments = Vec::new();
        let mut physical_size = 0;
        for base_offset in discover_base_offsets(&path)? {
            let segment = Segment::open(
                &path,
                base_offset,
                config.max_segment_size,
                config.max_index_size,
            )?;
            physical_size += segment.size();
            segments.push(segment);
        }

        if segments.is_empty() {
            segments.push(Segment::open(
                &path,
                0,
                config.max_segment_size,
                config.max_index_size,
            )?);
        }

        let partition = Self {
            path,
            config,
            state: RwLock::new(PartitionState {
                segments,
                physical_size,
                closed: false,
                lock_file: Some(lock_file),
            }),
        };

        {
            let mut state = partition.state.write();
            partition.clean_locked(&mut state)?;
            info!(
                path = %partition.path.display(),
                segments = state.segments.len(),
                physical_size = state.physical_size,
                "opened partition"
            );
        }

        Ok(partition)
    }

    /// Appends `payload` and returns its offset.
    ///
    /// Rolls over to a new segment first if the active one is full. A
    /// retention failure during rollover is logged and does not fail the
    /// write.
    ///
    /// # Errors
    ///
    /// Returns `Partition` if the partition is closed, or the segment's
    /// error if the write fails.
    pub fn write(&self, payload: &[u8]) -> CommitLogResult<u64> {
        let mut state = self.state.write();
        if state.closed {
            return Err(CommitLogError::partition_closed());
        }

        let active = state
            .segments
            .last()
            .ok_or_else(CommitLogError::partition_closed)?;
        if active.is_full() {
            let base_offset = active.next_offset();
            let segment = Segment::open(
                &self.path,
                base_offset,
                self.config.max_segment_size,
                self.config.max_index_size,
            )?;
            info!(path = %self.path.display(), base_offset, "rolled over to new segment");
            state.segments.push(segment);

            if self.config.has_retention() {
                if let Err(err) = self.clean_locked(&mut state) {
                    warn!(
                        path = %self.path.display(),
                        error = %err,
                        "retention failed after rollover"
                    );
                }
            }
        }

        let active = state
            .segments
            .last()
            .ok_or_else(CommitLogError::partition_closed)?;
        let offset = active.write(payload)?;
        state.physical_size += payload.len() as u64 + HEADER_SIZE;

        Ok(offset)
    }

    /// Reads the payload stored at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Partition` if the partition is closed, if nothing has been
    /// written at `offset` yet, or if `offset` precedes the oldest segment.
    /// Segment read errors are forwarded.
    pub fn read_at(&self, offset: u64) -> CommitLogResult<Vec<u8>> {
        let state = self.state.read();
        if state.closed {
            return Err(CommitLogError::partition_closed());
        }

        let newest = state.segments.last().map_or(0, Segment::next_offset);
        if offset >= newest {
            return Err(CommitLogError::partition(format!(
                "no data at offset {offset} yet (newest offset is {newest})"
            )));
        }

        let segment = find_segment(&state.segments, offset).ok_or_else(|| {
            CommitLogError::partition(format!(
                "offset {offset} is out of range (oldest offset is {})",
                state.segments.first().map_or(0, Segment::base_offset)
            ))
        })?;
        segment.read_at(offset - segment.base_offset())
    }

    /// Returns the offset the next write will receive, or `None` once
    /// closed.
    #[must_use]
    pub fn newest_offset(&self) -> Option<u64> {
        let state = self.state.read();
        if state.closed {
            return None;
        }
        state.segments.last().map(Segment::next_offset)
    }

    /// Returns the offset of the oldest retained record, or `None` once
    /// closed.
    #[must_use]
    pub fn oldest_offset(&self) -> Option<u64> {
        let state = self.state.read();
        if state.closed {
            return None;
        }
        state.segments.first().map(Segment::base_offset)
    }

    /// Checks every segment of the partition directory at `path` without
    /// opening the partition, so nothing on disk is repaired or locked.
    ///
    /// # Errors
    ///
    /// Returns `File` if the directory cannot be scanned, or the first
    /// segment's check error.
    pub fn check(path: impl AsRef<Path>) -> CommitLogResult<Vec<LogCheck>> {
        let path = path.as_ref();
        discover_base_offsets(path)?
            .into_iter()
            .map(|base_offset| segment::check_log(path, base_offset))
            .collect()
    }

    /// Returns the approximate size of the partition: header and payload
    /// bytes of every retained record.
    #[must_use]
    pub fn physical_size(&self) -> u64 {
        self.state.read().physical_size
    }

    /// Removes inactive segments that are past the TTL or that keep the
    /// partition above its size bound. Returns how many were removed.
    pub fn clean_old_segments(&self) -> CommitLogResult<usize> {
        let mut state = self.state.write();
        if state.closed {
            return Err(CommitLogError::partition_closed());
        }
        self.clean_locked(&mut state)
    }

    fn clean_locked(&self, state: &mut PartitionState) -> CommitLogResult<usize> {
        let ttl = self.config.segment_ttl;
        let max_size = self.config.max_partition_size;
        let now = SystemTime::now();

        let mut removed = 0;
        let mut i = 0;
        while i + 1 < state.segments.len() {
            let segment = &state.segments[i];
            let expired = !ttl.is_zero()
                && now
                    .duration_since(segment.mtime())
                    .is_ok_and(|age| age > ttl);
            let oversized = max_size != 0 && state.physical_size > max_size;

            if !expired && !oversized {
                i += 1;
                continue;
            }

            // Detached before unlinking; files a failed unlink leaves behind
            // are picked up again by the next open.
            let segment = state.segments.remove(i);
            let size = segment.size();
            state.physical_size = state.physical_size.saturating_sub(size);
            segment.delete()?;
            removed += 1;

            info!(
                path = %self.path.display(),
                base_offset = segment.base_offset(),
                size,
                expired,
                "removed segment by retention"
            );
        }

        Ok(removed)
    }

    /// Syncs the active segment to stable storage.
    ///
    /// Inactive segments are synced when they are closed.
    pub fn sync(&self) -> CommitLogResult<()> {
        let state = self.state.read();
        if state.closed {
            return Err(CommitLogError::partition_closed());
        }
        match state.segments.last() {
            Some(active) => active.sync(),
            None => Ok(()),
        }
    }

    /// Closes every segment and releases the directory lock.
    ///
    /// The partition cannot be used afterwards; open it again instead.
    /// Calling this on a closed partition is a no-op.
    pub fn close(&self) -> CommitLogResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.physical_size = 0;

        let mut result = Ok(());
        for segment in std::mem::take(&mut state.segments) {
            if let Err(err) = segment.close() {
                warn!(path = %segment.log_path().display(), error = %err, "failed to close segment");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        state.lock_file = None;

        debug!(path = %self.path.display(), "closed partition");
        result
    }

    /// Closes the partition and removes its directory.
    pub fn delete(&self) -> CommitLogResult<()> {
        self.close()?;
        fs::remove_dir_all(&self.path).map_err(|e| CommitLogError::file("remove", &self.path, e))?;
        info!(path = %self.path.display(), "deleted partition");
        Ok(())
    }

    /// Writes every segment's records to `out`.
    pub fn dump<W: Write>(&self, out: &mut W) -> CommitLogResult<()> {
        let state = self.state.read();
        if state.closed {
            return Err(CommitLogError::partition_closed());
        }
        for segment in &state.segments {
            segment.dump(out)?;
        }
        Ok(())
    }

    /// Returns the absolute path of the partition directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration the partition was opened with.
    #[must_use]
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Returns the number of segments currently retained.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.state.read().segments.len()
    }

    /// Returns the base offsets of all retained segments, oldest first.
    #[must_use]
    pub fn segment_base_offsets(&self) -> Vec<u64> {
        self.state
            .read()
            .segments
            .iter()
            .map(Segment::base_offset)
            .collect()
    }

    /// Returns true once the partition has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }
}

impl Drop for Partition {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "failed to close partition");
        }
    }
}

/// Returns the segment with the greatest base offset `<= offset`.
fn find_segment(segments: &[Segment], offset: u64) -> Option<&Segment> {
    let idx = segments.partition_point(|segment| segment.base_offset() <= offset);
    idx.checked_sub(1).and_then(|i| segments.get(i))
}

/// Lists the base offsets of the `*.log` files in `dir`, ascending.
fn discover_base_offsets(dir: &Path) -> CommitLogResult<Vec<u64>> {
    let entries = fs::read_dir(dir).map_err(|e| CommitLogError::file("scan", dir, e))?;

    let mut base_offsets = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| CommitLogError::file("scan", dir, e))?
            .path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(LOG_SUFFIX) {
            continue;
        }
        match path.file_stem().and_then(|stem| stem.to_str()).and_then(parse_base_offset) {
            Some(base_offset) => base_offsets.push(base_offset),
            None => debug!(path = %path.display(), "skipping log file with invalid name"),
        }
    }

    base_offsets.sort_unstable();
    Ok(base_offsets)
}

fn parse_base_offset(stem: &str) -> Option<u64> {
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

fn lock_directory(dir: &Path) -> CommitLogResult<File> {
    let lock_path = dir.join(LOCK_FILE);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| CommitLogError::file("open", &lock_path, e))?;

    if lock_file.try_lock_exclusive().is_err() {
        return Err(CommitLogError::partition(format!(
            "{} is locked by another process",
            dir.display()
        )));
    }
    Ok(lock_file)
}
