//! Log segments.
//!
//! A segment is one append-only data file plus its [`Index`]. Both files are
//! named after the segment's base offset:
//!
//! ```text
//! <base_offset:020>.log     | offset (8, i64 LE) | size (4, i32 LE) | payload (size) |
//! <base_offset:020>.index   one entry per record, see [`crate::index`]
//! ```
//!
//! ## Recovery
//!
//! The index on disk is never trusted. Opening a segment clears it and
//! replays the data file from byte 0, writing one index entry per complete
//! record. A partial record at the tail (a crash mid-append) ends the replay
//! and is cut off the data file so later appends stay aligned with the
//! rebuilt index. A record whose header carries the wrong offset is fatal.
//! The index grows past its configured size when the data file holds more
//! records than it could take, and the segment then reports itself full.

use crate::error::{CommitLogError, CommitLogResult};
use crate::index::{Index, IndexEntry, ENTRY_WIDTH};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Size of a record header: offset (8) + size (4).
pub const HEADER_SIZE: u64 = 12;

/// Extension of segment data files.
pub const LOG_SUFFIX: &str = "log";

/// Extension of segment index files.
pub const INDEX_SUFFIX: &str = "index";

/// Returns the data file path of the segment based at `base_offset`.
#[must_use]
pub fn log_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset:020}.{LOG_SUFFIX}"))
}

/// Returns the index file path of the segment based at `base_offset`.
#[must_use]
pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset:020}.{INDEX_SUFFIX}"))
}

/// Outcome of checking a data file without modifying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCheck {
    /// Base offset of the segment.
    pub base_offset: u64,
    /// Number of complete records.
    pub records: u64,
    /// Bytes up to the end of the last complete record.
    pub valid_len: u64,
    /// Length of the data file.
    pub file_len: u64,
}

impl LogCheck {
    /// Returns true if a partial record follows the last complete one.
    #[must_use]
    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.file_len
    }

    /// Returns the offset the next record would receive.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.base_offset + self.records
    }
}

/// Replays the data file of the segment based at `base_offset` in `dir`
/// without writing to it or to its index.
///
/// # Errors
///
/// Returns `File` if the data file cannot be opened and `Log` if a record
/// header is invalid or carries the wrong offset.
pub fn check_log(dir: &Path, base_offset: u64) -> CommitLogResult<LogCheck> {
    let path = log_path(dir, base_offset);
    let reader = File::open(&path).map_err(|e| CommitLogError::file("open", &path, e))?;
    let file_len = reader
        .metadata()
        .map_err(|e| CommitLogError::file("stat", &path, e))?
        .len();

    let replay = replay_log(&path, &reader, base_offset, file_len)?;
    Ok(LogCheck {
        base_offset,
        records: replay.positions.len() as u64,
        valid_len: replay.valid_len,
        file_len,
    })
}

#[derive(Debug)]
struct SegmentInner {
    /// Append-only handle.
    writer: Option<File>,
    /// Read-only handle used by `read_at`.
    reader: Option<File>,
    next_offset: u64,
    /// Bytes of valid data in the log file.
    position: u64,
    mtime: SystemTime,
}

/// One bounded piece of a partition's log.
///
/// # Thread Safety
///
/// A single mutex serializes writes, reads, close and delete.
#[derive(Debug)]
pub struct Segment {
    base_offset: u64,
    max_size: u64,
    log_path: PathBuf,
    index: Index,
    inner: Mutex<SegmentInner>,
}

impl Segment {
    /// Opens or creates the segment based at `base_offset` in `dir` and
    /// rebuilds its index from the data file.
    ///
    /// # Errors
    ///
    /// Returns `File` if either file cannot be opened, `Index` if the index
    /// fails its sanity check, and `Log` if the data file cannot be
    /// replayed.
    pub fn open(
        dir: &Path,
        base_offset: u64,
        max_size: u64,
        max_index_size: u64,
    ) -> CommitLogResult<Self> {
        let log_path = log_path(dir, base_offset);

        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| CommitLogError::file("open", &log_path, e))?;
        let reader =
            File::open(&log_path).map_err(|e| CommitLogError::file("open", &log_path, e))?;

        let metadata = writer
            .metadata()
            .map_err(|e| CommitLogError::file("stat", &log_path, e))?;
        let mtime = metadata
            .modified()
            .map_err(|e| CommitLogError::file("stat", &log_path, e))?;

        let replay = replay_log(&log_path, &reader, base_offset, metadata.len())?;

        // The index must hold every replayed record and still cover the
        // stale entries it is sanity checked against.
        let index_path = index_path(dir, base_offset);
        let stale_len = fs::metadata(&index_path).map_or(0, |m| m.len());
        let needed = (replay.positions.len() as u64).saturating_mul(ENTRY_WIDTH);
        let index = Index::open(
            &index_path,
            base_offset,
            max_index_size.max(needed).max(stale_len),
        )?;
        index.sanity_check()?;
        index.truncate_entries(0)?;
        for (offset, &position) in (base_offset..).zip(&replay.positions) {
            index.write(offset, position)?;
        }

        if replay.valid_len < metadata.len() {
            warn!(
                path = %log_path.display(),
                valid = replay.valid_len,
                file_size = metadata.len(),
                "truncating partial record at segment tail"
            );
            writer
                .set_len(replay.valid_len)
                .map_err(|e| CommitLogError::file("truncate", &log_path, e))?;
        }

        let segment = Self {
            base_offset,
            max_size,
            log_path,
            index,
            inner: Mutex::new(SegmentInner {
                writer: Some(writer),
                reader: Some(reader),
                next_offset: base_offset + replay.positions.len() as u64,
                position: replay.valid_len,
                mtime,
            }),
        };

        debug!(
            base_offset,
            next_offset = segment.next_offset(),
            size = segment.size(),
            "opened segment"
        );
        Ok(segment)
    }

    /// Appends `payload` as the next record and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns `Log` if the segment is closed or the append fails, and
    /// `Index` if the index has no room left, in which case nothing is
    /// appended. A failure after the data was appended is not rolled back;
    /// the next open repairs the index from the log.
    pub fn write(&self, payload: &[u8]) -> CommitLogResult<u64> {
        let size = i32::try_from(payload.len()).map_err(|_| {
            CommitLogError::log(format!("payload of {} bytes is too large", payload.len()))
        })?;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let writer = inner.writer.as_mut().ok_or_else(|| self.closed())?;

        if self.index.is_full() {
            return Err(CommitLogError::index(format!(
                "index of segment {} is full ({} entries)",
                self.base_offset,
                self.index.entry_count()
            )));
        }

        let offset = inner.next_offset;
        let mut record = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
        record.extend_from_slice(&offset.to_le_bytes());
        record.extend_from_slice(&size.to_le_bytes());
        record.extend_from_slice(payload);

        writer
            .write_all(&record)
            .map_err(|e| self.log_error("append", &e))?;
        self.index.write(offset, inner.position)?;

        inner.next_offset += 1;
        inner.position += record.len() as u64;
        inner.mtime = SystemTime::now();

        Ok(offset)
    }

    /// Reads the payload of the record at `relative_offset` (offset minus
    /// base offset).
    ///
    /// # Errors
    ///
    /// Returns `Log` if no such record exists, the segment is closed, or the
    /// stored record is short or inconsistent.
    pub fn read_at(&self, relative_offset: u64) -> CommitLogResult<Vec<u8>> {
        let mut guard = self.inner.lock();
        let entry = self
            .find_entry_locked(&guard, relative_offset)?
            .ok_or_else(|| {
                CommitLogError::log(format!(
                    "offset {} not found in segment {}",
                    self.base_offset.saturating_add(relative_offset),
                    self.base_offset
                ))
            })?;
        self.read_record_locked(&mut guard, entry)
    }

    /// Binary-searches the index for the entry of `relative_offset`.
    ///
    /// Returns `None` when the segment holds no such record.
    pub fn find_entry(&self, relative_offset: u64) -> CommitLogResult<Option<IndexEntry>> {
        let inner = self.inner.lock();
        self.find_entry_locked(&inner, relative_offset)
    }

    fn find_entry_locked(
        &self,
        inner: &SegmentInner,
        relative_offset: u64,
    ) -> CommitLogResult<Option<IndexEntry>> {
        let count = inner.next_offset.saturating_sub(self.base_offset);
        let Some(target) = self.base_offset.checked_add(relative_offset) else {
            return Ok(None);
        };
        if count == 0 || inner.writer.is_none() {
            return Ok(None);
        }

        // Last slot whose offset is <= target.
        let (mut begin, mut end) = (0u64, count - 1);
        while begin < end {
            let mid = begin + (end - begin + 1) / 2;
            if self.index.entry(mid)?.offset <= target {
                begin = mid;
            } else {
                end = mid - 1;
            }
        }

        let entry = self.index.entry(begin)?;
        Ok((entry.offset == target).then_some(entry))
    }

    fn read_record_locked(
        &self,
        inner: &mut SegmentInner,
        entry: IndexEntry,
    ) -> CommitLogResult<Vec<u8>> {
        let limit = inner.position;
        let reader = inner.reader.as_mut().ok_or_else(|| self.closed())?;

        reader
            .seek(SeekFrom::Start(entry.position))
            .map_err(|e| self.log_error("seek", &e))?;

        let mut header = [0u8; HEADER_SIZE as usize];
        reader
            .read_exact(&mut header)
            .map_err(|e| self.log_error("read header", &e))?;
        let (offset, size) = decode_header(&self.log_path, &header, entry.position)?;

        if offset != entry.offset {
            return Err(CommitLogError::log(format!(
                "{}: index points at offset {} but record at position {} has offset {offset}",
                self.log_path.display(),
                entry.offset,
                entry.position
            )));
        }
        if entry.position + HEADER_SIZE + size > limit {
            return Err(CommitLogError::log(format!(
                "{}: record at position {} overruns the segment",
                self.log_path.display(),
                entry.position
            )));
        }

        let mut payload = vec![0u8; size as usize];
        reader
            .read_exact(&mut payload)
            .map_err(|e| self.log_error("read payload", &e))?;
        Ok(payload)
    }

    /// Returns true once the segment holds more than its maximum size or
    /// its index cannot take another entry.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.inner.lock().position > self.max_size || self.index.is_full()
    }

    /// Syncs the data file and the index to stable storage.
    pub fn sync(&self) -> CommitLogResult<()> {
        let inner = self.inner.lock();
        if let Some(writer) = inner.writer.as_ref() {
            writer
                .sync_data()
                .map_err(|e| CommitLogError::file("sync", &self.log_path, e))?;
        }
        self.index.sync()
    }

    /// Closes both file handles and the index.
    ///
    /// Calling this on a closed segment is a no-op.
    pub fn close(&self) -> CommitLogResult<()> {
        let mut inner = self.inner.lock();
        inner.reader = None;
        inner.next_offset = 0;
        inner.position = 0;

        if let Some(writer) = inner.writer.take() {
            writer
                .sync_all()
                .map_err(|e| CommitLogError::file("sync", &self.log_path, e))?;
        }
        self.index.close()
    }

    /// Closes the segment, then unlinks its data and index files.
    pub fn delete(&self) -> CommitLogResult<()> {
        self.close()?;
        let _guard = self.inner.lock();
        fs::remove_file(&self.log_path)
            .map_err(|e| CommitLogError::file("unlink", &self.log_path, e))?;
        self.index.delete()
    }

    /// Writes every record of the segment to `out`, one per line.
    ///
    /// Diagnostic only; holds the segment lock for the whole walk.
    pub fn dump<W: Write>(&self, out: &mut W) -> CommitLogResult<()> {
        let mut guard = self.inner.lock();
        let count = guard.next_offset.saturating_sub(self.base_offset);

        writeln!(
            out,
            "segment {} ({} records, {} bytes)",
            self.log_path.display(),
            count,
            guard.position
        )
        .map_err(|e| self.log_error("dump", &e))?;

        for slot in 0..count {
            let entry = self.index.entry(slot)?;
            let payload = self.read_record_locked(&mut guard, entry)?;
            writeln!(
                out,
                "  offset: {} position: {} size: {} payload: {}",
                entry.offset,
                entry.position,
                payload.len(),
                String::from_utf8_lossy(&payload)
            )
            .map_err(|e| self.log_error("dump", &e))?;
        }
        Ok(())
    }

    /// Returns the offset of the first record.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns the offset the next write will receive.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.inner.lock().next_offset
    }

    /// Returns the number of bytes of valid data in the log file.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().position
    }

    /// Returns the number of records in the segment.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.inner.lock().next_offset.saturating_sub(self.base_offset)
    }

    /// Returns the rollover threshold.
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Returns the time of the last write, or the file's mtime if none
    /// happened since open.
    #[must_use]
    pub fn mtime(&self) -> SystemTime {
        self.inner.lock().mtime
    }

    /// Returns the path to the data file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Returns the path to the index file.
    #[must_use]
    pub fn index_path(&self) -> &Path {
        self.index.path()
    }

    /// Returns true once both file handles and the index are closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let inner = self.inner.lock();
        inner.writer.is_none() && inner.reader.is_none() && self.index.is_closed()
    }

    fn closed(&self) -> CommitLogError {
        CommitLogError::log(format!("segment {} is closed", self.log_path.display()))
    }

    fn log_error(&self, action: &str, err: &std::io::Error) -> CommitLogError {
        CommitLogError::log(format!("can't {action} {}: {err}", self.log_path.display()))
    }
}

/// Outcome of replaying a data file.
struct Replay {
    /// Byte position of every complete record, in offset order.
    positions: Vec<u64>,
    /// Length of the data file up to the end of the last complete record.
    valid_len: u64,
}

/// Scans the data file from byte 0 and validates every record header.
fn replay_log(
    path: &Path,
    reader: &File,
    base_offset: u64,
    file_size: u64,
) -> CommitLogResult<Replay> {
    let io_error = |action: &str, e: std::io::Error| {
        CommitLogError::log(format!("can't {action} {}: {e}", path.display()))
    };

    let mut buf = BufReader::new(reader);
    buf.seek(SeekFrom::Start(0)).map_err(|e| io_error("seek", e))?;

    let mut positions = Vec::new();
    let mut position = 0u64;
    let mut header = [0u8; HEADER_SIZE as usize];
    while position + HEADER_SIZE <= file_size {
        buf.read_exact(&mut header)
            .map_err(|e| io_error("read header during recovery", e))?;
        let (offset, size) = decode_header(path, &header, position)?;

        let expected = base_offset + positions.len() as u64;
        if offset != expected {
            return Err(CommitLogError::log(format!(
                "{} seems corrupted: expected offset {expected} at position {position}, found {offset}",
                path.display()
            )));
        }
        if position + HEADER_SIZE + size > file_size {
            break;
        }

        buf.seek_relative(size as i64)
            .map_err(|e| io_error("skip payload during recovery", e))?;
        positions.push(position);
        position += HEADER_SIZE + size;
    }

    Ok(Replay {
        positions,
        valid_len: position,
    })
}

fn decode_header(
    path: &Path,
    header: &[u8; HEADER_SIZE as usize],
    position: u64,
) -> CommitLogResult<(u64, u64)> {
    let mut offset = [0u8; 8];
    offset.copy_from_slice(&header[..8]);
    let mut size = [0u8; 4];
    size.copy_from_slice(&header[8..]);

    let offset = i64::from_le_bytes(offset);
    let size = i32::from_le_bytes(size);
    match (u64::try_from(offset), u64::try_from(size)) {
        (Ok(offset), Ok(size)) => Ok((offset, size)),
        _ => Err(CommitLogError::log(format!(
            "{}: invalid record header ({offset}, {size}) at position {position}",
            path.display()
        ))),
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.log_path.display(), error = %err, "failed to close segment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_INDEX_SIZE;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    const PAYLOADS: [&str; 10] = [
        "{my_payload:apple, value:1}",
        "{my_payload:orange, value:42}",
        "{my_payload:banana, value:5}",
        "{my_payload:raspberries, value:875}",
        "{my_payload:pear, value:381}",
        "{my_payload:pineapple, value:0}",
        "{my_payload:strawberry, value:28756}",
        "{my_payload:cherry, value:4632}",
        "{my_payload:coconut, value:123456789}",
        "{my_payload:mango, value:00}",
    ];

    fn payloads_size() -> u64 {
        PAYLOADS.iter().map(|p| p.len() as u64 + HEADER_SIZE).sum()
    }

    fn open(dir: &Path, base_offset: u64, max_size: u64) -> Segment {
        Segment::open(dir, base_offset, max_size, DEFAULT_MAX_INDEX_SIZE).unwrap()
    }

    #[test]
    fn file_names() {
        let dir = Path::new("/data/topic/0");
        assert_eq!(
            log_path(dir, 42),
            PathBuf::from("/data/topic/0/00000000000000000042.log")
        );
        assert_eq!(
            index_path(dir, 42),
            PathBuf::from("/data/topic/0/00000000000000000042.index")
        );
    }

    #[test]
    fn write_read_close() {
        let dir = tempdir().unwrap();
        let size = payloads_size();
        let segment = open(dir.path(), 0, size);

        for (i, payload) in PAYLOADS.iter().enumerate() {
            assert_eq!(segment.write(payload.as_bytes()).unwrap(), i as u64);
        }
        assert_eq!(fs::metadata(segment.log_path()).unwrap().len(), size);
        assert_eq!(segment.size(), size);
        assert_eq!(segment.next_offset(), 10);

        for (i, payload) in PAYLOADS.iter().enumerate() {
            assert_eq!(segment.read_at(i as u64).unwrap(), payload.as_bytes());
        }

        segment.close().unwrap();
        assert!(segment.is_closed());
        assert_eq!(segment.next_offset(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 0, 1024);
        segment.write(b"x").unwrap();

        segment.close().unwrap();
        segment.close().unwrap();
        assert!(segment.is_closed());

        let err = segment.write(b"y").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Log);
        assert!(segment.read_at(0).is_err());
    }

    #[test]
    fn reopen_rebuilds_index() {
        let dir = tempdir().unwrap();
        {
            let segment = open(dir.path(), 100, 4096);
            for payload in PAYLOADS {
                segment.write(payload.as_bytes()).unwrap();
            }
            segment.close().unwrap();
        }

        // Only the log is authoritative.
        fs::remove_file(index_path(dir.path(), 100)).unwrap();

        let segment = open(dir.path(), 100, 4096);
        assert_eq!(segment.base_offset(), 100);
        assert_eq!(segment.next_offset(), 110);
        assert_eq!(segment.record_count(), 10);
        assert_eq!(segment.size(), payloads_size());
        for (i, payload) in PAYLOADS.iter().enumerate() {
            assert_eq!(segment.read_at(i as u64).unwrap(), payload.as_bytes());
        }
        assert_eq!(segment.write(b"next").unwrap(), 110);
    }

    #[test]
    fn stale_index_is_replaced() {
        let dir = tempdir().unwrap();
        {
            let segment = open(dir.path(), 0, 4096);
            segment.write(b"one").unwrap();
            segment.write(b"two").unwrap();
        }
        // Well-formed but wrong: a single entry pointing at offset 0.
        fs::write(index_path(dir.path(), 0), [0u8; 8]).unwrap();

        let segment = open(dir.path(), 0, 4096);
        assert_eq!(segment.next_offset(), 2);
        assert_eq!(segment.find_entry(1).unwrap().unwrap().position, HEADER_SIZE + 3);
    }

    #[test]
    fn corrupted_index_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(index_path(dir.path(), 0), [0xFFu8; 16]).unwrap();

        let err = Segment::open(dir.path(), 0, 4096, DEFAULT_MAX_INDEX_SIZE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = log_path(dir.path(), 0);
        {
            let segment = open(dir.path(), 0, 4096);
            for payload in &PAYLOADS[..3] {
                segment.write(payload.as_bytes()).unwrap();
            }
        }
        let valid = fs::metadata(&path).unwrap().len();

        // A header claiming 100 bytes followed by only 4 of them.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&3u64.to_le_bytes()).unwrap();
        file.write_all(&100i32.to_le_bytes()).unwrap();
        file.write_all(b"torn").unwrap();
        drop(file);

        let segment = open(dir.path(), 0, 4096);
        assert_eq!(segment.next_offset(), 3);
        assert_eq!(fs::metadata(&path).unwrap().len(), valid);

        assert_eq!(segment.write(b"after crash").unwrap(), 3);
        assert_eq!(segment.read_at(3).unwrap(), b"after crash");
        assert_eq!(segment.read_at(2).unwrap(), PAYLOADS[2].as_bytes());
    }

    #[test]
    fn short_header_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = log_path(dir.path(), 0);
        {
            let segment = open(dir.path(), 0, 4096);
            segment.write(b"only").unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[1, 0, 0]).unwrap();
        drop(file);

        let segment = open(dir.path(), 0, 4096);
        assert_eq!(segment.next_offset(), 1);
        assert_eq!(segment.size(), HEADER_SIZE + 4);
    }

    #[test]
    fn offset_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let mut record = Vec::new();
        record.extend_from_slice(&7u64.to_le_bytes());
        record.extend_from_slice(&3i32.to_le_bytes());
        record.extend_from_slice(b"abc");
        fs::write(log_path(dir.path(), 0), record).unwrap();

        let err = Segment::open(dir.path(), 0, 4096, DEFAULT_MAX_INDEX_SIZE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Log);
    }

    #[test]
    fn find_entry_boundaries() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 50, 4096);
        assert_eq!(segment.find_entry(0).unwrap(), None);

        for payload in PAYLOADS {
            segment.write(payload.as_bytes()).unwrap();
        }

        let mut position = 0;
        for (i, payload) in PAYLOADS.iter().enumerate() {
            let entry = segment.find_entry(i as u64).unwrap().unwrap();
            assert_eq!(entry.offset, 50 + i as u64);
            assert_eq!(entry.position, position);
            position += HEADER_SIZE + payload.len() as u64;
        }
        assert_eq!(segment.find_entry(10).unwrap(), None);
        assert_eq!(segment.find_entry(u64::MAX).unwrap(), None);

        let err = segment.read_at(10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Log);
    }

    #[test]
    fn full_only_past_max_size() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 0, 2 * (HEADER_SIZE + 4));

        segment.write(b"aaaa").unwrap();
        assert!(!segment.is_full());
        segment.write(b"bbbb").unwrap();
        assert!(!segment.is_full(), "exactly max_size is not full");
        segment.write(b"c").unwrap();
        assert!(segment.is_full());
    }

    #[test]
    fn full_once_index_is_exhausted() {
        let dir = tempdir().unwrap();
        let segment = Segment::open(dir.path(), 0, 4096, 16).unwrap();
        segment.write(b"a").unwrap();
        assert!(!segment.is_full());
        segment.write(b"b").unwrap();
        assert!(segment.is_full(), "two entries fill a 16 byte index");

        let err = segment.write(b"c").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        assert_eq!(segment.next_offset(), 2);
        assert_eq!(segment.size(), 2 * (HEADER_SIZE + 1));
        assert_eq!(
            fs::metadata(segment.log_path()).unwrap().len(),
            2 * (HEADER_SIZE + 1),
            "a refused write leaves nothing in the log"
        );
    }

    #[test]
    fn check_leaves_torn_tail_in_place() {
        let dir = tempdir().unwrap();
        let path = log_path(dir.path(), 7);
        {
            let segment = open(dir.path(), 7, 4096);
            segment.write(b"one").unwrap();
            segment.write(b"two").unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0u8; 5]).unwrap();
        drop(file);

        let check = check_log(dir.path(), 7).unwrap();
        assert_eq!(check.records, 2);
        assert_eq!(check.next_offset(), 9);
        assert_eq!(check.valid_len, 2 * HEADER_SIZE + 6);
        assert!(check.has_torn_tail());
        assert_eq!(fs::metadata(&path).unwrap().len(), check.file_len);
        assert_eq!(check.file_len, check.valid_len + 5);
    }

    #[test]
    fn reopen_with_smaller_index_grows_it() {
        let dir = tempdir().unwrap();
        {
            let segment = open(dir.path(), 0, 4096);
            for payload in &PAYLOADS[..5] {
                segment.write(payload.as_bytes()).unwrap();
            }
        }

        let segment = Segment::open(dir.path(), 0, 4096, 16).unwrap();
        assert_eq!(segment.next_offset(), 5);
        assert!(segment.is_full());
        for (i, payload) in PAYLOADS[..5].iter().enumerate() {
            assert_eq!(segment.read_at(i as u64).unwrap(), payload.as_bytes());
        }
    }

    #[test]
    fn empty_payload() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 0, 4096);
        segment.write(b"").unwrap();
        segment.write(b"z").unwrap();

        assert!(segment.read_at(0).unwrap().is_empty());
        assert_eq!(segment.read_at(1).unwrap(), b"z");
    }

    #[test]
    fn delete_removes_files() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 0, 4096);
        segment.write(b"gone").unwrap();
        let log = segment.log_path().to_path_buf();
        let index = segment.index_path().to_path_buf();

        segment.delete().unwrap();
        assert!(!log.exists());
        assert!(!index.exists());
        assert!(segment.is_closed());
    }

    #[test]
    fn dump_lists_records() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 0, 4096);
        segment.write(b"hello").unwrap();
        segment.write(b"world").unwrap();

        let mut out = Vec::new();
        segment.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("2 records"));
        assert!(text.contains("offset: 0 position: 0 size: 5 payload: hello"));
        assert!(text.contains("offset: 1 position: 17 size: 5 payload: world"));
    }

    #[test]
    fn write_updates_mtime() {
        let dir = tempdir().unwrap();
        let segment = open(dir.path(), 0, 4096);
        let before = segment.mtime();
        std::thread::sleep(std::time::Duration::from_millis(20));
        segment.write(b"tick").unwrap();
        assert!(segment.mtime() > before);
    }
}
