//! Memory-mapped offset index of a segment.
//!
//! ## Entry Format
//!
//! ```text
//! | relative_offset (4, i32 LE) | relative_position (4, i32 LE) |
//! ```
//!
//! `relative_offset` is the record offset minus the segment base offset and
//! `relative_position` is the byte position of the record header in the
//! segment's data file. Entries are appended in record order, so the array
//! is sorted by offset.
//!
//! The backing file is pre-allocated to the index capacity and mapped once.
//! On close it is truncated back to the bytes actually written.

use crate::error::{CommitLogError, CommitLogResult};
use memmap2::MmapMut;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Width of the relative offset field.
const OFFSET_WIDTH: usize = 4;

/// Width of the relative position field.
const POSITION_WIDTH: usize = 4;

/// Width of one index entry in bytes.
pub const ENTRY_WIDTH: u64 = (OFFSET_WIDTH + POSITION_WIDTH) as u64;

/// A decoded index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Absolute offset of the record.
    pub offset: u64,
    /// Byte position of the record header in the data file.
    pub position: u64,
}

#[derive(Debug)]
struct IndexInner {
    file: Option<File>,
    mmap: Option<MmapMut>,
    /// Write cursor, in bytes. Also the logical length of the file.
    position: u64,
}

/// Fixed-capacity, memory-mapped array of [`IndexEntry`] values.
///
/// # Thread Safety
///
/// Writes, syncs and close take the internal lock exclusively; reads and
/// sanity checks share it.
#[derive(Debug)]
pub struct Index {
    path: PathBuf,
    base_offset: u64,
    capacity: u64,
    inner: RwLock<IndexInner>,
}

impl Index {
    /// Opens or creates the index file at `path`.
    ///
    /// The current file length becomes the write cursor. The file is then
    /// resized to `max_size` rounded down to a whole number of entries and
    /// mapped read/write.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilename` for an empty path, `Index` if `max_size`
    /// cannot hold a single entry, and `File` for any OS failure.
    pub fn open(path: impl AsRef<Path>, base_offset: u64, max_size: u64) -> CommitLogResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(CommitLogError::invalid_filename("empty index filename given"));
        }

        let capacity = round_down_to_multiple(max_size, ENTRY_WIDTH);
        if capacity == 0 {
            return Err(CommitLogError::index(format!(
                "index capacity {max_size} cannot hold a single entry"
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| CommitLogError::file("open", path, e))?;

        let position = file
            .metadata()
            .map_err(|e| CommitLogError::file("stat", path, e))?
            .len();

        file.set_len(capacity)
            .map_err(|e| CommitLogError::file("resize", path, e))?;

        let mmap = map_file(&file).map_err(|e| CommitLogError::file("map", path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            base_offset,
            capacity,
            inner: RwLock::new(IndexInner {
                file: Some(file),
                mmap: Some(mmap),
                position,
            }),
        })
    }

    /// Appends an entry for the record at `absolute_offset`, stored at
    /// byte `position` of the data file.
    ///
    /// # Errors
    ///
    /// Returns `Index` when the capacity is exhausted ("write overflow"),
    /// when the offset precedes the base offset, or when either value does
    /// not fit in 32 bits.
    pub fn write(&self, absolute_offset: u64, position: u64) -> CommitLogResult<()> {
        let rel_offset = absolute_offset
            .checked_sub(self.base_offset)
            .and_then(|rel| i32::try_from(rel).ok())
            .ok_or_else(|| {
                CommitLogError::index(format!(
                    "offset {absolute_offset} out of range for base offset {}",
                    self.base_offset
                ))
            })?;
        let rel_position = i32::try_from(position).map_err(|_| {
            CommitLogError::index(format!("position {position} does not fit in an entry"))
        })?;

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let cursor = inner.position;
        if cursor + ENTRY_WIDTH > self.capacity {
            return Err(CommitLogError::index(format!(
                "write overflow ({cursor} >= {})",
                self.capacity
            )));
        }

        let mmap = inner.mmap.as_mut().ok_or_else(closed)?;
        let start = cursor as usize;
        mmap[start..start + OFFSET_WIDTH].copy_from_slice(&rel_offset.to_le_bytes());
        mmap[start + OFFSET_WIDTH..start + OFFSET_WIDTH + POSITION_WIDTH]
            .copy_from_slice(&rel_position.to_le_bytes());

        inner.position += ENTRY_WIDTH;
        Ok(())
    }

    /// Reads the entry stored at `byte_offset` (a multiple of
    /// [`ENTRY_WIDTH`]).
    ///
    /// # Errors
    ///
    /// Returns `Index` if the read would go past the capacity, if the entry
    /// is corrupted, or if the index is closed.
    pub fn read(&self, byte_offset: u64) -> CommitLogResult<IndexEntry> {
        let inner = self.inner.read();
        self.read_locked(&inner, byte_offset)
    }

    /// Reads the entry in slot `slot`.
    pub fn entry(&self, slot: u64) -> CommitLogResult<IndexEntry> {
        let byte_offset = slot
            .checked_mul(ENTRY_WIDTH)
            .ok_or_else(|| CommitLogError::index(format!("slot {slot} out of range")))?;
        self.read(byte_offset)
    }

    fn read_locked(&self, inner: &IndexInner, byte_offset: u64) -> CommitLogResult<IndexEntry> {
        if byte_offset > self.capacity - ENTRY_WIDTH {
            return Err(CommitLogError::index(format!(
                "read overflow ({byte_offset} > {})",
                self.capacity - ENTRY_WIDTH
            )));
        }

        let mmap = inner.mmap.as_ref().ok_or_else(closed)?;
        let start = byte_offset as usize;
        let rel_offset = read_i32(&mmap[start..start + OFFSET_WIDTH]);
        let rel_position =
            read_i32(&mmap[start + OFFSET_WIDTH..start + OFFSET_WIDTH + POSITION_WIDTH]);

        let (Ok(rel_offset), Ok(rel_position)) =
            (u64::try_from(rel_offset), u64::try_from(rel_position))
        else {
            return Err(CommitLogError::index(format!(
                "index seems corrupted: negative entry ({rel_offset}, {rel_position}) at byte {byte_offset}"
            )));
        };

        Ok(IndexEntry {
            offset: self.base_offset + rel_offset,
            position: rel_position,
        })
    }

    /// Flushes the mapped pages, then the file, to stable storage.
    ///
    /// A closed index has nothing to flush.
    pub fn sync(&self) -> CommitLogResult<()> {
        let inner = self.inner.write();
        if let Some(mmap) = inner.mmap.as_ref() {
            mmap.flush()
                .map_err(|e| CommitLogError::file("msync", &self.path, e))?;
        }
        if let Some(file) = inner.file.as_ref() {
            file.sync_all()
                .map_err(|e| CommitLogError::file("sync", &self.path, e))?;
        }
        Ok(())
    }

    /// Unmaps the index and truncates the file to its logical length.
    ///
    /// Calling this on a closed index is a no-op.
    pub fn close(&self) -> CommitLogResult<()> {
        let mut inner = self.inner.write();
        let (Some(mmap), Some(file)) = (inner.mmap.take(), inner.file.take()) else {
            return Ok(());
        };

        mmap.flush()
            .map_err(|e| CommitLogError::file("msync", &self.path, e))?;
        drop(mmap);

        file.set_len(inner.position)
            .map_err(|e| CommitLogError::file("resize", &self.path, e))?;
        file.sync_all()
            .map_err(|e| CommitLogError::file("sync", &self.path, e))?;

        Ok(())
    }

    /// Verifies that the write cursor sits on an entry boundary and that the
    /// last entry is well formed.
    pub fn sanity_check(&self) -> CommitLogResult<()> {
        let inner = self.inner.read();
        if inner.position == 0 {
            return Ok(());
        }

        if inner.position % ENTRY_WIDTH != 0 {
            return Err(CommitLogError::index(format!(
                "index seems corrupted: length {} is not a multiple of {ENTRY_WIDTH}",
                inner.position
            )));
        }

        self.read_locked(&inner, inner.position - ENTRY_WIDTH)?;
        Ok(())
    }

    /// Rewinds the write cursor to `entries` entries.
    ///
    /// # Errors
    ///
    /// Returns `Index` if this would move the cursor forward.
    pub fn truncate_entries(&self, entries: u64) -> CommitLogResult<()> {
        let mut inner = self.inner.write();
        let target = entries.saturating_mul(ENTRY_WIDTH);
        if target > inner.position {
            return Err(CommitLogError::index(format!(
                "invalid truncate: {entries} entries requested, {} present",
                inner.position / ENTRY_WIDTH
            )));
        }
        inner.position = target;
        Ok(())
    }

    /// Closes the index and unlinks its file.
    pub fn delete(&self) -> CommitLogResult<()> {
        self.close()?;
        fs::remove_file(&self.path).map_err(|e| CommitLogError::file("unlink", &self.path, e))
    }

    /// Returns the path to the index file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the base offset of the owning segment.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns the mapped capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the logical length (write cursor) in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        self.inner.read().position
    }

    /// Returns true when no further entry fits.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len_bytes() + ENTRY_WIDTH > self.capacity
    }

    /// Returns the number of entries written.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.len_bytes() / ENTRY_WIDTH
    }

    /// Returns true once the index has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.read().file.is_none()
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "failed to close index");
        }
    }
}

/// Rounds `value` down to the nearest multiple of `factor`.
///
/// Ex: `(238, 8) => 232`.
pub(crate) fn round_down_to_multiple(value: u64, factor: u64) -> u64 {
    value - (value % factor)
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    i32::from_le_bytes(buf)
}

fn closed() -> CommitLogError {
    CommitLogError::index("index is closed")
}

#[allow(unsafe_code)]
fn map_file(file: &File) -> io::Result<MmapMut> {
    // SAFETY: the index owns `file` for as long as the mapping lives and only
    // resizes it after the mapping is dropped. The partition holds a
    // directory lock, so no other process modifies the file while mapped.
    unsafe { MmapMut::map_mut(file) }
}
