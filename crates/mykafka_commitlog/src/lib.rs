//! # MyKafka Commit Log
//!
//! Segmented, append-only storage engine for MyKafka partitions.
//!
//! A [`Partition`] is a directory of [`Segment`]s. Each segment pairs a
//! data file of length-prefixed records with a memory-mapped [`Index`]
//! mapping relative offsets to byte positions. Records are addressed by a
//! dense, monotonically increasing 64-bit offset.
//!
//! ## Design Principles
//!
//! - Writes always go to the last (active) segment
//! - The index is rebuilt from the data file on every open
//! - Old segments are removed by age or by total size, never the active one
//! - Payloads are opaque bytes
//!
//! ## Example
//!
//! ```rust
//! use mykafka_commitlog::{Partition, PartitionConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let partition = Partition::open(dir.path(), PartitionConfig::default()).unwrap();
//!
//! let offset = partition.write(b"hello world").unwrap();
//! assert_eq!(offset, 0);
//! assert_eq!(partition.read_at(offset).unwrap(), b"hello world");
//! assert_eq!(partition.newest_offset(), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod index;
mod partition;
pub mod segment;

pub use config::{PartitionConfig, DEFAULT_MAX_INDEX_SIZE};
pub use error::{CommitLogError, CommitLogResult, ErrorKind};
pub use index::{Index, IndexEntry};
pub use partition::Partition;
pub use segment::{LogCheck, Segment, HEADER_SIZE};
