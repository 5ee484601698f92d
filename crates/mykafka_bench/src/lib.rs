//! Benchmark support for MyKafka.

#![warn(missing_docs)]

pub mod utils;

pub use utils::*;
