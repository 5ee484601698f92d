//! Benchmark utilities.

use mykafka_commitlog::{Partition, PartitionConfig};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;

/// Generate a random payload of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate word-like payloads with lengths in `min_len..=max_len`.
pub fn random_words(count: usize, min_len: usize, max_len: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let len = rng.gen_range(min_len..=max_len);
            (&mut rng).sample_iter(Alphanumeric).take(len).collect()
        })
        .collect()
}

/// Open a partition in `dir` and fill it with `payloads`.
pub fn filled_partition(dir: &Path, config: PartitionConfig, payloads: &[Vec<u8>]) -> Partition {
    let partition = Partition::open(dir, config).unwrap();
    for payload in payloads {
        partition.write(payload).unwrap();
    }
    partition
}
