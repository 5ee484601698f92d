//! Dump command implementation.

use mykafka_commitlog::{Partition, PartitionConfig};
use std::io::Write;
use std::path::Path;

/// Runs the dump command over a partition directory.
pub fn run<W: Write>(path: &Path, out: &mut W) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No partition found at {}", path.display()).into());
    }

    let partition = Partition::open(path, PartitionConfig::default())?;
    writeln!(
        out,
        "Partition {} (offsets {}..{}, {} segments)",
        partition.path().display(),
        partition.oldest_offset().unwrap_or(0),
        partition.newest_offset().unwrap_or(0),
        partition.segment_count()
    )?;
    partition.dump(out)?;

    partition.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dumps_records() {
        let dir = tempdir().unwrap();
        {
            let partition =
                Partition::open(dir.path(), PartitionConfig::new().max_segment_size(1)).unwrap();
            partition.write(b"alpha").unwrap();
            partition.write(b"beta").unwrap();
        }

        let mut out = Vec::new();
        run(dir.path(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("offsets 0..2, 2 segments"));
        assert!(text.contains("offset: 0 position: 0 size: 5 payload: alpha"));
        assert!(text.contains("offset: 1 position: 0 size: 4 payload: beta"));
    }

    #[test]
    fn missing_directory() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        assert!(run(&dir.path().join("absent"), &mut out).is_err());
        assert!(!dir.path().join("absent").exists());
    }
}
