//! Verify command implementation.

use mykafka_commitlog::{LogCheck, Partition, PartitionConfig};
use std::io::Write;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of segments checked.
    pub segments: usize,
    /// Number of records checked.
    pub records_checked: u64,
    /// Number of records that could not be read.
    pub corrupt_records: u64,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.corrupt_records == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
///
/// Without `repair` the segment files are replayed read-only and partial
/// records are reported. With `repair` the partition is opened, which cuts
/// partial records off the segment tails, and every record is read back.
pub fn run<W: Write>(
    path: &Path,
    repair: bool,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No partition found at {}", path.display()).into());
    }

    writeln!(out, "Verifying partition at {}", path.display())?;
    writeln!(out)?;

    let result = if repair {
        repair_partition(path, out)?
    } else {
        check_partition(path, out)?
    };

    writeln!(out)?;
    writeln!(
        out,
        "Checked {} records in {} segments",
        result.records_checked, result.segments
    )?;
    for error in &result.errors {
        writeln!(out, "  ! {error}")?;
    }

    if result.is_ok() {
        writeln!(out, "✓ Partition verification passed")?;
        Ok(())
    } else {
        writeln!(out, "✗ Partition verification failed")?;
        Err("Verification failed".into())
    }
}

fn check_partition<W: Write>(
    path: &Path,
    out: &mut W,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let checks = match Partition::check(path) {
        Ok(checks) => checks,
        Err(e) => {
            return Ok(VerifyResult {
                errors: vec![format!("Failed to check partition: {e}")],
                ..VerifyResult::default()
            });
        }
    };

    let mut result = VerifyResult {
        segments: checks.len(),
        ..VerifyResult::default()
    };
    let mut expected_base: Option<u64> = None;
    for check in &checks {
        writeln!(out, "  segment {:020}: {} records", check.base_offset, check.records)?;
        result.records_checked += check.records;

        if check.has_torn_tail() {
            result.errors.push(torn_tail_message(check));
        }
        if let Some(expected) = expected_base.filter(|&e| e != check.base_offset) {
            result.errors.push(format!(
                "segment {} should start at offset {expected}",
                check.base_offset
            ));
        }
        expected_base = Some(check.next_offset());
    }

    Ok(result)
}

fn torn_tail_message(check: &LogCheck) -> String {
    format!(
        "segment {} has {} bytes of partial record after byte {} (rerun with --repair)",
        check.base_offset,
        check.file_len - check.valid_len,
        check.valid_len
    )
}

fn repair_partition<W: Write>(
    path: &Path,
    out: &mut W,
) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let partition = match Partition::open(path, PartitionConfig::default()) {
        Ok(partition) => partition,
        Err(e) => {
            return Ok(VerifyResult {
                errors: vec![format!("Failed to open partition: {e}")],
                ..VerifyResult::default()
            });
        }
    };

    let mut result = VerifyResult::default();
    let bases = partition.segment_base_offsets();
    let newest = partition.newest_offset().unwrap_or(0);
    result.segments = bases.len();

    for (i, &base) in bases.iter().enumerate() {
        let end = bases.get(i + 1).copied().unwrap_or(newest);
        writeln!(out, "  segment {base:020}: {} records", end - base)?;

        for offset in base..end {
            result.records_checked += 1;
            if let Err(e) = partition.read_at(offset) {
                result.corrupt_records += 1;
                result.errors.push(format!("Failed to read offset {offset}: {e}"));
            }
        }
    }

    partition.close()?;
    Ok(result)
}
