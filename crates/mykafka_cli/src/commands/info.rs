//! Info command implementation.

use super::{format_offset, format_size, open_broker};
use mykafka_broker::BrokerInfo;
use std::io::Write;
use std::path::Path;

/// Runs the info command.
pub fn run<W: Write>(
    root: &Path,
    format: &str,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = open_broker(root)?;
    let info = broker.info()?;

    match format {
        "json" => {
            writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
        }
        _ => {
            print_text_output(&info, out)?;
        }
    }

    broker.close()?;
    Ok(())
}

fn print_text_output<W: Write>(info: &BrokerInfo, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "MyKafka Broker")?;
    writeln!(out, "==============")?;
    writeln!(out)?;
    writeln!(out, "Root: {}", info.root.display())?;
    writeln!(out, "Topics: {}", info.topics.len())?;

    for topic in &info.topics {
        writeln!(out)?;
        writeln!(out, "Topic: {}", topic.name)?;
        for partition in &topic.partitions {
            writeln!(out, "  Partition {}:", partition.partition)?;
            writeln!(
                out,
                "    Offsets:   oldest {} / commit {} / newest {}",
                format_offset(partition.offsets.oldest),
                format_offset(partition.offsets.commit),
                format_offset(partition.offsets.newest)
            )?;
            writeln!(
                out,
                "    Size:      {} in {} segments",
                format_size(partition.physical_size),
                partition.segment_count
            )?;

            let settings = &partition.settings;
            let bound = if settings.max_partition_size == 0 {
                "unbounded".to_string()
            } else {
                format_size(settings.max_partition_size)
            };
            let ttl = if settings.segment_ttl.is_zero() {
                "none".to_string()
            } else {
                format!("{}s", settings.segment_ttl.as_secs())
            };
            writeln!(
                out,
                "    Retention: segment {} / partition {} / ttl {}",
                format_size(settings.max_segment_size),
                bound,
                ttl
            )?;
        }
    }
    Ok(())
}
