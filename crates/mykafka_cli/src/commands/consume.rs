//! Consume, offsets and commit commands.

use super::{format_offset, open_broker};
use mykafka_broker::TopicPartition;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Where to start reading and how much.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsumeOptions {
    /// First offset; defaults to the committed offset, then the oldest.
    pub offset: Option<u64>,
    /// Maximum number of messages.
    pub limit: Option<u64>,
    /// Commit the offset following the last message read.
    pub commit: bool,
}

/// One consumed message.
#[derive(Debug, Serialize)]
pub struct ConsumedMessage {
    /// Offset of the message.
    pub offset: u64,
    /// Payload, lossily decoded as UTF-8.
    pub payload: String,
}

/// Runs the consume command.
pub fn run<W: Write>(
    root: &Path,
    topic: &str,
    partition: u32,
    options: ConsumeOptions,
    format: &str,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = open_broker(root)?;
    let key = TopicPartition::new(topic, partition)?;
    let offsets = broker.get_offsets(&key)?;

    let oldest = offsets.oldest.unwrap_or(0);
    let newest = offsets.newest.unwrap_or(0);
    let start = options
        .offset
        .unwrap_or_else(|| offsets.commit.map_or(oldest, |commit| commit.max(oldest)));
    let end = options
        .limit
        .map_or(newest, |limit| start.saturating_add(limit).min(newest));

    let mut messages = Vec::new();
    for offset in start..end {
        let payload = broker.get_message(&key, offset)?;
        messages.push(ConsumedMessage {
            offset,
            payload: String::from_utf8_lossy(&payload).into_owned(),
        });
    }

    match format {
        "json" => {
            writeln!(out, "{}", serde_json::to_string_pretty(&messages)?)?;
        }
        _ => {
            for message in &messages {
                writeln!(out, "{}: {}", message.offset, message.payload)?;
            }
        }
    }

    if options.commit && end > start {
        broker.commit_offset(&key, end)?;
    }

    broker.close()?;
    Ok(())
}

/// Runs the offsets command.
pub fn offsets<W: Write>(
    root: &Path,
    topic: &str,
    partition: u32,
    format: &str,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = open_broker(root)?;
    let key = TopicPartition::new(topic, partition)?;
    let offsets = broker.get_offsets(&key)?;

    match format {
        "json" => {
            writeln!(out, "{}", serde_json::to_string_pretty(&offsets)?)?;
        }
        _ => {
            writeln!(out, "Partition: {key}")?;
            writeln!(out, "  Oldest: {}", format_offset(offsets.oldest))?;
            writeln!(out, "  Commit: {}", format_offset(offsets.commit))?;
            writeln!(out, "  Newest: {}", format_offset(offsets.newest))?;
        }
    }

    broker.close()?;
    Ok(())
}

/// Runs the commit command.
pub fn commit<W: Write>(
    root: &Path,
    topic: &str,
    partition: u32,
    offset: u64,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = open_broker(root)?;
    let key = TopicPartition::new(topic, partition)?;

    broker.commit_offset(&key, offset)?;
    writeln!(out, "Committed offset {offset} for {key}")?;

    broker.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn seeded(count: u64) -> TempDir {
        let dir = tempdir().unwrap();
        let broker = open_broker(dir.path()).unwrap();
        let key = TopicPartition::new("events", 0).unwrap();
        broker.create_partition(&key, None).unwrap();
        for i in 0..count {
            broker.send_message(&key, format!("msg-{i}").as_bytes()).unwrap();
        }
        dir
    }

    fn consume(dir: &TempDir, options: ConsumeOptions, format: &str) -> String {
        let mut out = Vec::new();
        run(dir.path(), "events", 0, options, format, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn consume_all_from_oldest() {
        let dir = seeded(3);
        let text = consume(&dir, ConsumeOptions::default(), "text");
        assert_eq!(text, "0: msg-0\n1: msg-1\n2: msg-2\n");
    }

    #[test]
    fn consume_with_limit_and_commit() {
        let dir = seeded(5);
        let options = ConsumeOptions {
            limit: Some(2),
            commit: true,
            ..ConsumeOptions::default()
        };
        assert_eq!(consume(&dir, options, "text"), "0: msg-0\n1: msg-1\n");
        // The next run resumes from the committed offset.
        assert_eq!(consume(&dir, options, "text"), "2: msg-2\n3: msg-3\n");
    }

    #[test]
    fn consume_json() {
        let dir = seeded(2);
        let options = ConsumeOptions {
            offset: Some(1),
            ..ConsumeOptions::default()
        };
        let json: serde_json::Value =
            serde_json::from_str(&consume(&dir, options, "json")).unwrap();
        assert_eq!(json[0]["offset"], 1);
        assert_eq!(json[0]["payload"], "msg-1");
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[test]
    fn offsets_and_commit() {
        let dir = seeded(4);
        let mut out = Vec::new();
        commit(dir.path(), "events", 0, 2, &mut out).unwrap();
        offsets(dir.path(), "events", 0, "text", &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Committed offset 2 for events-0"));
        assert!(text.contains("Oldest: 0"));
        assert!(text.contains("Commit: 2"));
        assert!(text.contains("Newest: 4"));

        let mut out = Vec::new();
        offsets(dir.path(), "events", 0, "json", &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["newest"], 4);
    }
}
