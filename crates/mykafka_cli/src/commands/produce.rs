//! Produce command implementation.

use super::open_broker;
use mykafka_broker::TopicPartition;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::info;

/// Runs the produce command with messages given as arguments.
pub fn run<W: Write>(
    root: &Path,
    topic: &str,
    partition: u32,
    messages: &[String],
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let messages = messages.iter().map(|m| Ok::<_, io::Error>(m.clone()));
    produce(root, topic, partition, messages, out)
}

/// Runs the produce command with one message per input line.
pub fn run_lines<R: BufRead, W: Write>(
    root: &Path,
    topic: &str,
    partition: u32,
    input: R,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    produce(root, topic, partition, input.lines(), out)
}

fn produce<I, W>(
    root: &Path,
    topic: &str,
    partition: u32,
    messages: I,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>>
where
    I: IntoIterator<Item = io::Result<String>>,
    W: Write,
{
    let broker = open_broker(root)?;
    let key = TopicPartition::new(topic, partition)?;

    let mut count = 0u64;
    for message in messages {
        let offset = broker.send_message(&key, message?.as_bytes())?;
        writeln!(out, "{offset}")?;
        count += 1;
    }
    broker.partition(&key)?.sync()?;
    info!(%key, count, "produced messages");

    broker.close()?;
    Ok(())
}
