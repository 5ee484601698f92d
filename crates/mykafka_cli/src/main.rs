//! MyKafka CLI
//!
//! Command-line tools for a local MyKafka broker directory.
//!
//! # Commands
//!
//! - `create` / `delete` - Manage topics and partitions
//! - `produce` / `consume` - Append and read messages
//! - `offsets` / `commit` - Inspect and commit partition offsets
//! - `info` - Display every topic and partition
//! - `dump` / `verify` - Inspect a raw partition directory

mod commands;

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// MyKafka command-line tools.
#[derive(Parser)]
#[command(name = "mykafka")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the broker root directory
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a partition
    Create {
        /// Topic name
        topic: String,

        /// Partition number
        #[arg(short, long, default_value = "0")]
        partition: u32,

        /// Segment rollover size in bytes
        #[arg(long)]
        segment_size: Option<u64>,

        /// Partition size bound in bytes (0 = unbounded)
        #[arg(long)]
        partition_size: Option<u64>,

        /// Segment time-to-live in seconds (0 = disabled)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Delete a partition, or a whole topic if no partition is given
    Delete {
        /// Topic name
        topic: String,

        /// Partition number
        #[arg(short, long)]
        partition: Option<u32>,
    },

    /// Append messages (one per argument, or one per stdin line)
    Produce {
        /// Topic name
        topic: String,

        /// Partition number
        #[arg(short, long, default_value = "0")]
        partition: u32,

        /// Messages to send
        messages: Vec<String>,
    },

    /// Read messages from a partition
    Consume {
        /// Topic name
        topic: String,

        /// Partition number
        #[arg(short, long, default_value = "0")]
        partition: u32,

        /// First offset to read (defaults to the committed offset, then the oldest)
        #[arg(short, long)]
        offset: Option<u64>,

        /// Maximum number of messages to read
        #[arg(short, long)]
        limit: Option<u64>,

        /// Commit the offset after the last message read
        #[arg(short, long)]
        commit: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the oldest, committed and newest offsets of a partition
    Offsets {
        /// Topic name
        topic: String,

        /// Partition number
        #[arg(short, long, default_value = "0")]
        partition: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Commit a consumer offset
    Commit {
        /// Topic name
        topic: String,

        /// Partition number
        #[arg(short, long, default_value = "0")]
        partition: u32,

        /// Offset to commit
        offset: u64,
    },

    /// Display every topic and partition
    Info {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump every record of a partition directory (opening it repairs torn tails)
    Dump {
        /// Partition directory
        path: PathBuf,
    },

    /// Check every segment of a partition directory without modifying it
    Verify {
        /// Partition directory
        path: PathBuf,

        /// Open the partition and cut partial records off segment tails
        #[arg(long)]
        repair: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut out = io::stdout().lock();
    let root = cli.root;
    let root = |command: &str| root.clone().ok_or(format!("broker root required for {command}"));

    match cli.command {
        Commands::Create {
            topic,
            partition,
            segment_size,
            partition_size,
            ttl,
        } => {
            let overrides = commands::topic::SettingsOverrides {
                segment_size,
                partition_size,
                ttl,
            };
            commands::topic::create(&root("create")?, &topic, partition, overrides, &mut out)?;
        }
        Commands::Delete { topic, partition } => {
            commands::topic::delete(&root("delete")?, &topic, partition, &mut out)?;
        }
        Commands::Produce {
            topic,
            partition,
            messages,
        } => {
            let root = root("produce")?;
            if messages.is_empty() {
                let stdin = io::stdin().lock();
                commands::produce::run_lines(&root, &topic, partition, stdin, &mut out)?;
            } else {
                commands::produce::run(&root, &topic, partition, &messages, &mut out)?;
            }
        }
        Commands::Consume {
            topic,
            partition,
            offset,
            limit,
            commit,
            format,
        } => {
            let options = commands::consume::ConsumeOptions {
                offset,
                limit,
                commit,
            };
            commands::consume::run(
                &root("consume")?,
                &topic,
                partition,
                options,
                &format,
                &mut out,
            )?;
        }
        Commands::Offsets {
            topic,
            partition,
            format,
        } => {
            commands::consume::offsets(&root("offsets")?, &topic, partition, &format, &mut out)?;
        }
        Commands::Commit {
            topic,
            partition,
            offset,
        } => {
            commands::consume::commit(&root("commit")?, &topic, partition, offset, &mut out)?;
        }
        Commands::Info { format } => {
            commands::info::run(&root("info")?, &format, &mut out)?;
        }
        Commands::Dump { path } => {
            commands::dump::run(&path, &mut out)?;
        }
        Commands::Verify { path, repair } => {
            commands::verify::run(&path, repair, &mut out)?;
        }
        Commands::Version => {
            writeln!(out, "MyKafka CLI v{}", env!("CARGO_PKG_VERSION"))?;
        }
    }

    Ok(())
}
