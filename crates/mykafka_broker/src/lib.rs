//! # MyKafka Broker
//!
//! Topic/partition registry over the MyKafka commit log.
//!
//! A [`Broker`] owns one directory. Each `(topic, partition)` pair gets a
//! [`Partition`](mykafka_commitlog::Partition) under `data/` and a config
//! record under `config/` holding its size and age bounds plus the last
//! committed consumer offset. Opening a broker reopens every partition that
//! has a record.
//!
//! ## Example
//!
//! ```rust
//! use mykafka_broker::{Broker, BrokerConfig, TopicPartition};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let broker = Broker::open(BrokerConfig::new(dir.path())).unwrap();
//!
//! let events = TopicPartition::new("events", 0).unwrap();
//! broker.create_partition(&events, None).unwrap();
//!
//! let offset = broker.send_message(&events, b"hello").unwrap();
//! assert_eq!(broker.get_message(&events, offset).unwrap(), b"hello");
//! assert_eq!(broker.get_offsets(&events).unwrap().newest, Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod config_store;
mod error;
mod topic;

pub use broker::{Broker, BrokerConfig, BrokerInfo, Offsets, PartitionInfo, TopicInfo};
pub use config_store::{ConfigRecord, ConfigStore, RECORD_SIZE};
pub use error::{BrokerError, BrokerResult};
pub use topic::{validate_topic, PartitionSettings, TopicPartition, MAX_TOPIC_LEN};
