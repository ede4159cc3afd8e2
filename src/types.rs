//! Core types shared across the codec.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single logical record as carried on the wire (message format v0).
///
/// The low two bits of `attributes` name the compression codec applied to
/// `value`; the remaining bits are reserved and must be zero. A `None` key
/// is encoded as length `-1`, distinct from a present empty key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Format-version tag; only version 0 is supported.
    pub magic: u8,
    /// Compression codec bits (see [`crate::compression::Codec`]).
    pub attributes: u8,
    /// Optional key for partitioning.
    pub key: Option<Vec<u8>>,
    /// Payload.
    pub value: Vec<u8>,
}

impl Message {
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            magic: 0,
            attributes: 0,
            key: None,
            value,
        }
    }

    pub fn with_key(mut self, key: Vec<u8>) -> Self {
        self.key = Some(key);
        self
    }
}

/// A message together with its position in the partition log.
///
/// For client-produced sets the offset is a placeholder; brokers assign
/// real offsets on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetAndMessage {
    pub offset: i64,
    pub message: Message,
}

impl OffsetAndMessage {
    pub fn new(offset: i64, message: Message) -> Self {
        Self { offset, message }
    }
}

/// A broker node as reported by a metadata response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerMetadata {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

/// Leadership and replication state of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMetadata {
    pub topic: String,
    pub partition: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

/// Composite key for per-partition results; unique within one response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicAndPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicAndPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicAndPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.partition)
    }
}
