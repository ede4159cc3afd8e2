//! Kafwire: wire-protocol codec for Kafka-style log brokers.
//!
//! Turns typed produce/fetch/metadata/offset requests into the broker's
//! binary frame format and binary responses back into typed structures,
//! including the legacy message-set layout, CRC32 verification and
//! gzip/snappy payload compression. Transport, topology caching and the
//! high-level producer/consumer APIs live in the surrounding client.

pub mod checksum;
pub mod compression;
pub mod error;
pub mod protocol;
pub mod types;

pub use compression::{Codec, CodecSupport};
pub use error::{KafwireError, Result};
pub use protocol::{
    create_compressed_message, create_gzip_message, create_snappy_message, decode_fetch_response,
    decode_message, decode_metadata_response, decode_offset_response, decode_produce_response,
    encode_fetch_request, encode_message, encode_message_set, encode_message_set_with_offsets,
    encode_metadata_request, encode_offset_request, encode_produce_request, FetchRequest,
    FetchResponse, MessageSet, MessageSetIter, OffsetRequest, OffsetResponse, ProduceRequest,
    ProduceResponse,
};
pub use types::{
    BrokerMetadata, Message, OffsetAndMessage, PartitionMetadata, TopicAndPartition,
};
