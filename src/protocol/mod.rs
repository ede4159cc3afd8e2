//! Wire protocol: message/message-set codec and request/response framing.
//!
//! Frame: int32 (BE) request size + header (api_key, api_version,
//! correlation_id, client_id) + body. See message.rs for the message-set
//! layout and requests.rs for the per-api bodies.

mod message;
mod requests;

pub use message::{
    create_compressed_message, create_gzip_message, create_snappy_message, decode_message,
    encode_message, encode_message_set, encode_message_set_with_offsets, MessageSet,
    MessageSetIter, MESSAGE_MAGIC,
};
pub use requests::{
    decode_fetch_response, decode_metadata_response, decode_offset_response,
    decode_produce_response, encode_fetch_request, encode_metadata_request, encode_offset_request,
    encode_produce_request, BrokerMap, FetchRequest, FetchResponse, OffsetRequest, OffsetResponse,
    ProduceRequest, ProduceResponse, TopicPartitionMap, API_FETCH, API_METADATA, API_OFFSET,
    API_PRODUCE, API_VERSION,
};
