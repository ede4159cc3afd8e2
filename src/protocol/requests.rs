//! Request/response framing for produce, fetch, metadata and offset.
//!
//! Every request is framed as `[request_size:4]` followed by
//! `[api_key:2][api_version:2][correlation_id:4][client_id_len:2][client_id]`
//! and the request body. All integers are big-endian; topic and client-id
//! strings carry a 2-byte length prefix, message sets a 4-byte one.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{KafwireError, Result};
use crate::protocol::message::{encode_message_set, MessageSet};
use crate::types::{BrokerMetadata, Message, PartitionMetadata, TopicAndPartition};

pub const API_PRODUCE: i16 = 0;
pub const API_FETCH: i16 = 1;
pub const API_OFFSET: i16 = 2;
pub const API_METADATA: i16 = 3;

/// Only protocol version 0 framing is produced.
pub const API_VERSION: i16 = 0;

/// Clients are not brokers; the replica id on the wire is always -1.
const REPLICA_ID: i32 = -1;

/// Messages destined for one partition of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequest {
    pub topic: String,
    pub partition: i32,
    pub messages: Vec<Message>,
}

/// Broker acknowledgement for one produced partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponse {
    pub topic: String,
    pub partition: i32,
    pub error_code: i16,
    pub offset: i64,
}

/// A read of one partition starting at `fetch_offset`, bounded by `max_bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub topic: String,
    pub partition: i32,
    pub fetch_offset: i64,
    pub max_bytes: i32,
}

/// One partition's slice of a fetch response. `messages` decodes lazily;
/// the caller controls how much of a large batch is actually parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub topic: String,
    pub partition: i32,
    pub error_code: i16,
    pub highwater_mark: i64,
    pub messages: MessageSet,
}

/// A query for the offsets of one partition around `time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetRequest {
    pub topic: String,
    pub partition: i32,
    pub time: i64,
    pub max_offsets: i32,
}

/// Offsets known for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetResponse {
    pub topic: String,
    pub partition: i32,
    pub error_code: i16,
    pub offsets: Vec<i64>,
}

impl ProduceResponse {
    pub fn topic_and_partition(&self) -> TopicAndPartition {
        TopicAndPartition::new(self.topic.clone(), self.partition)
    }
}

impl FetchResponse {
    pub fn topic_and_partition(&self) -> TopicAndPartition {
        TopicAndPartition::new(self.topic.clone(), self.partition)
    }
}

impl OffsetResponse {
    pub fn topic_and_partition(&self) -> TopicAndPartition {
        TopicAndPartition::new(self.topic.clone(), self.partition)
    }
}

/// Broker list keyed by node id.
pub type BrokerMap = HashMap<i32, BrokerMetadata>;
/// Partition metadata keyed by topic, then partition.
pub type TopicPartitionMap = HashMap<String, HashMap<i32, PartitionMetadata>>;

/// Encodes a produce request. Requests are grouped by topic then
/// partition in first-seen order, so wire bytes are deterministic and
/// follow caller order; a repeated (topic, partition) pair keeps the
/// last payload, matching per-partition map semantics.
pub fn encode_produce_request(
    client_id: &str,
    correlation_id: i32,
    requests: &[ProduceRequest],
    required_acks: i16,
    ack_timeout_ms: i32,
) -> Result<Vec<u8>> {
    let grouped = group_by_topic_partition(requests, |r| (r.topic.as_str(), r.partition));
    let mut buf = BytesMut::new();
    encode_header(&mut buf, client_id, correlation_id, API_PRODUCE)?;
    buf.put_i16(required_acks);
    buf.put_i32(ack_timeout_ms);
    buf.put_i32(checked_count(grouped.len())?);
    for (topic, partitions) in &grouped {
        write_short_string(&mut buf, topic)?;
        buf.put_i32(checked_count(partitions.len())?);
        for (partition, request) in partitions {
            let message_set = encode_message_set(&request.messages)?;
            buf.put_i32(*partition);
            buf.put_i32(checked_count(message_set.len())?);
            buf.extend_from_slice(&message_set);
        }
    }
    Ok(frame_request(buf))
}

/// Decodes a produce response into per-partition acknowledgements.
pub fn decode_produce_response(data: &[u8]) -> Result<Vec<ProduceResponse>> {
    let mut buf = data;
    let correlation_id = read_i32(&mut buf)?;
    let topic_count = read_count(&mut buf)?;
    trace!(correlation_id, topic_count, "decoding produce response");
    let mut responses = Vec::new();
    for _ in 0..topic_count {
        let topic = read_short_string(&mut buf)?;
        let partition_count = read_count(&mut buf)?;
        for _ in 0..partition_count {
            let partition = read_i32(&mut buf)?;
            let error_code = read_i16(&mut buf)?;
            let offset = read_i64(&mut buf)?;
            responses.push(ProduceResponse {
                topic: topic.clone(),
                partition,
                error_code,
                offset,
            });
        }
    }
    Ok(responses)
}

/// Encodes a fetch request; `max_wait_time` and `min_bytes` apply to the
/// whole request, `max_bytes` to each partition.
pub fn encode_fetch_request(
    client_id: &str,
    correlation_id: i32,
    requests: &[FetchRequest],
    max_wait_time: i32,
    min_bytes: i32,
) -> Result<Vec<u8>> {
    let grouped = group_by_topic_partition(requests, |r| (r.topic.as_str(), r.partition));
    let mut buf = BytesMut::new();
    encode_header(&mut buf, client_id, correlation_id, API_FETCH)?;
    buf.put_i32(REPLICA_ID);
    buf.put_i32(max_wait_time);
    buf.put_i32(min_bytes);
    buf.put_i32(checked_count(grouped.len())?);
    for (topic, partitions) in &grouped {
        write_short_string(&mut buf, topic)?;
        buf.put_i32(checked_count(partitions.len())?);
        for (partition, request) in partitions {
            buf.put_i32(*partition);
            buf.put_i64(request.fetch_offset);
            buf.put_i32(request.max_bytes);
        }
    }
    Ok(frame_request(buf))
}

/// Decodes a fetch response. Each partition's message set is kept as raw
/// bytes behind a lazy iterator rather than eagerly parsed.
pub fn decode_fetch_response(data: &[u8]) -> Result<Vec<FetchResponse>> {
    let mut buf = data;
    let correlation_id = read_i32(&mut buf)?;
    let topic_count = read_count(&mut buf)?;
    trace!(correlation_id, topic_count, "decoding fetch response");
    let mut responses = Vec::new();
    for _ in 0..topic_count {
        let topic = read_short_string(&mut buf)?;
        let partition_count = read_count(&mut buf)?;
        for _ in 0..partition_count {
            let partition = read_i32(&mut buf)?;
            let error_code = read_i16(&mut buf)?;
            let highwater_mark = read_i64(&mut buf)?;
            let message_set = read_bytes(&mut buf)?;
            responses.push(FetchResponse {
                topic: topic.clone(),
                partition,
                error_code,
                highwater_mark,
                messages: MessageSet::new(message_set),
            });
        }
    }
    Ok(responses)
}

/// Encodes an offset request; per partition `[partition:4][time:8][max_offsets:4]`.
pub fn encode_offset_request(
    client_id: &str,
    correlation_id: i32,
    requests: &[OffsetRequest],
) -> Result<Vec<u8>> {
    let grouped = group_by_topic_partition(requests, |r| (r.topic.as_str(), r.partition));
    let mut buf = BytesMut::new();
    encode_header(&mut buf, client_id, correlation_id, API_OFFSET)?;
    buf.put_i32(REPLICA_ID);
    buf.put_i32(checked_count(grouped.len())?);
    for (topic, partitions) in &grouped {
        write_short_string(&mut buf, topic)?;
        buf.put_i32(checked_count(partitions.len())?);
        for (partition, request) in partitions {
            buf.put_i32(*partition);
            buf.put_i64(request.time);
            buf.put_i32(request.max_offsets);
        }
    }
    Ok(frame_request(buf))
}

/// Decodes an offset response; each partition carries a list of offsets.
pub fn decode_offset_response(data: &[u8]) -> Result<Vec<OffsetResponse>> {
    let mut buf = data;
    let correlation_id = read_i32(&mut buf)?;
    let topic_count = read_count(&mut buf)?;
    trace!(correlation_id, topic_count, "decoding offset response");
    let mut responses = Vec::new();
    for _ in 0..topic_count {
        let topic = read_short_string(&mut buf)?;
        let partition_count = read_count(&mut buf)?;
        for _ in 0..partition_count {
            let partition = read_i32(&mut buf)?;
            let error_code = read_i16(&mut buf)?;
            let offset_count = read_count(&mut buf)?;
            let mut offsets = Vec::with_capacity(offset_count.min(1024));
            for _ in 0..offset_count {
                offsets.push(read_i64(&mut buf)?);
            }
            responses.push(OffsetResponse {
                topic: topic.clone(),
                partition,
                error_code,
                offsets,
            });
        }
    }
    Ok(responses)
}

/// Encodes a metadata request; an empty topic list asks for all topics.
pub fn encode_metadata_request(
    client_id: &str,
    correlation_id: i32,
    topics: &[String],
) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    encode_header(&mut buf, client_id, correlation_id, API_METADATA)?;
    buf.put_i32(checked_count(topics.len())?);
    for topic in topics {
        write_short_string(&mut buf, topic)?;
    }
    Ok(frame_request(buf))
}

/// Decodes a metadata response into the broker list and the per-topic
/// partition metadata. Per-topic and per-partition error codes are read
/// for framing but not surfaced; routing-table construction only needs
/// the healthy entries.
pub fn decode_metadata_response(data: &[u8]) -> Result<(BrokerMap, TopicPartitionMap)> {
    let mut buf = data;
    let correlation_id = read_i32(&mut buf)?;
    let broker_count = read_count(&mut buf)?;
    trace!(correlation_id, broker_count, "decoding metadata response");

    let mut brokers = BrokerMap::new();
    for _ in 0..broker_count {
        let node_id = read_i32(&mut buf)?;
        let host = read_short_string(&mut buf)?;
        let port = read_i32(&mut buf)?;
        brokers.insert(
            node_id,
            BrokerMetadata {
                node_id,
                host,
                port,
            },
        );
    }

    let topic_count = read_count(&mut buf)?;
    let mut topics = TopicPartitionMap::new();
    for _ in 0..topic_count {
        let _topic_error = read_i16(&mut buf)?;
        let topic = read_short_string(&mut buf)?;
        let partition_count = read_count(&mut buf)?;
        let partitions = topics.entry(topic.clone()).or_default();
        for _ in 0..partition_count {
            let _partition_error = read_i16(&mut buf)?;
            let partition = read_i32(&mut buf)?;
            let leader = read_i32(&mut buf)?;
            let replicas = read_i32_array(&mut buf)?;
            let isr = read_i32_array(&mut buf)?;
            let previous = partitions.insert(
                partition,
                PartitionMetadata {
                    topic: topic.clone(),
                    partition,
                    leader,
                    replicas,
                    isr,
                },
            );
            if previous.is_some() {
                return Err(KafwireError::Protocol(format!(
                    "duplicate partition {} in metadata response",
                    TopicAndPartition::new(topic, partition)
                )));
            }
        }
    }
    Ok((brokers, topics))
}

/// Writes the request header shared by every api.
fn encode_header(
    buf: &mut BytesMut,
    client_id: &str,
    correlation_id: i32,
    api_key: i16,
) -> Result<()> {
    buf.put_i16(api_key);
    buf.put_i16(API_VERSION);
    buf.put_i32(correlation_id);
    write_short_string(buf, client_id)
}

/// Prepends the 4-byte request size to the assembled body.
fn frame_request(body: BytesMut) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as i32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Groups per-partition payloads by topic, preserving first-seen order of
/// topics and of partitions within a topic. A repeated partition replaces
/// the earlier payload.
fn group_by_topic_partition<'a, T, F>(items: &'a [T], key: F) -> Vec<(&'a str, Vec<(i32, &'a T)>)>
where
    F: Fn(&'a T) -> (&'a str, i32),
{
    let mut grouped: Vec<(&'a str, Vec<(i32, &'a T)>)> = Vec::new();
    for item in items {
        let (topic, partition) = key(item);
        let idx = match grouped.iter().position(|(t, _)| *t == topic) {
            Some(idx) => idx,
            None => {
                grouped.push((topic, Vec::new()));
                grouped.len() - 1
            }
        };
        let partitions = &mut grouped[idx].1;
        match partitions.iter_mut().find(|(p, _)| *p == partition) {
            Some(slot) => slot.1 = item,
            None => partitions.push((partition, item)),
        }
    }
    grouped
}

fn write_short_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    let len = i16::try_from(s.len())
        .map_err(|_| KafwireError::Protocol(format!("string of {} bytes overflows i16", s.len())))?;
    buf.put_i16(len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_i16(buf: &mut &[u8]) -> Result<i16> {
    ensure_remaining(buf, 2)?;
    Ok(buf.get_i16())
}

fn read_i32(buf: &mut &[u8]) -> Result<i32> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_i32())
}

fn read_i64(buf: &mut &[u8]) -> Result<i64> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_i64())
}

/// Reads a 4-byte count or size, rejecting negatives.
fn read_count(buf: &mut &[u8]) -> Result<usize> {
    let count = read_i32(buf)?;
    usize::try_from(count)
        .map_err(|_| KafwireError::Protocol(format!("negative count {} in response", count)))
}

fn read_short_string(buf: &mut &[u8]) -> Result<String> {
    ensure_remaining(buf, 2)?;
    let len = buf.get_i16();
    if len < 0 {
        return Err(KafwireError::Protocol(format!(
            "unexpected null string (length {})",
            len
        )));
    }
    let len = len as usize;
    ensure_remaining(buf, len)?;
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw)
        .map_err(|e| KafwireError::Protocol(format!("string is not valid UTF-8: {}", e)))
}

/// Reads a 4-byte-length-prefixed byte span.
fn read_bytes(buf: &mut &[u8]) -> Result<Bytes> {
    let len = read_count(buf)?;
    ensure_remaining(buf, len)?;
    let out = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(out)
}

fn read_i32_array(buf: &mut &[u8]) -> Result<Vec<i32>> {
    let count = read_count(buf)?;
    let mut out = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        out.push(read_i32(buf)?);
    }
    Ok(out)
}

fn ensure_remaining(buf: &&[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(KafwireError::Protocol(format!(
            "response truncated: {} bytes needed, {} remain",
            needed,
            buf.len()
        )));
    }
    Ok(())
}

fn checked_count(len: usize) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| KafwireError::Protocol(format!("count {} overflows i32", len)))
}
