//! Message and message-set codec.
//!
//! Message: `[crc:4][magic:1][attributes:1][key_len:4|key][value_len:4|value]`,
//! CRC over every byte after the CRC field itself. Message set: repeated
//! `[offset:8][message_size:4][message]` frames. A message whose attribute
//! bits name a codec carries a whole compressed message set as its value.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::checksum;
use crate::compression::{self, Codec};
use crate::error::{KafwireError, Result};
use crate::types::{Message, OffsetAndMessage};

/// Supported message format version.
pub const MESSAGE_MAGIC: u8 = 0;

/// Bytes of `[offset:8][message_size:4]` preceding each message in a set.
const SET_ENTRY_HEADER: usize = 12;
/// Smallest possible message frame: crc + magic + attributes + two lengths.
const MIN_MESSAGE_SIZE: usize = 14;
/// Compressed sets nested beyond this depth are treated as malformed.
const MAX_NESTING_DEPTH: usize = 8;

/// Encodes one message, checksum first.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    if message.magic != MESSAGE_MAGIC {
        return Err(KafwireError::Protocol(format!(
            "unsupported message magic {}",
            message.magic
        )));
    }
    if message.attributes & !compression::CODEC_MASK != 0 {
        return Err(KafwireError::Protocol(format!(
            "reserved attribute bits set: {:#04x}",
            message.attributes
        )));
    }
    let mut body = BytesMut::with_capacity(MIN_MESSAGE_SIZE + message.value.len());
    body.put_u8(message.magic);
    body.put_u8(message.attributes);
    match &message.key {
        Some(key) => {
            body.put_i32(checked_len(key.len(), "message key")?);
            body.extend_from_slice(key);
        }
        None => body.put_i32(-1),
    }
    body.put_i32(checked_len(message.value.len(), "message value")?);
    body.extend_from_slice(&message.value);

    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&checksum::crc32(&body).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes one message frame, expanding a compressed payload in place.
///
/// The checksum is verified before anything else is read. Entries from a
/// nested compressed set are re-yielded with `offset` from the outer
/// frame: brokers assign real offsets only at the outer level, and
/// downstream consumers expect one offset-numbering convention.
pub fn decode_message(data: &[u8], offset: i64) -> Result<Vec<OffsetAndMessage>> {
    decode_message_at_depth(data, offset, 0)
}

fn decode_message_at_depth(data: &[u8], offset: i64, depth: usize) -> Result<Vec<OffsetAndMessage>> {
    if depth > MAX_NESTING_DEPTH {
        return Err(KafwireError::Protocol(format!(
            "compressed message sets nested deeper than {}",
            MAX_NESTING_DEPTH
        )));
    }
    if data.len() < MIN_MESSAGE_SIZE {
        return Err(KafwireError::Protocol(format!(
            "message frame truncated: {} bytes",
            data.len()
        )));
    }
    let mut buf = data;
    let stored = buf.get_u32();
    checksum::verify(stored, buf)?;

    let magic = buf.get_u8();
    let attributes = buf.get_u8();
    let key = read_nullable_bytes(&mut buf)?;
    let value = read_nullable_bytes(&mut buf)?
        .ok_or_else(|| KafwireError::Protocol("null message value".to_string()))?;
    let message = Message {
        magic,
        attributes,
        key,
        value,
    };

    match Codec::from_attributes(attributes)? {
        Codec::None => Ok(vec![OffsetAndMessage::new(offset, message)]),
        codec => {
            let inner = compression::decompress(codec, &message.value)?;
            let mut out = Vec::new();
            for entry in MessageSetIter::with_depth(&inner, depth + 1) {
                let mut entry = entry?;
                entry.offset = offset;
                out.push(entry);
            }
            Ok(out)
        }
    }
}

/// Encodes a client-produced message set; every offset field is written
/// as `0` since the broker assigns real offsets on append.
pub fn encode_message_set(messages: &[Message]) -> Result<Vec<u8>> {
    encode_entries(messages.iter().map(|m| (0, m)))
}

/// Encodes a message set carrying explicit offsets, as brokers lay out
/// fetch responses.
pub fn encode_message_set_with_offsets(entries: &[(i64, Message)]) -> Result<Vec<u8>> {
    encode_entries(entries.iter().map(|(offset, m)| (*offset, m)))
}

fn encode_entries<'a>(entries: impl Iterator<Item = (i64, &'a Message)>) -> Result<Vec<u8>> {
    let mut out = BytesMut::new();
    for (offset, message) in entries {
        let encoded = encode_message(message)?;
        out.put_i64(offset);
        out.put_i32(checked_len(encoded.len(), "message")?);
        out.extend_from_slice(&encoded);
    }
    Ok(out.to_vec())
}

/// Wire bytes of a message set; decoding is lazy via [`MessageSet::iter`].
///
/// Iteration is single-pass; re-invoking `iter` re-parses from the start
/// of the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSet {
    data: Bytes,
}

impl MessageSet {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }

    /// Raw wire bytes, including any partial trailing frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> MessageSetIter<'_> {
        MessageSetIter::new(&self.data)
    }
}

/// Lazy decoder over sequential `[offset][size][message]` frames.
///
/// Brokers return up to a byte budget and may cut the final frame short;
/// a partial trailing frame ends iteration without error once at least
/// one entry has been produced. If not even one entry fits, the fetch
/// size was too small for any message and the caller must retry larger.
pub struct MessageSetIter<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
    yielded: bool,
    pending: VecDeque<OffsetAndMessage>,
    done: bool,
}

impl<'a> MessageSetIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_depth(buf, 0)
    }

    fn with_depth(buf: &'a [u8], depth: usize) -> Self {
        Self {
            buf,
            pos: 0,
            depth,
            yielded: false,
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn underflow(&mut self) -> Option<Result<OffsetAndMessage>> {
        self.done = true;
        if self.yielded {
            None
        } else {
            Some(Err(KafwireError::FetchSizeTooSmall))
        }
    }
}

impl Iterator for MessageSetIter<'_> {
    type Item = Result<OffsetAndMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                self.yielded = true;
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
            let remaining = self.buf.len() - self.pos;
            if remaining == 0 {
                self.done = true;
                return None;
            }
            if remaining < SET_ENTRY_HEADER {
                return self.underflow();
            }
            let mut header = &self.buf[self.pos..self.pos + SET_ENTRY_HEADER];
            let offset = header.get_i64();
            let size = header.get_i32();
            if size < 0 {
                self.done = true;
                return Some(Err(KafwireError::Protocol(format!(
                    "negative message size {}",
                    size
                ))));
            }
            let size = size as usize;
            if remaining - SET_ENTRY_HEADER < size {
                // Frame cut short by the transport's byte budget.
                return self.underflow();
            }
            let start = self.pos + SET_ENTRY_HEADER;
            let frame = &self.buf[start..start + size];
            self.pos = start + size;
            match decode_message_at_depth(frame, offset, self.depth) {
                // A compressed frame may expand to zero entries; keep scanning.
                Ok(entries) => self.pending.extend(entries),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Builds the single outer message wrapping `payloads` compressed with
/// `codec`: the inner set is encoded, compressed, and tagged with the
/// codec's attribute bits. The outer key is always absent.
pub fn create_compressed_message(
    codec: Codec,
    payloads: Vec<(Vec<u8>, Option<Vec<u8>>)>,
) -> Result<Message> {
    if codec == Codec::None {
        return Err(KafwireError::Protocol(
            "refusing to build a compressed message with no codec".to_string(),
        ));
    }
    if !codec.is_available() {
        return Err(KafwireError::UnsupportedCodec(codec.attribute_bits()));
    }
    let messages: Vec<Message> = payloads
        .into_iter()
        .map(|(value, key)| match key {
            Some(key) => Message::new(value).with_key(key),
            None => Message::new(value),
        })
        .collect();
    let inner = encode_message_set(&messages)?;
    let compressed = compression::compress(codec, &inner)?;
    Ok(Message {
        magic: MESSAGE_MAGIC,
        attributes: codec.attribute_bits(),
        key: None,
        value: compressed,
    })
}

/// Gzip-wraps plain values, the common producer batching path.
pub fn create_gzip_message(payloads: Vec<Vec<u8>>) -> Result<Message> {
    create_compressed_message(Codec::Gzip, payloads.into_iter().map(|v| (v, None)).collect())
}

/// Snappy-wraps plain values.
pub fn create_snappy_message(payloads: Vec<Vec<u8>>) -> Result<Message> {
    create_compressed_message(
        Codec::Snappy,
        payloads.into_iter().map(|v| (v, None)).collect(),
    )
}

fn read_nullable_bytes(buf: &mut &[u8]) -> Result<Option<Vec<u8>>> {
    if buf.remaining() < 4 {
        return Err(KafwireError::Protocol(
            "message frame truncated reading a length prefix".to_string(),
        ));
    }
    let len = buf.get_i32();
    if len == -1 {
        return Ok(None);
    }
    if len < -1 {
        return Err(KafwireError::Protocol(format!(
            "length {} below the null sentinel -1",
            len
        )));
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(KafwireError::Protocol(format!(
            "message frame truncated: {} bytes declared, {} remain",
            len,
            buf.remaining()
        )));
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(Some(out))
}

fn checked_len(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| KafwireError::Protocol(format!("{} of {} bytes overflows i32", what, len)))
}
