//! Compression codecs for message payloads (gzip, snappy).
//!
//! Each codec is behind a default-on cargo feature; a build without a
//! codec reports it as unavailable and fails loudly if asked to decode
//! data tagged with it.

use std::sync::OnceLock;

#[cfg(feature = "gzip")]
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
#[cfg(feature = "gzip")]
use std::io::{Read, Write};

#[cfg(any(feature = "gzip", feature = "snappy"))]
use tracing::debug;

use crate::error::{KafwireError, Result};

/// Mask selecting the codec bits of a message's attributes field.
pub const CODEC_MASK: u8 = 0x03;
pub const CODEC_NONE: u8 = 0x00;
pub const CODEC_GZIP: u8 = 0x01;
pub const CODEC_SNAPPY: u8 = 0x02;

/// Header prefix of the xerial blocked snappy format some producers emit.
#[cfg(feature = "snappy")]
const XERIAL_MAGIC: &[u8] = &[0x82, b'S', b'N', b'A', b'P', b'P', b'Y', 0];
#[cfg(feature = "snappy")]
const XERIAL_HEADER_SIZE: usize = 16;

/// Compression codec named by a message's attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Gzip,
    Snappy,
}

impl Codec {
    /// The attribute bits that name this codec on the wire.
    pub fn attribute_bits(self) -> u8 {
        match self {
            Codec::None => CODEC_NONE,
            Codec::Gzip => CODEC_GZIP,
            Codec::Snappy => CODEC_SNAPPY,
        }
    }

    /// Reads the codec out of a message's attributes field.
    pub fn from_attributes(attributes: u8) -> Result<Codec> {
        match attributes & CODEC_MASK {
            CODEC_NONE => Ok(Codec::None),
            CODEC_GZIP => Ok(Codec::Gzip),
            CODEC_SNAPPY => Ok(Codec::Snappy),
            bits => Err(KafwireError::UnsupportedCodec(bits)),
        }
    }

    /// Whether this build carries the codec's back-end.
    pub fn is_available(self) -> bool {
        let support = support();
        match self {
            Codec::None => true,
            Codec::Gzip => support.gzip,
            Codec::Snappy => support.snappy,
        }
    }
}

/// Codec back-ends present in this build, probed once per process.
#[derive(Debug, Clone, Copy)]
pub struct CodecSupport {
    pub gzip: bool,
    pub snappy: bool,
}

static SUPPORT: OnceLock<CodecSupport> = OnceLock::new();

/// The process-wide, immutable codec capability flags.
pub fn support() -> CodecSupport {
    *SUPPORT.get_or_init(|| CodecSupport {
        gzip: cfg!(feature = "gzip"),
        snappy: cfg!(feature = "snappy"),
    })
}

/// Compresses `data` with `codec`; `Codec::None` passes the bytes through.
pub fn compress(codec: Codec, data: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Codec::None => Ok(data.to_vec()),
        Codec::Gzip => gzip_compress(data),
        Codec::Snappy => snappy_compress(data),
    }
}

/// Decompresses `data` tagged with `codec`.
pub fn decompress(codec: Codec, data: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Codec::None => Ok(data.to_vec()),
        Codec::Gzip => gzip_decompress(data),
        Codec::Snappy => snappy_decompress(data),
    }
}

#[cfg(feature = "gzip")]
pub fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(feature = "gzip")]
pub fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    debug!(compressed = data.len(), decompressed = out.len(), "gzip payload inflated");
    Ok(out)
}

#[cfg(not(feature = "gzip"))]
pub fn gzip_compress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(KafwireError::UnsupportedCodec(CODEC_GZIP))
}

#[cfg(not(feature = "gzip"))]
pub fn gzip_decompress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(KafwireError::UnsupportedCodec(CODEC_GZIP))
}

/// Raw snappy block format, as the reference producers emit.
#[cfg(feature = "snappy")]
pub fn snappy_compress(data: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Encoder::new()
        .compress_vec(data)
        .map_err(|e| KafwireError::Compression(format!("snappy compression failed: {}", e)))
}

/// Accepts both raw snappy blocks and the xerial blocked framing.
#[cfg(feature = "snappy")]
pub fn snappy_decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > XERIAL_HEADER_SIZE && data.starts_with(XERIAL_MAGIC) {
        return xerial_decompress(&data[XERIAL_HEADER_SIZE..]);
    }
    snap::raw::Decoder::new()
        .decompress_vec(data)
        .map_err(|e| KafwireError::Compression(format!("snappy decompression failed: {}", e)))
}

/// Xerial body: repeated `[block_len:4][snappy block]`.
#[cfg(feature = "snappy")]
fn xerial_decompress(mut body: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut decoder = snap::raw::Decoder::new();
    while !body.is_empty() {
        if body.len() < 4 {
            return Err(KafwireError::Compression(
                "truncated xerial block header".to_string(),
            ));
        }
        let block_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
        body = &body[4..];
        if body.len() < block_len {
            return Err(KafwireError::Compression(format!(
                "xerial block length {} exceeds remaining {} bytes",
                block_len,
                body.len()
            )));
        }
        let block = decoder
            .decompress_vec(&body[..block_len])
            .map_err(|e| KafwireError::Compression(format!("xerial block failed: {}", e)))?;
        out.extend_from_slice(&block);
        body = &body[block_len..];
    }
    debug!(decompressed = out.len(), "xerial snappy payload inflated");
    Ok(out)
}

#[cfg(not(feature = "snappy"))]
pub fn snappy_compress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(KafwireError::UnsupportedCodec(CODEC_SNAPPY))
}

#[cfg(not(feature = "snappy"))]
pub fn snappy_decompress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(KafwireError::UnsupportedCodec(CODEC_SNAPPY))
}
