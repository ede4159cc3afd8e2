//! CRC32 checksum for message integrity verification.

use crc32fast::Hasher;

use crate::error::{KafwireError, Result};

/// CRC-32/IEEE over a byte span.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies a stored checksum against the span it covers.
pub fn verify(stored: u32, data: &[u8]) -> Result<()> {
    let computed = crc32(data);
    if stored != computed {
        return Err(KafwireError::Checksum { stored, computed });
    }
    Ok(())
}
