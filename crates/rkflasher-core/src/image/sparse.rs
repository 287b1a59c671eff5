//! Android sparse image headers
//!
//! Only the header-level knowledge lives here; the flashing side
//! streams chunk payloads straight from the file to the device without
//! materializing the expanded image.

use crate::error::{Error, FormatError, Result};

use super::{le16, le32};

/// Sparse image magic, 0xED26FF3A.
pub const SPARSE_MAGIC: u32 = 0xED26_FF3A;

/// File header length in bytes.
pub const SPARSE_HEADER_LEN: usize = 28;

/// Chunk header length in bytes.
pub const CHUNK_HEADER_LEN: usize = 12;

/// How a chunk's blocks are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Payload bytes follow the chunk header verbatim.
    Raw,
    /// A 4-byte pattern follows, replicated across the chunk.
    Fill,
    /// No payload; the destination cursor just advances.
    DontCare,
    /// A CRC32 follows. Consumed, not verified.
    Crc32,
}

impl ChunkKind {
    fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0xCAC1 => Some(Self::Raw),
            0xCAC2 => Some(Self::Fill),
            0xCAC3 => Some(Self::DontCare),
            0xCAC4 => Some(Self::Crc32),
            _ => None,
        }
    }
}

/// Parsed sparse file header.
#[derive(Debug, Clone, Copy)]
pub struct SparseHeader {
    /// Format major version.
    pub major_version: u16,
    /// Format minor version.
    pub minor_version: u16,
    /// Stored file header size; 28 in every image in the wild.
    pub file_header_size: u16,
    /// Stored chunk header size; 12 in every image in the wild.
    pub chunk_header_size: u16,
    /// Block size in bytes, a multiple of 4.
    pub block_size: u32,
    /// Expanded image size in blocks.
    pub total_blocks: u32,
    /// Number of chunks in the file.
    pub total_chunks: u32,
    /// Stored image checksum. Not verified.
    pub image_checksum: u32,
}

impl SparseHeader {
    /// Parse and verify the magic.
    pub fn parse(buf: &[u8; SPARSE_HEADER_LEN]) -> Result<Self> {
        if le32(buf, 0) != SPARSE_MAGIC {
            return Err(Error::Format(FormatError::BadMagic));
        }
        Ok(Self {
            major_version: le16(buf, 4),
            minor_version: le16(buf, 6),
            file_header_size: le16(buf, 8),
            chunk_header_size: le16(buf, 10),
            block_size: le32(buf, 12),
            total_blocks: le32(buf, 16),
            total_chunks: le32(buf, 20),
            image_checksum: le32(buf, 24),
        })
    }

    /// Expanded image size in bytes.
    pub fn expanded_len(&self) -> u64 {
        self.block_size as u64 * self.total_blocks as u64
    }
}

/// Parsed chunk header.
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    /// Chunk kind.
    pub kind: ChunkKind,
    /// Chunk length in blocks of the expanded image.
    pub chunk_blocks: u32,
    /// Chunk length in the sparse file, header included.
    pub total_size: u32,
}

impl ChunkHeader {
    /// Parse one chunk header. Unknown chunk types are fatal.
    pub fn parse(buf: &[u8; CHUNK_HEADER_LEN]) -> Result<Self> {
        let kind = ChunkKind::from_raw(le16(buf, 0))
            .ok_or(Error::Format(FormatError::InvalidField))?;
        Ok(Self {
            kind,
            chunk_blocks: le32(buf, 4),
            total_size: le32(buf, 8),
        })
    }

    /// Payload bytes following this header in the sparse file.
    pub fn payload_len(&self) -> u64 {
        (self.total_size as u64).saturating_sub(CHUNK_HEADER_LEN as u64)
    }

    /// Bytes this chunk covers in the expanded image.
    pub fn expanded_len(&self, header: &SparseHeader) -> u64 {
        self.chunk_blocks as u64 * header.block_size as u64
    }
}

/// Quick magic probe on a file prefix, for picking the sparse write
/// path over a plain one.
pub fn is_sparse_image(prefix: &[u8]) -> bool {
    prefix.len() >= 4 && le32(prefix, 0) == SPARSE_MAGIC
}
