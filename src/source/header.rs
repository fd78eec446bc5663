//! Shared-memory stream header layout.
//!
//! The producer writes a fixed header at the start of the region, laid out like
//! the C struct the Scream driver uses (little-endian, natural alignment):
//!
//! ```text
//! offset  size  field
//!      0     4  magic
//!      4     2  write_index
//!      6     1  chunk_offset
//!      8     2  max_chunks
//!     12     4  chunk_size
//!     16     1  sample_rate_code
//!     17     1  sample_size
//!     18     1  channel_count
//!     20     2  channel_map
//! ```

use std::fmt;

/// Value of `magic` while the producer's stream is valid.
pub const HEADER_MAGIC: u32 = 0x1111_2014;

/// Size of the header in bytes, including trailing padding.
pub const HEADER_LEN: usize = 24;

const MAGIC_AT: usize = 0;
const WRITE_INDEX_AT: usize = 4;
const CHUNK_OFFSET_AT: usize = 6;
const MAX_CHUNKS_AT: usize = 8;
const CHUNK_SIZE_AT: usize = 12;
const SAMPLE_RATE_AT: usize = 16;
const SAMPLE_SIZE_AT: usize = 17;
const CHANNELS_AT: usize = 18;
const CHANNEL_MAP_AT: usize = 20;

/// Rate family selected when the high bit of the rate code is set.
const RATE_BASE_44K1: u32 = 44_100;
/// Rate family selected when the high bit of the rate code is clear.
const RATE_BASE_48K: u32 = 48_000;

/// The stream format advertised by the header.
///
/// This is the raw tuple the negotiator compares on every poll; any difference
/// in any field is a format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamFormat {
    /// Encoded sample rate (family bit + multiplier).
    pub rate_code: u8,
    /// Bits per sample.
    pub sample_size: u8,
    /// Interleaved channels per frame.
    pub channels: u8,
    /// Speaker-position bitmask.
    pub channel_map: u16,
}

impl StreamFormat {
    /// Decodes the nominal sample rate in Hz.
    ///
    /// Returns 0 when the multiplier is zero, which no producer can play.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        let base = if self.rate_code >= 128 {
            RATE_BASE_44K1
        } else {
            RATE_BASE_48K
        };
        base * u32::from(self.rate_code % 128)
    }

    /// Bytes per frame (one sample for every channel).
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        usize::from(self.sample_size / 8) * usize::from(self.channels)
    }
}

impl Default for StreamFormat {
    /// Stereo front-left/front-right with no rate, the state before any stream is seen.
    fn default() -> Self {
        Self {
            rate_code: 0,
            sample_size: 0,
            channels: 2,
            channel_map: 0x0003,
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}bit/{}ch map={:#06x}",
            self.sample_rate(),
            self.sample_size,
            self.channels,
            self.channel_map
        )
    }
}

/// A decoded snapshot of the stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Sentinel, equal to [`HEADER_MAGIC`] while the stream is valid.
    pub magic: u32,
    /// Index of the most recently completed chunk.
    pub write_index: u16,
    /// Byte offset of chunk 0 within the region.
    pub chunk_offset: u8,
    /// Number of chunk slots in the ring.
    pub max_chunks: u16,
    /// Size of each chunk slot in bytes.
    pub chunk_size: u32,
    /// Current stream format.
    pub format: StreamFormat,
}

impl StreamHeader {
    /// Decodes a header from its wire bytes.
    #[must_use]
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        Self {
            magic: u32_at(MAGIC_AT),
            write_index: u16_at(WRITE_INDEX_AT),
            chunk_offset: bytes[CHUNK_OFFSET_AT],
            max_chunks: u16_at(MAX_CHUNKS_AT),
            chunk_size: u32_at(CHUNK_SIZE_AT),
            format: StreamFormat {
                rate_code: bytes[SAMPLE_RATE_AT],
                sample_size: bytes[SAMPLE_SIZE_AT],
                channels: bytes[CHANNELS_AT],
                channel_map: u16_at(CHANNEL_MAP_AT),
            },
        }
    }

    /// Encodes the header into its wire bytes.
    ///
    /// Padding bytes are written as zero.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[MAGIC_AT..MAGIC_AT + 4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[WRITE_INDEX_AT..WRITE_INDEX_AT + 2].copy_from_slice(&self.write_index.to_le_bytes());
        bytes[CHUNK_OFFSET_AT] = self.chunk_offset;
        bytes[MAX_CHUNKS_AT..MAX_CHUNKS_AT + 2].copy_from_slice(&self.max_chunks.to_le_bytes());
        bytes[CHUNK_SIZE_AT..CHUNK_SIZE_AT + 4].copy_from_slice(&self.chunk_size.to_le_bytes());
        bytes[SAMPLE_RATE_AT] = self.format.rate_code;
        bytes[SAMPLE_SIZE_AT] = self.format.sample_size;
        bytes[CHANNELS_AT] = self.format.channels;
        bytes[CHANNEL_MAP_AT..CHANNEL_MAP_AT + 2]
            .copy_from_slice(&self.format.channel_map.to_le_bytes());
        bytes
    }

    /// Returns `true` if the producer has initialized the ring.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.magic == HEADER_MAGIC && self.max_chunks > 0
    }

    /// Byte offset of chunk `index` within the region.
    #[must_use]
    pub fn chunk_start(&self, index: u16) -> usize {
        usize::from(self.chunk_offset) + self.chunk_size as usize * usize::from(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_48k() -> StreamHeader {
        StreamHeader {
            magic: HEADER_MAGIC,
            write_index: 7,
            chunk_offset: 64,
            max_chunks: 15,
            chunk_size: 1152,
            format: StreamFormat {
                rate_code: 1,
                sample_size: 16,
                channels: 2,
                channel_map: 0x0003,
            },
        }
    }

    #[test]
    fn test_field_offsets_match_wire_layout() {
        let bytes = stereo_48k().to_bytes();
        assert_eq!(&bytes[0..4], &[0x14, 0x20, 0x11, 0x11]);
        assert_eq!(&bytes[4..6], &[7, 0]);
        assert_eq!(bytes[6], 64);
        assert_eq!(&bytes[8..10], &[15, 0]);
        assert_eq!(&bytes[12..16], &1152u32.to_le_bytes());
        assert_eq!(bytes[16], 1);
        assert_eq!(bytes[17], 16);
        assert_eq!(bytes[18], 2);
        assert_eq!(&bytes[20..22], &[0x03, 0x00]);
    }

    #[test]
    fn test_parse_reads_encoded_header() {
        let header = stereo_48k();
        assert_eq!(StreamHeader::parse(&header.to_bytes()), header);
    }

    #[test]
    fn test_rate_code_families() {
        let rate = |rate_code| {
            StreamFormat {
                rate_code,
                ..StreamFormat::default()
            }
            .sample_rate()
        };
        assert_eq!(rate(1), 48_000);
        assert_eq!(rate(2), 96_000);
        assert_eq!(rate(129), 44_100);
        assert_eq!(rate(132), 176_400);
    }

    #[test]
    fn test_zero_multiplier_yields_zero_rate() {
        for rate_code in [0u8, 128] {
            let format = StreamFormat {
                rate_code,
                ..StreamFormat::default()
            };
            assert_eq!(format.sample_rate(), 0);
        }
    }

    #[test]
    fn test_invalid_magic_or_empty_ring() {
        let mut header = stereo_48k();
        assert!(header.is_valid());

        header.max_chunks = 0;
        assert!(!header.is_valid());

        header.max_chunks = 15;
        header.magic = 0;
        assert!(!header.is_valid());
    }

    #[test]
    fn test_chunk_start() {
        let header = stereo_48k();
        assert_eq!(header.chunk_start(0), 64);
        assert_eq!(header.chunk_start(3), 64 + 1152 * 3);
    }

    #[test]
    fn test_frame_bytes() {
        let format = StreamFormat {
            rate_code: 1,
            sample_size: 24,
            channels: 6,
            channel_map: 0x003f,
        };
        assert_eq!(format.frame_bytes(), 18);
    }
}
