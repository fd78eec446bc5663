//! Ring buffer reader - follows the producer's write index through the chunk ring.

use super::header::{StreamHeader, HEADER_LEN};
use super::region::SharedRegion;

/// Location of one chunk in the region, as seen when it was polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRef {
    /// Ring index of the chunk.
    pub index: u16,
    /// Byte offset of the chunk within the region.
    pub start: usize,
    /// Chunk size in bytes.
    pub len: usize,
    /// Header snapshot taken when the chunk was discovered.
    pub header: StreamHeader,
}

/// Result of a single poll of the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderPoll {
    /// The producer has not initialized the ring (bad magic or no chunks).
    NotReady,
    /// The ring became valid and the cursor jumped to the producer's write index.
    ///
    /// `after_reset` is `false` for the first sync after startup and `true`
    /// when the producer went away and came back; any backlog is dropped.
    Resynced {
        /// Write index the cursor was moved to.
        write_index: u16,
        /// Whether this follows a producer reset rather than startup.
        after_reset: bool,
    },
    /// No chunk has been completed since the last one we consumed.
    Idle,
    /// The next chunk in the ring is ready to be consumed.
    Chunk(ChunkRef),
}

/// Advances a ring index by one slot, wrapping at `max_chunks`.
///
/// `max_chunks` must be non-zero.
#[inline]
#[must_use]
pub fn next_index(index: u16, max_chunks: u16) -> u16 {
    ((u32::from(index) + 1) % u32::from(max_chunks)) as u16
}

/// Polls a [`SharedRegion`] for newly completed chunks.
///
/// The reader never blocks and never fails: absence of data is reported as
/// [`ReaderPoll::NotReady`] or [`ReaderPoll::Idle`] and the caller decides how
/// long to wait before polling again.
pub struct RingReader<R> {
    region: R,
    read_index: u16,
    needs_resync: bool,
    synced_once: bool,
}

impl<R: SharedRegion> RingReader<R> {
    /// Creates a reader that will sync to the producer on the first valid poll.
    pub fn new(region: R) -> Self {
        Self {
            region,
            read_index: 0,
            needs_resync: true,
            synced_once: false,
        }
    }

    /// The index of the last consumed chunk.
    pub fn read_index(&self) -> u16 {
        self.read_index
    }

    /// The underlying region.
    pub fn region(&self) -> &R {
        &self.region
    }

    /// Reads the current header, or `None` if the region cannot hold one.
    pub fn header(&self) -> Option<StreamHeader> {
        let mut bytes = [0u8; HEADER_LEN];
        self.region
            .read_into(0, &mut bytes)
            .then(|| StreamHeader::parse(&bytes))
    }

    /// Checks the ring once and advances the cursor if a new chunk is available.
    pub fn poll(&mut self) -> ReaderPoll {
        let Some(header) = self.header() else {
            return ReaderPoll::NotReady;
        };

        // A write index outside the ring could never be caught up with
        if !header.is_valid() || header.write_index >= header.max_chunks {
            self.needs_resync = true;
            return ReaderPoll::NotReady;
        }

        if self.needs_resync {
            self.needs_resync = false;
            self.read_index = header.write_index;
            let after_reset = self.synced_once;
            self.synced_once = true;
            return ReaderPoll::Resynced {
                write_index: header.write_index,
                after_reset,
            };
        }

        if self.read_index == header.write_index {
            return ReaderPoll::Idle;
        }

        self.read_index = next_index(self.read_index, header.max_chunks);
        ReaderPoll::Chunk(ChunkRef {
            index: self.read_index,
            start: header.chunk_start(self.read_index),
            len: header.chunk_size as usize,
            header,
        })
    }

    /// Copies the bytes of `chunk` into `dst`.
    ///
    /// `dst` must be exactly `chunk.len` bytes. Returns `false` if the chunk
    /// lies (even partly) outside the region.
    pub fn read_chunk(&self, chunk: &ChunkRef, dst: &mut [u8]) -> bool {
        dst.len() == chunk.len && self.region.read_into(chunk.start, dst)
    }
}
