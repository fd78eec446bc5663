//! Shared-memory source: region access, header layout and ring reader.
//!
//! This module provides the interface between the producer's shared-memory
//! ring and the rest of the bridge pipeline.

mod header;
mod mock;
mod reader;
mod region;

pub use header::{StreamFormat, StreamHeader, HEADER_LEN, HEADER_MAGIC};
pub use mock::{MockProducer, MOCK_CHUNK_OFFSET};
pub use reader::{next_index, ChunkRef, ReaderPoll, RingReader};
pub use region::{MappedRegion, MemoryRegion, SharedRegion};
