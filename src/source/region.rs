//! Access to the shared-memory region written by the producer.
//!
//! The producer lives outside this process (usually in another VM), so the
//! region can change under us at any time. Reads always copy out of the region
//! instead of handing out references into it.

#![allow(unsafe_code)] // Memory mapping requires unsafe

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::RwLock;

use super::header::HEADER_LEN;
use crate::BridgeError;

/// A byte region the bridge can poll.
///
/// Implemented by [`MappedRegion`] for real shared memory and by
/// [`MemoryRegion`] for tests and simulations.
pub trait SharedRegion: Send {
    /// Size of the region in bytes.
    fn len(&self) -> usize;

    /// Copies `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Returns `false` (leaving `dst` untouched) if the range does not fit in
    /// the region.
    fn read_into(&self, offset: usize, dst: &mut [u8]) -> bool;

    /// Returns `true` if the region has no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: SharedRegion + ?Sized> SharedRegion for Box<R> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn read_into(&self, offset: usize, dst: &mut [u8]) -> bool {
        (**self).read_into(offset, dst)
    }
}

/// Returns `true` if `offset..offset + len` lies within a region of `region_len` bytes.
fn range_fits(region_len: usize, offset: usize, len: usize) -> bool {
    offset
        .checked_add(len)
        .is_some_and(|end| end <= region_len)
}

/// A read-only memory mapping of a shared-memory file or IVSHMEM device.
pub struct MappedRegion {
    map: Mmap,
    path: PathBuf,
}

impl MappedRegion {
    /// Maps the file at `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or if it is
    /// too small to contain a stream header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| BridgeError::RegionOpen {
            path: path.clone(),
            source,
        })?;

        // SAFETY: the mapping is read-only and never handed out as a slice;
        // all reads go through `read_into`, which copies with volatile loads.
        let map = unsafe { Mmap::map(&file) }.map_err(|source| BridgeError::RegionMap {
            path: path.clone(),
            source,
        })?;

        if map.len() < HEADER_LEN {
            return Err(BridgeError::RegionTooSmall {
                len: map.len(),
                required: HEADER_LEN,
            });
        }

        tracing::info!(path = %path.display(), len = map.len(), "Mapped shared memory region");

        Ok(Self { map, path })
    }

    /// Path of the mapped file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SharedRegion for MappedRegion {
    fn len(&self) -> usize {
        self.map.len()
    }

    fn read_into(&self, offset: usize, dst: &mut [u8]) -> bool {
        if !range_fits(self.map.len(), offset, dst.len()) {
            return false;
        }

        let src = self.map.as_ptr();
        for (i, byte) in dst.iter_mut().enumerate() {
            // SAFETY: `offset + i < self.map.len()` was checked above and the
            // mapping lives as long as `self`. Volatile because another
            // process writes this memory.
            *byte = unsafe { std::ptr::read_volatile(src.add(offset + i)) };
        }
        true
    }
}

/// An in-process region backed by a heap buffer.
///
/// Cloning yields another handle to the same bytes, so one clone can be
/// handed to the bridge while another plays the producer.
///
/// # Example
///
/// ```
/// use shm_audio_bridge::source::{MemoryRegion, SharedRegion};
///
/// let region = MemoryRegion::new(64);
/// let writer = region.clone();
/// writer.write(8, &[1, 2, 3]);
///
/// let mut out = [0u8; 3];
/// assert!(region.read_into(8, &mut out));
/// assert_eq!(out, [1, 2, 3]);
/// ```
#[derive(Clone)]
pub struct MemoryRegion {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl MemoryRegion {
    /// Creates a zero-filled region of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(vec![0; len])),
        }
    }

    /// Overwrites bytes starting at `offset`.
    ///
    /// Bytes that would fall past the end of the region are ignored.
    pub fn write(&self, offset: usize, src: &[u8]) {
        let mut bytes = self.bytes.write();
        if offset >= bytes.len() {
            return;
        }
        let end = (offset + src.len()).min(bytes.len());
        bytes[offset..end].copy_from_slice(&src[..end - offset]);
    }

    /// Returns a copy of the whole region.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl SharedRegion for MemoryRegion {
    fn len(&self) -> usize {
        self.bytes.read().len()
    }

    fn read_into(&self, offset: usize, dst: &mut [u8]) -> bool {
        let bytes = self.bytes.read();
        if !range_fits(bytes.len(), offset, dst.len()) {
            return false;
        }
        dst.copy_from_slice(&bytes[offset..offset + dst.len()]);
        true
    }
}
