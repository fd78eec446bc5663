//! Bridge pipeline components.
//!
//! The pipeline moves audio from the shared-memory ring to the output device:
//!
//! ```text
//! Shared Ring → Bridge Task → Staging Buffer → Output Callback
//! ```
//!
//! - **Bridge Task**: Polls the ring, negotiates formats, decodes and resamples chunks
//! - **Staging Buffer**: Bounded interleaved buffer shared with the output callback
//! - **Spin Lock**: Guards the staging buffer with short, non-sleeping critical sections
//!
//! The output callback never allocates, logs or waits on the bridge task.

mod bridge;
mod spin;
mod staging;

pub(crate) use bridge::{spawn_bridge, BridgeTask};
pub use spin::{lock_spinning, RawSpinLock, SpinMutex, SpinMutexGuard};
pub use staging::{staging_buffer, StagingReader, StagingStatus, StagingWriter};
