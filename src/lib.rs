//! # shm-audio-bridge
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Plays PCM audio published by a Scream IVSHMEM producer through a real-time
//! audio output.
//!
//! A guest VM's audio driver writes chunks of PCM into a ring inside a
//! shared-memory region. `shm-audio-bridge` polls that ring, follows the
//! producer through format changes (sample rate, bit depth, speaker layout),
//! resamples to the output rate when needed and feeds a fixed-period output
//! device via CPAL.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shm_audio_bridge::AudioBridge;
//!
//! let session = AudioBridge::builder()
//!     .shm_path("/dev/shm/scream-ivshmem")
//!     .period_frames(512)
//!     .on_event(|e| tracing::warn!(?e, "bridge event"))
//!     .start()
//!     .await?;
//!
//! let shutdown = session.shutdown_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     shutdown.shutdown();
//! });
//!
//! session.wait().await?;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Tokio Task**: Polls the shared ring, negotiates formats, decodes and resamples
//! - **Staging Buffer**: Spin-locked buffer holding a few periods of decoded audio
//! - **CPAL Thread**: High-priority audio callback that never allocates or blocks
//!
//! Underruns travel from the audio callback back to the task through a
//! lock-free queue, so logging and event callbacks stay off the audio thread.

// unsafe_code lint is configured in Cargo.toml as "deny"; the mapping and spin-lock modules opt out
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod config;
mod error;
mod event;
pub mod format;
pub mod pipeline;
mod session;
pub mod sink;
pub mod source;

pub use builder::{AudioBridge, BridgeBuilder, HeadlessSink};
pub use config::BridgeConfig;
pub use error::{BridgeError, ResampleError};
pub use event::{event_callback, BridgeEvent, EventCallback};
pub use session::{Session, SessionStats, ShutdownHandle};
pub use sink::{OutputPlanes, RenderOutcome, RenderSource};
pub use source::{MappedRegion, MemoryRegion, MockProducer, SharedRegion, StreamFormat};
