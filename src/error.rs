//! Error types for shm-audio-bridge.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`BridgeError`]): Prevent the bridge from starting, or end a running session
//! - **Recoverable events**: Runtime issues surfaced via [`EventCallback`](crate::EventCallback)

use std::path::PathBuf;

/// Fatal errors that prevent the bridge from starting or stop a running session.
///
/// Setup errors are returned from [`BridgeBuilder::start()`]. The only runtime
/// error is a resampler failure, returned from [`Session::wait()`]. Everything
/// else (missing producer, unsupported formats, full staging buffer, underruns)
/// is handled via the event callback instead.
///
/// [`BridgeBuilder::start()`]: crate::BridgeBuilder::start
/// [`Session::wait()`]: crate::Session::wait
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The shared-memory file could not be opened.
    #[error("cannot open shared memory file {path}: {source}")]
    RegionOpen {
        /// Path that was opened.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The shared-memory file could not be mapped.
    #[error("cannot map shared memory file {path}: {source}")]
    RegionMap {
        /// Path that was mapped.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The region is too small to hold a stream header.
    #[error("shared memory region is {len} bytes, need at least {required}")]
    RegionTooSmall {
        /// Size of the mapped region.
        len: usize,
        /// Minimum size required.
        required: usize,
    },

    /// No output device matched the request.
    #[error("output device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default output device is configured on this system.
    #[error("no default output device configured")]
    NoDefaultDevice,

    /// The output device cannot provide enough channels.
    #[error("output device offers {available} channels, need at least {required}")]
    ChannelSetup {
        /// Channels the configuration asked for.
        required: u16,
        /// Channels the device can provide.
        available: u16,
    },

    /// The output device has no usable `f32` configuration.
    #[error("unsupported output configuration: {reason}")]
    UnsupportedOutput {
        /// Why no configuration could be used.
        reason: String,
    },

    /// The configuration is internally inconsistent.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with it.
        reason: String,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),

    /// The resampler failed while the stream was playing.
    #[error("resampler failed: {0}")]
    Resample(#[from] ResampleError),
}

/// Errors raised by a [`Resampler`](crate::format::Resampler).
#[derive(Debug, thiserror::Error)]
pub enum ResampleError {
    /// The resampler cannot be built for the requested conversion.
    #[error("cannot build resampler for {from_rate}Hz -> {to_rate}Hz: {reason}")]
    Construction {
        /// Source sample rate.
        from_rate: u32,
        /// Target sample rate.
        to_rate: u32,
        /// Description of what went wrong.
        reason: String,
    },

    /// Processing a block of audio failed.
    #[error("processing failed: {reason}")]
    Process {
        /// Description of what went wrong.
        reason: String,
    },
}

impl ResampleError {
    /// Creates a processing error with the given reason.
    pub fn process(reason: impl Into<String>) -> Self {
        Self::Process {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::DeviceNotFound {
            name: "USB DAC".to_string(),
        };
        assert_eq!(err.to_string(), "output device not found: USB DAC");
    }

    #[test]
    fn test_channel_setup_display() {
        let err = BridgeError::ChannelSetup {
            required: 2,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "output device offers 1 channels, need at least 2"
        );
    }

    #[test]
    fn test_region_error_includes_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = BridgeError::RegionOpen {
            path: PathBuf::from("/dev/shm/scream-ivshmem"),
            source: io_err,
        };
        assert!(err.to_string().contains("/dev/shm/scream-ivshmem"));
    }

    #[test]
    fn test_resample_error_converts() {
        let err: BridgeError = ResampleError::process("bad buffer").into();
        assert_eq!(err.to_string(), "resampler failed: processing failed: bad buffer");
    }
}
