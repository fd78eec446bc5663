//! Configuration types for the bridge.

use std::time::Duration;

/// Configuration for bridge behavior.
///
/// Use [`BridgeConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use shm_audio_bridge::BridgeConfig;
/// use std::time::Duration;
///
/// let config = BridgeConfig {
///     period_frames: 256,
///     poll_interval: Duration::from_millis(5),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How often the shared-memory header is polled when no chunk is pending.
    ///
    /// Lower values reduce latency but cost CPU time.
    /// Default: 10ms
    pub poll_interval: Duration,

    /// Frames requested by the output device per callback (the hardware period).
    ///
    /// Playback starts once this many frames are staged.
    /// Default: 1024
    pub period_frames: u32,

    /// Multiplier applied to the staging capacity to absorb scheduling jitter.
    ///
    /// The staging buffer holds `headroom * max(period, chunk)` frames.
    /// Default: 3
    pub headroom: u32,

    /// Output sample rate in Hz, or `None` for the device default.
    pub sample_rate: Option<u32>,

    /// Output device name, or `None` for the default output device.
    pub output_device: Option<String>,

    /// Fewest output channels the device must offer.
    ///
    /// Default: 2
    pub min_output_channels: u16,

    /// Capacity of the queue carrying underrun notices out of the audio callback.
    ///
    /// Default: 64
    pub underrun_queue_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            period_frames: 1024,
            headroom: 3,
            sample_rate: None,
            output_device: None,
            min_output_channels: 2,
            underrun_queue_capacity: 64,
        }
    }
}

impl BridgeConfig {
    /// Checks that the configuration can be used to start a bridge.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`](crate::BridgeError::InvalidConfig)
    /// describing the first invalid field.
    pub fn validate(&self) -> Result<(), crate::BridgeError> {
        let invalid = |reason: &str| {
            Err(crate::BridgeError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.poll_interval.is_zero() {
            return invalid("poll_interval must be greater than zero");
        }
        if self.period_frames == 0 {
            return invalid("period_frames must be greater than zero");
        }
        if self.headroom == 0 {
            return invalid("headroom must be at least 1");
        }
        if self.sample_rate == Some(0) {
            return invalid("sample_rate must be greater than zero");
        }
        if self.min_output_channels == 0 {
            return invalid("min_output_channels must be at least 1");
        }
        if self.underrun_queue_capacity == 0 {
            return invalid("underrun_queue_capacity must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_config_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.period_frames, 1024);
        assert_eq!(config.headroom, 3);
        assert_eq!(config.sample_rate, None);
        assert_eq!(config.output_device, None);
        assert_eq!(config.min_output_channels, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_period_rejected() {
        let config = BridgeConfig {
            period_frames: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("period_frames"));
    }

    #[test]
    fn test_zero_headroom_rejected() {
        let config = BridgeConfig {
            headroom: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = BridgeConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
