//! CPAL output device wrapper for playback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, Host, SampleFormat, SampleRate, Stream, StreamConfig as CpalStreamConfig,
    SupportedBufferSize, SupportedStreamConfigRange,
};

use super::{OutputPlanes, RenderSource};
use crate::format::{CANONICAL_CHANNELS, CHANNEL_NAMES};
use crate::{BridgeConfig, BridgeError};

/// Picks the audio host: JACK when built with the `jack` feature, otherwise the platform default.
fn output_host() -> Result<Host, BridgeError> {
    #[cfg(all(
        feature = "jack",
        any(target_os = "linux", target_os = "dragonfly", target_os = "freebsd")
    ))]
    {
        cpal::host_from_id(cpal::HostId::Jack)
            .map_err(|e| BridgeError::BackendError(format!("JACK host unavailable: {e}")))
    }
    #[cfg(not(all(
        feature = "jack",
        any(target_os = "linux", target_os = "dragonfly", target_os = "freebsd")
    )))]
    {
        Ok(cpal::default_host())
    }
}

/// Ranks an output configuration: most channels up to the canonical slots,
/// then the fewest surplus channels.
fn channel_rank(config: &SupportedStreamConfigRange) -> (u16, std::cmp::Reverse<u16>) {
    let channels = config.channels();
    (
        channels.min(CANONICAL_CHANNELS as u16),
        std::cmp::Reverse(channels),
    )
}

/// Fills an interleaved device buffer of `stride` channels from `source`.
///
/// The device may ask for more (or less) than one period, so rendering goes
/// in blocks of at most `planes.max_frames()`. Only the first `routed`
/// channels carry slots; a trailing partial frame is zeroed.
fn render_blocks<S: RenderSource>(
    data: &mut [f32],
    stride: usize,
    routed: usize,
    planes: &mut OutputPlanes,
    source: &mut S,
) {
    let mut offset = 0;
    while offset < data.len() {
        let frames = (data.len() - offset).checked_div(stride).unwrap_or(0);
        if frames == 0 {
            data[offset..].fill(0.0);
            break;
        }
        planes.set_frames(frames);
        if planes.frames() == 0 {
            data[offset..].fill(0.0);
            break;
        }
        source.render(planes);
        offset += planes.interleave_into(&mut data[offset..], stride, routed) * stride;
    }
}

/// Wrapper around a CPAL audio output device.
///
/// Handles device selection and stream configuration. The stream itself is
/// started by the session builder, which supplies the [`RenderSource`].
#[must_use]
pub struct CpalOutput {
    device: Device,
    name: String,
    config: CpalStreamConfig,
    period_frames: u32,
}

impl CpalOutput {
    /// Opens the output device named in `config`, or the default device.
    ///
    /// Chooses an `f32` configuration at the requested (or device default)
    /// sample rate with as many channels as possible, up to one per canonical
    /// slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the device does not exist, offers no usable `f32`
    /// configuration, or has fewer than `config.min_output_channels` channels.
    pub fn open(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let host = output_host()?;
        let device = match config.output_device.as_deref() {
            Some(name) => Self::find_device(&host, name)?,
            None => host
                .default_output_device()
                .ok_or(BridgeError::NoDefaultDevice)?,
        };
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let sample_rate = match config.sample_rate {
            Some(rate) => rate,
            None => {
                device
                    .default_output_config()
                    .map_err(|e| BridgeError::BackendError(e.to_string()))?
                    .sample_rate()
                    .0
            }
        };

        let candidates: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| BridgeError::BackendError(e.to_string()))?
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .filter(|c| (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&sample_rate))
            .collect();

        let best = candidates
            .iter()
            .max_by_key(|c| channel_rank(c))
            .ok_or_else(|| BridgeError::UnsupportedOutput {
                reason: format!("{name} has no f32 configuration at {sample_rate}Hz"),
            })?;

        if best.channels() < config.min_output_channels {
            return Err(BridgeError::ChannelSetup {
                required: config.min_output_channels,
                available: best.channels(),
            });
        }

        let buffer_size = match best.buffer_size() {
            SupportedBufferSize::Range { min, max }
                if !(*min..=*max).contains(&config.period_frames) =>
            {
                tracing::warn!(
                    period = config.period_frames,
                    min,
                    max,
                    "Output device cannot use the requested period, using its default"
                );
                BufferSize::Default
            }
            _ => BufferSize::Fixed(config.period_frames),
        };

        let stream_config = CpalStreamConfig {
            channels: best.channels(),
            sample_rate: SampleRate(sample_rate),
            buffer_size,
        };

        tracing::info!(
            device = %name,
            sample_rate,
            channels = stream_config.channels,
            period = config.period_frames,
            "Opened output device"
        );

        Ok(Self {
            device,
            name,
            config: stream_config,
            period_frames: config.period_frames,
        })
    }

    fn find_device(host: &Host, name: &str) -> Result<Device, BridgeError> {
        let devices = host
            .output_devices()
            .map_err(|e| BridgeError::BackendError(e.to_string()))?;

        for device in devices {
            if let Ok(device_name) = device.name() {
                if device_name == name {
                    return Ok(device);
                }
            }
        }

        Err(BridgeError::DeviceNotFound {
            name: name.to_string(),
        })
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Channels the device stream is opened with.
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Frames rendered per callback when the device honors the fixed period.
    pub fn period_frames(&self) -> u32 {
        self.period_frames
    }

    /// Names of the canonical slots that reach a device channel, in device order.
    pub fn port_names(&self) -> &'static [&'static str] {
        &CHANNEL_NAMES[..usize::from(self.config.channels).min(CANONICAL_CHANNELS)]
    }

    /// Starts playback, pulling audio from `source`.
    ///
    /// The returned [`OutputStream`] must be kept alive for playback to
    /// continue. A stream error clears `running`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be built or started.
    pub fn start<S>(&self, mut source: S, running: Arc<AtomicBool>) -> Result<OutputStream, BridgeError>
    where
        S: RenderSource + 'static,
    {
        let stride = usize::from(self.config.channels);
        let routed = stride.min(CANONICAL_CHANNELS);
        let mut planes = OutputPlanes::new(self.period_frames as usize);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render_blocks(data, stride, routed, &mut planes, &mut source);
                },
                move |err| {
                    tracing::error!("Audio output stream error: {}", err);
                    running.store(false, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| BridgeError::BackendError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| BridgeError::BackendError(e.to_string()))?;

        tracing::info!(device = %self.name, ports = ?self.port_names(), "Playback started");

        Ok(OutputStream { _stream: stream })
    }
}

/// A running audio output stream.
///
/// Playback continues while this struct is held. When dropped, the CPAL
/// stream is stopped and its resources are released.
pub struct OutputStream {
    /// The underlying CPAL stream. Dropping this stops playback.
    _stream: Stream,
}
