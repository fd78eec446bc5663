//! Builder pattern for `AudioBridge`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::Split;
use ringbuf::HeapRb;

use crate::format::{FormatNegotiator, ResamplerFactory, RubatoFactory};
use crate::pipeline::{spawn_bridge, staging_buffer, BridgeTask, StagingReader};
use crate::session::{Session, SessionState};
use crate::sink::{CpalOutput, RenderNote, ReportingSource};
use crate::source::{MappedRegion, RingReader, SharedRegion, HEADER_LEN};
use crate::{event_callback, BridgeConfig, BridgeError, BridgeEvent, EventCallback};

/// The render side of a session started with [`BridgeBuilder::start_headless()`].
///
/// Call [`render`](crate::sink::RenderSource::render) on it once per period,
/// as an audio callback would.
pub type HeadlessSink = ReportingSource<StagingReader>;

/// Entry point for creating a bridge.
///
/// # Example
///
/// ```ignore
/// use shm_audio_bridge::AudioBridge;
///
/// let session = AudioBridge::builder()
///     .shm_path("/dev/shm/scream-ivshmem")
///     .period_frames(512)
///     .on_event(|e| tracing::warn!(?e, "bridge event"))
///     .start()
///     .await?;
/// ```
pub struct AudioBridge;

impl AudioBridge {
    /// Creates a new builder for configuring a bridge.
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }
}

/// Where the shared ring lives.
enum RegionSource {
    None,
    Path(PathBuf),
    Custom(Box<dyn SharedRegion>),
}

/// Builder for configuring and starting a bridge.
///
/// Use [`AudioBridge::builder()`] to create a new builder. A region must be
/// given with either [`shm_path()`](Self::shm_path) or [`region()`](Self::region).
#[must_use]
pub struct BridgeBuilder {
    region: RegionSource,
    config: BridgeConfig,
    resampler_factory: Arc<dyn ResamplerFactory>,
    event_callback: Option<EventCallback>,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            region: RegionSource::None,
            config: BridgeConfig::default(),
            resampler_factory: Arc::new(RubatoFactory),
            event_callback: None,
        }
    }

    /// Maps the shared-memory file or IVSHMEM device at `path` on start.
    pub fn shm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.region = RegionSource::Path(path.into());
        self
    }

    /// Reads from an already opened region instead of mapping a file.
    ///
    /// Useful with [`MemoryRegion`](crate::source::MemoryRegion) and
    /// [`MockProducer`](crate::source::MockProducer) in tests.
    pub fn region<R: SharedRegion + 'static>(mut self, region: R) -> Self {
        self.region = RegionSource::Custom(Box::new(region));
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how often the ring header is polled.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the frames rendered per output callback.
    pub fn period_frames(mut self, frames: u32) -> Self {
        self.config.period_frames = frames;
        self
    }

    /// Set the output sample rate instead of using the device default.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.sample_rate = Some(rate);
        self
    }

    /// Play through the named output device instead of the default one.
    pub fn output_device(mut self, name: impl Into<String>) -> Self {
        self.config.output_device = Some(name.into());
        self
    }

    /// Use a different resampler implementation.
    ///
    /// Default: [`RubatoFactory`].
    pub fn resampler_factory(mut self, factory: Arc<dyn ResamplerFactory>) -> Self {
        self.resampler_factory = factory;
        self
    }

    /// Set the event callback for runtime notifications.
    ///
    /// Events are emitted from the bridge task, never from the audio callback.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    fn open_region(&mut self) -> Result<Box<dyn SharedRegion>, BridgeError> {
        let region: Box<dyn SharedRegion> =
            match std::mem::replace(&mut self.region, RegionSource::None) {
                RegionSource::None => {
                    return Err(BridgeError::InvalidConfig {
                        reason: "no shared memory region configured".to_string(),
                    })
                }
                RegionSource::Path(path) => Box::new(MappedRegion::open(path)?),
                RegionSource::Custom(region) => region,
            };

        if region.len() < HEADER_LEN {
            return Err(BridgeError::RegionTooSmall {
                len: region.len(),
                required: HEADER_LEN,
            });
        }
        Ok(region)
    }

    /// Wires the bridge task for a sink running at `sink_rate`.
    fn assemble(
        mut self,
        sink_rate: u32,
    ) -> Result<(BridgeTask<Box<dyn SharedRegion>>, HeadlessSink, Arc<SessionState>), BridgeError>
    {
        let region = self.open_region()?;
        let state = Arc::new(SessionState::new());

        let (writer, reader) = staging_buffer(self.config.period_frames as usize);
        let (notes_tx, notes_rx) =
            HeapRb::<RenderNote>::new(self.config.underrun_queue_capacity).split();
        let negotiator = FormatNegotiator::new(
            sink_rate,
            self.config.headroom as usize,
            Arc::clone(&self.resampler_factory),
        );

        let task = BridgeTask::new(
            RingReader::new(region),
            negotiator,
            writer,
            notes_rx,
            Arc::clone(&state),
            self.config.poll_interval,
            self.event_callback.take(),
        );

        Ok((task, ReportingSource::new(reader, notes_tx), state))
    }

    /// Start bridging audio to the output device.
    ///
    /// Maps the region, opens the output device, starts playback and spawns
    /// the bridge task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid or no region was given
    /// - The region cannot be opened or mapped, or is too small
    /// - The output device is missing or cannot provide the requested format
    /// - The output stream fails to start
    pub async fn start(self) -> Result<Session, BridgeError> {
        self.config.validate()?;

        let output = CpalOutput::open(&self.config)?;
        let (task, sink, state) = self.assemble(output.sample_rate())?;

        let stream = output.start(sink, Arc::clone(&state.running))?;
        let handle = spawn_bridge(task);

        Ok(Session::new(state, handle, Some(stream)))
    }

    /// Start the bridge without an output device.
    ///
    /// The caller drives playback by rendering from the returned sink at
    /// `sink_rate`. Used for tests and for embedding the bridge behind
    /// another audio API.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, `sink_rate` is zero,
    /// or the region cannot be opened.
    pub async fn start_headless(self, sink_rate: u32) -> Result<(Session, HeadlessSink), BridgeError> {
        self.config.validate()?;
        if sink_rate == 0 {
            return Err(BridgeError::InvalidConfig {
                reason: "sink_rate must be greater than zero".to_string(),
            });
        }

        let (task, sink, state) = self.assemble(sink_rate)?;
        tracing::info!(sink_rate, "Bridge started headless");
        let handle = spawn_bridge(task);

        Ok((Session::new(state, handle, None), sink))
    }
}
