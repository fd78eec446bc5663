//! Stream format negotiation.
//!
//! Every chunk arrives with a header snapshot. The [`FormatNegotiator`]
//! compares its format against the last one seen and, on a change, decides
//! whether the new format can be played, whether it needs resampling, and how
//! large the staging buffer must be. It then owns the [`ChunkDecoder`] that
//! turns raw chunks of that format into staged frames.

use std::sync::Arc;

use super::channel_map::ChannelRouting;
use super::decode::{decode_into, SampleSize};
use super::resample::{Resampler, ResamplerFactory};
use crate::pipeline::StagingWriter;
use crate::source::{StreamFormat, StreamHeader};
use crate::ResampleError;

/// A format the bridge is currently playing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveFormat {
    /// The header's format tuple.
    pub format: StreamFormat,
    /// Decoded source sample rate in Hz.
    pub source_rate: u32,
    /// Rate the sink plays at.
    pub sink_rate: u32,
    /// Width of each sample.
    pub sample_size: SampleSize,
    /// Interleaved channels per frame.
    pub channels: usize,
    /// Source frames in one chunk.
    pub chunk_frames: usize,
    /// Frames one chunk occupies once staged (after resampling, if any).
    pub chunk_output_frames: usize,
    /// Staging capacity in frames.
    pub capacity_frames: usize,
    /// `sink_rate / source_rate`, or `None` when no resampling is needed.
    pub resample_ratio: Option<f64>,
}

/// Outcome of [`FormatNegotiator::negotiate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Negotiation {
    /// The header matches the last negotiated format; nothing was touched.
    Unchanged,
    /// A new format was accepted and the staging buffer was rebuilt for it.
    Playing {
        /// The previously seen format, if any.
        previous: Option<StreamFormat>,
        /// The format now playing.
        active: ActiveFormat,
    },
    /// The new format cannot be played. Playback is halted until the next change.
    Unsupported {
        /// The rejected format.
        format: StreamFormat,
        /// Why it was rejected.
        reason: String,
    },
}

/// What happened to one chunk handed to [`ChunkDecoder::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Frames the chunk produced (after resampling).
    pub frames: usize,
    /// `false` if the staging buffer had no room and the frames were dropped.
    pub staged: bool,
    /// Source frames the resampler left unconsumed, if it did not take the whole chunk.
    pub unconsumed: Option<usize>,
}

struct ResampleStage {
    resampler: Box<dyn Resampler>,
    decoded: Vec<f32>,
    output: Vec<f32>,
}

/// Decodes chunks of one negotiated format into the staging buffer.
pub struct ChunkDecoder {
    active: ActiveFormat,
    resample: Option<ResampleStage>,
}

impl ChunkDecoder {
    /// The format this decoder handles.
    pub fn active(&self) -> &ActiveFormat {
        &self.active
    }

    /// Decodes one raw chunk and appends it to `staging`.
    ///
    /// Trailing bytes that do not form a whole frame are ignored. Without
    /// resampling, samples are decoded straight into the staging buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the resampler fails; the session cannot continue.
    pub fn deliver(
        &mut self,
        raw: &[u8],
        staging: &StagingWriter,
    ) -> Result<Delivery, ResampleError> {
        let format = &self.active;
        let frame_bytes = format.format.frame_bytes();
        let frames = (raw.len() / frame_bytes).min(format.chunk_frames);
        let raw = &raw[..frames * frame_bytes];
        let sample_size = format.sample_size;
        let channels = format.channels;

        let Some(stage) = self.resample.as_mut() else {
            let staged = staging.push_with(frames, |dst| {
                decode_into(raw, sample_size, dst);
            });
            return Ok(Delivery {
                frames,
                staged,
                unconsumed: None,
            });
        };

        let samples = decode_into(raw, sample_size, &mut stage.decoded);
        let result = stage
            .resampler
            .process(&stage.decoded[..samples], &mut stage.output)?;

        let staged = staging.push(&stage.output[..result.frames_written * channels]);
        Ok(Delivery {
            frames: result.frames_written,
            staged,
            unconsumed: (result.frames_consumed < frames).then(|| frames - result.frames_consumed),
        })
    }
}

/// Tracks the stream format and rebuilds the decode path when it changes.
pub struct FormatNegotiator {
    sink_rate: u32,
    headroom: usize,
    factory: Arc<dyn ResamplerFactory>,
    last: Option<(StreamFormat, u32)>,
    decoder: Option<ChunkDecoder>,
}

impl FormatNegotiator {
    /// Creates a negotiator for a sink running at `sink_rate`.
    ///
    /// `headroom` multiplies the staging capacity; resamplers are built by `factory`.
    pub fn new(sink_rate: u32, headroom: usize, factory: Arc<dyn ResamplerFactory>) -> Self {
        Self {
            sink_rate,
            headroom,
            factory,
            last: None,
            decoder: None,
        }
    }

    /// Rate the sink plays at.
    pub fn sink_rate(&self) -> u32 {
        self.sink_rate
    }

    /// The decoder for the current format, or `None` while nothing playable is negotiated.
    pub fn decoder_mut(&mut self) -> Option<&mut ChunkDecoder> {
        self.decoder.as_mut()
    }

    /// The format currently playing.
    pub fn active(&self) -> Option<&ActiveFormat> {
        self.decoder.as_ref().map(ChunkDecoder::active)
    }

    /// Reacts to the format in `header`.
    ///
    /// Does nothing if the format (and chunk size) match the last call.
    /// Otherwise either rebuilds the decode path and the staging buffer, or
    /// halts playback if the format is unsupported.
    pub fn negotiate(&mut self, header: &StreamHeader, staging: &StagingWriter) -> Negotiation {
        let key = (header.format, header.chunk_size);
        if self.last == Some(key) {
            return Negotiation::Unchanged;
        }
        let previous = self.last.map(|(format, _)| format);
        self.last = Some(key);

        // Previous resampler and scratch are released before building new ones
        self.decoder = None;

        match self.build(header, staging.period_frames()) {
            Ok(decoder) => {
                let active = decoder.active;
                staging.reconfigure(
                    active.channels,
                    active.capacity_frames,
                    ChannelRouting::new(active.format.channel_map, active.channels),
                );
                tracing::info!(
                    format = %active.format,
                    sink_rate = self.sink_rate,
                    resample_ratio = ?active.resample_ratio,
                    capacity_frames = active.capacity_frames,
                    "Negotiated stream format"
                );
                self.decoder = Some(decoder);
                Negotiation::Playing { previous, active }
            }
            Err(reason) => {
                staging.halt();
                tracing::warn!(
                    format = %header.format,
                    %reason,
                    "Unsupported stream format, not playing until the next format change"
                );
                Negotiation::Unsupported {
                    format: header.format,
                    reason,
                }
            }
        }
    }

    fn build(&self, header: &StreamHeader, period_frames: usize) -> Result<ChunkDecoder, String> {
        let format = header.format;
        let source_rate = format.sample_rate();
        if source_rate == 0 {
            return Err(format!("sample rate code {:#04x} has no rate", format.rate_code));
        }
        let sample_size = SampleSize::from_bits(format.sample_size)
            .ok_or_else(|| format!("{}-bit samples are not supported", format.sample_size))?;
        if format.channels == 0 {
            return Err("stream has no channels".to_string());
        }

        let channels = usize::from(format.channels);
        let chunk_frames = header.chunk_size as usize / (sample_size.bytes() * channels);
        if chunk_frames == 0 {
            return Err(format!(
                "chunk of {} bytes holds no whole frame",
                header.chunk_size
            ));
        }

        let resample = if source_rate == self.sink_rate {
            None
        } else {
            let resampler = self
                .factory
                .build(source_rate, self.sink_rate, channels, chunk_frames)
                .map_err(|e| e.to_string())?;
            let output = vec![0.0; resampler.max_output_frames() * channels];
            Some(ResampleStage {
                resampler,
                decoded: vec![0.0; chunk_frames * channels],
                output,
            })
        };

        let chunk_output_frames = resample
            .as_ref()
            .map_or(chunk_frames, |stage| stage.resampler.max_output_frames());
        let capacity_frames = self.headroom * period_frames.max(chunk_output_frames);

        Ok(ChunkDecoder {
            active: ActiveFormat {
                format,
                source_rate,
                sink_rate: self.sink_rate,
                sample_size,
                channels,
                chunk_frames,
                chunk_output_frames,
                capacity_frames,
                resample_ratio: resample.as_ref().map(|stage| stage.resampler.ratio()),
            },
            resample,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::resample::{ResampleOutput, RubatoFactory};
    use crate::format::encode_into;
    use crate::pipeline::staging_buffer;
    use crate::source::HEADER_MAGIC;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SINK_RATE: u32 = 48_000;

    fn header(rate_code: u8, sample_size: u8, channels: u8, chunk_size: u32) -> StreamHeader {
        StreamHeader {
            magic: HEADER_MAGIC,
            write_index: 0,
            chunk_offset: 64,
            max_chunks: 8,
            chunk_size,
            format: StreamFormat {
                rate_code,
                sample_size,
                channels,
                channel_map: 0x0003,
            },
        }
    }

    /// Halves the frame count by keeping every other frame.
    struct Decimate {
        channels: usize,
        chunk: usize,
    }

    impl Resampler for Decimate {
        fn ratio(&self) -> f64 {
            0.5
        }

        fn input_frames(&self) -> usize {
            self.chunk
        }

        fn max_output_frames(&self) -> usize {
            self.chunk / 2
        }

        fn process(
            &mut self,
            input: &[f32],
            output: &mut [f32],
        ) -> Result<ResampleOutput, ResampleError> {
            let frames = input.len() / self.channels;
            let mut written = 0;
            for frame in input.chunks_exact(self.channels).step_by(2) {
                output[written * self.channels..(written + 1) * self.channels]
                    .copy_from_slice(frame);
                written += 1;
            }
            Ok(ResampleOutput {
                frames_consumed: frames,
                frames_written: written,
            })
        }
    }

    fn counting_factory(builds: Arc<AtomicUsize>) -> Arc<dyn ResamplerFactory> {
        Arc::new(move |_from: u32, _to: u32, channels: usize, chunk: usize| {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Decimate { channels, chunk }) as Box<dyn Resampler>)
        })
    }

    #[test]
    fn test_native_rate_needs_no_resampler() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, counting_factory(builds.clone()));
        let (writer, _reader) = staging_buffer(256);

        // 48kHz, 16-bit stereo, 480 frames per chunk
        let Negotiation::Playing { previous, active } =
            negotiator.negotiate(&header(1, 16, 2, 1920), &writer)
        else {
            panic!("expected a playable format");
        };

        assert_eq!(previous, None);
        assert_eq!(active.chunk_frames, 480);
        assert_eq!(active.resample_ratio, None);
        assert_eq!(active.capacity_frames, 3 * 480);
        assert_eq!(builds.load(Ordering::SeqCst), 0);
        assert_eq!(writer.status().capacity_frames, 3 * 480);
    }

    #[test]
    fn test_capacity_uses_period_when_larger() {
        let factory: Arc<dyn ResamplerFactory> = Arc::new(RubatoFactory);
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, factory);
        let (writer, _reader) = staging_buffer(1024);

        negotiator.negotiate(&header(1, 32, 2, 1920), &writer);
        assert_eq!(negotiator.active().unwrap().capacity_frames, 3 * 1024);
    }

    #[test]
    fn test_44k1_family_is_resampled() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, counting_factory(builds.clone()));
        let (writer, _reader) = staging_buffer(64);

        let Negotiation::Playing { active, .. } =
            negotiator.negotiate(&header(0x81, 16, 2, 1764), &writer)
        else {
            panic!("expected a playable format");
        };

        assert_eq!(active.source_rate, 44_100);
        assert_eq!(active.resample_ratio, Some(0.5));
        assert_eq!(active.chunk_output_frames, 220);
        assert_eq!(active.capacity_frames, 3 * 220);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_renegotiating_same_format_is_a_no_op() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, counting_factory(builds.clone()));
        let (writer, _reader) = staging_buffer(4);
        let h = header(2, 16, 2, 64);

        assert!(matches!(
            negotiator.negotiate(&h, &writer),
            Negotiation::Playing { .. }
        ));
        writer.push(&[0.1; 8]);

        assert_eq!(negotiator.negotiate(&h, &writer), Negotiation::Unchanged);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        // No reallocation: the staged frames survived
        assert_eq!(writer.status().filled_frames, 4);
    }

    #[test]
    fn test_format_change_resets_staging() {
        let factory: Arc<dyn ResamplerFactory> = Arc::new(RubatoFactory);
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, factory);
        let (writer, _reader) = staging_buffer(4);

        negotiator.negotiate(&header(1, 16, 2, 64), &writer);
        writer.push(&[0.1; 16]);
        assert!(writer.status().ready);

        let mut surround = header(1, 16, 6, 192);
        surround.format.channel_map = 0x003F;
        let Negotiation::Playing { previous, .. } = negotiator.negotiate(&surround, &writer) else {
            panic!("expected a playable format");
        };

        assert_eq!(previous.map(|f| f.channels), Some(2));
        let status = writer.status();
        assert_eq!(status.filled_frames, 0);
        assert!(!status.ready);
        assert_eq!(status.channels, 6);
    }

    #[test]
    fn test_unsupported_formats() {
        let factory: Arc<dyn ResamplerFactory> = Arc::new(RubatoFactory);
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, factory);
        let (writer, _reader) = staging_buffer(4);

        for h in [
            header(0, 16, 2, 64),    // zero multiplier
            header(0x80, 16, 2, 64), // zero multiplier, 44.1k family
            header(1, 8, 2, 64),
            header(1, 20, 2, 64),
            header(1, 16, 0, 64),
            header(1, 32, 8, 16), // chunk smaller than a frame
        ] {
            assert!(
                matches!(negotiator.negotiate(&h, &writer), Negotiation::Unsupported { .. }),
                "{:?} should be unsupported",
                h.format
            );
            assert!(negotiator.decoder_mut().is_none());
            // Seeing it again is not a new transition
            assert_eq!(negotiator.negotiate(&h, &writer), Negotiation::Unchanged);
        }
    }

    #[test]
    fn test_unsupported_halts_without_clearing() {
        let factory: Arc<dyn ResamplerFactory> = Arc::new(RubatoFactory);
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, factory);
        let (writer, _reader) = staging_buffer(2);

        negotiator.negotiate(&header(1, 16, 2, 64), &writer);
        writer.push(&[0.1; 8]);

        negotiator.negotiate(&header(1, 8, 2, 64), &writer);
        let status = writer.status();
        assert!(!status.ready);
        assert_eq!(status.filled_frames, 4);
    }

    #[test]
    fn test_resampler_construction_failure_is_unsupported() {
        let factory: Arc<dyn ResamplerFactory> =
            Arc::new(|from: u32, to: u32, _: usize, _: usize| {
                Err::<Box<dyn Resampler>, _>(ResampleError::Construction {
                    from_rate: from,
                    to_rate: to,
                    reason: "not today".to_string(),
                })
            });
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, factory);
        let (writer, _reader) = staging_buffer(4);

        let Negotiation::Unsupported { reason, .. } =
            negotiator.negotiate(&header(2, 16, 2, 64), &writer)
        else {
            panic!("expected unsupported");
        };
        assert!(reason.contains("not today"));
    }

    #[test]
    fn test_deliver_decodes_into_staging() {
        let factory: Arc<dyn ResamplerFactory> = Arc::new(RubatoFactory);
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, factory);
        let (writer, mut reader) = staging_buffer(2);
        negotiator.negotiate(&header(1, 16, 2, 8), &writer);

        let mut raw = [0u8; 8];
        encode_into(&[0.5, -0.5, 0.25, -0.25], SampleSize::S16, &mut raw);
        let delivery = negotiator
            .decoder_mut()
            .unwrap()
            .deliver(&raw, &writer)
            .unwrap();
        assert_eq!(
            delivery,
            Delivery {
                frames: 2,
                staged: true,
                unconsumed: None
            }
        );

        let mut planes = crate::sink::OutputPlanes::new(2);
        crate::sink::RenderSource::render(&mut reader, &mut planes);
        assert_eq!(planes.plane(0), &[0.5, 0.25]);
        assert_eq!(planes.plane(1), &[-0.5, -0.25]);
    }

    #[test]
    fn test_deliver_through_resampler() {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut negotiator = FormatNegotiator::new(SINK_RATE, 3, counting_factory(builds));
        let (writer, _reader) = staging_buffer(2);
        // 96kHz mono, 4 frames per chunk
        let mut h = header(2, 16, 1, 8);
        h.format.channel_map = 0x0001;
        negotiator.negotiate(&h, &writer);

        let mut raw = [0u8; 8];
        encode_into(&[0.1, 0.2, 0.3, 0.4], SampleSize::S16, &mut raw);
        let delivery = negotiator
            .decoder_mut()
            .unwrap()
            .deliver(&raw, &writer)
            .unwrap();

        assert_eq!(delivery.frames, 2);
        assert!(delivery.staged);
        assert_eq!(writer.status().filled_frames, 2);
    }
}
