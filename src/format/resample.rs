//! Sample rate conversion.
//!
//! The bridge only sees the [`Resampler`] trait: one block of interleaved input
//! frames in, some interleaved output frames out. [`RubatoResampler`] is the
//! implementation used at runtime; tests can plug in their own through a
//! [`ResamplerFactory`].

use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};

use crate::ResampleError;

/// Frame counts reported by one [`Resampler::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleOutput {
    /// Input frames the resampler actually used.
    pub frames_consumed: usize,
    /// Output frames written to the output buffer.
    pub frames_written: usize,
}

/// Converts interleaved `f32` audio from one sample rate to another.
///
/// Implementations are created per stream format and own any scratch memory
/// they need, so `process` does not allocate.
pub trait Resampler: Send {
    /// Output rate divided by input rate.
    fn ratio(&self) -> f64;

    /// Input frames expected by the next `process` call.
    fn input_frames(&self) -> usize;

    /// Upper bound on the frames a single `process` call writes.
    fn max_output_frames(&self) -> usize;

    /// Resamples one block.
    ///
    /// `input` holds interleaved frames; `output` must have room for
    /// `max_output_frames()` interleaved frames.
    ///
    /// # Errors
    ///
    /// Returns [`ResampleError::Process`] if the underlying converter fails.
    fn process(&mut self, input: &[f32], output: &mut [f32])
        -> Result<ResampleOutput, ResampleError>;
}

/// Builds a [`Resampler`] for a negotiated stream format.
pub trait ResamplerFactory: Send + Sync {
    /// Creates a resampler converting `from_rate` to `to_rate` for
    /// `channels` interleaved channels, fed `chunk_frames` frames at a time.
    ///
    /// # Errors
    ///
    /// Returns [`ResampleError::Construction`] if the conversion is not supported.
    fn build(
        &self,
        from_rate: u32,
        to_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Box<dyn Resampler>, ResampleError>;
}

impl<F> ResamplerFactory for F
where
    F: Fn(u32, u32, usize, usize) -> Result<Box<dyn Resampler>, ResampleError> + Send + Sync,
{
    fn build(
        &self,
        from_rate: u32,
        to_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Box<dyn Resampler>, ResampleError> {
        self(from_rate, to_rate, channels, chunk_frames)
    }
}

/// Factory producing [`RubatoResampler`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RubatoFactory;

impl ResamplerFactory for RubatoFactory {
    fn build(
        &self,
        from_rate: u32,
        to_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Box<dyn Resampler>, ResampleError> {
        Ok(Box::new(RubatoResampler::new(
            from_rate,
            to_rate,
            channels,
            chunk_frames,
        )?))
    }
}

/// Polynomial resampler backed by `rubato::FastFixedIn`.
///
/// Takes a fixed number of input frames per call (one shared-memory chunk),
/// which matches how the producer delivers audio.
pub struct RubatoResampler {
    inner: FastFixedIn<f32>,
    ratio: f64,
    channels: usize,
    planar_in: Vec<Vec<f32>>,
    planar_out: Vec<Vec<f32>>,
}

impl RubatoResampler {
    /// Creates a resampler for `channels` channels and `chunk_frames`-frame blocks.
    ///
    /// # Errors
    ///
    /// Returns [`ResampleError::Construction`] for zero rates, zero channels,
    /// or a ratio rubato rejects.
    pub fn new(
        from_rate: u32,
        to_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Self, ResampleError> {
        let construction = |reason: String| ResampleError::Construction {
            from_rate,
            to_rate,
            reason,
        };

        if from_rate == 0 || to_rate == 0 {
            return Err(construction("sample rate is zero".to_string()));
        }
        if channels == 0 || chunk_frames == 0 {
            return Err(construction("empty chunk".to_string()));
        }

        let ratio = f64::from(to_rate) / f64::from(from_rate);
        let inner = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio for the lifetime of a format
            PolynomialDegree::Septic,
            chunk_frames,
            channels,
        )
        .map_err(|e| construction(e.to_string()))?;

        let planar_in = vec![vec![0.0; chunk_frames]; channels];
        let planar_out = vec![vec![0.0; inner.output_frames_max()]; channels];

        tracing::debug!(
            from_rate,
            to_rate,
            channels,
            chunk_frames,
            max_out = inner.output_frames_max(),
            "Created rubato resampler"
        );

        Ok(Self {
            inner,
            ratio,
            channels,
            planar_in,
            planar_out,
        })
    }
}

impl Resampler for RubatoResampler {
    fn ratio(&self) -> f64 {
        self.ratio
    }

    fn input_frames(&self) -> usize {
        self.inner.input_frames_next()
    }

    fn max_output_frames(&self) -> usize {
        self.inner.output_frames_max()
    }

    fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
    ) -> Result<ResampleOutput, ResampleError> {
        let needed = self.inner.input_frames_next();
        let channels = self.channels;

        // Deinterleave; a short block is padded with silence
        for (ch, plane) in self.planar_in.iter_mut().enumerate() {
            plane.resize(needed, 0.0);
            plane.fill(0.0);
            for (out, frame) in plane.iter_mut().zip(input.chunks_exact(channels)) {
                *out = frame[ch];
            }
        }

        let (frames_consumed, produced) = self
            .inner
            .process_into_buffer(
                self.planar_in.as_slice(),
                self.planar_out.as_mut_slice(),
                None,
            )
            .map_err(|e| ResampleError::process(e.to_string()))?;

        let frames_written = produced.min(output.len() / channels);
        for (f, frame) in output
            .chunks_exact_mut(channels)
            .take(frames_written)
            .enumerate()
        {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = self.planar_out[ch][f];
            }
        }

        Ok(ResampleOutput {
            frames_consumed,
            frames_written,
        })
    }
}
