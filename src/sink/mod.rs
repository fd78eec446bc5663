//! Real-time audio sink side.
//!
//! The sink pulls audio on its own clock: once per period it hands the
//! [`RenderSource`] a set of [`OutputPlanes`], one per canonical speaker slot,
//! and expects every plane to be fully written before the call returns.
//!
//! [`CpalOutput`] is the built-in sink. Tests drive a [`RenderSource`]
//! directly with their own planes.
//!
//! # Implementation Notes
//!
//! - `render` runs on the audio thread: no allocation, no I/O, no sleeping
//! - Planes are allocated once, up front, for the largest block the sink will request
//! - Underruns are reported through the return value, never by logging

mod cpal_output;
mod report;

pub use cpal_output::{CpalOutput, OutputStream};
pub use report::{RenderNote, ReportingSource};

use crate::format::CANONICAL_CHANNELS;

/// Per-slot output buffers for one render call.
///
/// Holds [`CANONICAL_CHANNELS`] planes of `max_frames` samples each. Only the
/// first [`frames()`](Self::frames) samples of each plane are visible through
/// [`plane`](Self::plane) and [`plane_mut`](Self::plane_mut).
#[derive(Debug, Clone)]
pub struct OutputPlanes {
    planes: [Vec<f32>; CANONICAL_CHANNELS],
    max_frames: usize,
    frames: usize,
}

impl OutputPlanes {
    /// Allocates planes able to hold `max_frames` frames.
    ///
    /// The active frame count starts at `max_frames`.
    pub fn new(max_frames: usize) -> Self {
        Self {
            planes: std::array::from_fn(|_| vec![0.0; max_frames]),
            max_frames,
            frames: max_frames,
        }
    }

    /// Capacity of each plane in frames.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Number of frames the current render call must produce.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Sets the active frame count, clamped to [`max_frames`](Self::max_frames).
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.max_frames);
    }

    /// Active samples of slot `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= CANONICAL_CHANNELS`.
    pub fn plane(&self, slot: usize) -> &[f32] {
        &self.planes[slot][..self.frames]
    }

    /// Mutable active samples of slot `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= CANONICAL_CHANNELS`.
    pub fn plane_mut(&mut self, slot: usize) -> &mut [f32] {
        &mut self.planes[slot][..self.frames]
    }

    /// Zero-fills the active frames of every slot.
    pub fn silence(&mut self) {
        let frames = self.frames;
        for plane in &mut self.planes {
            plane[..frames].fill(0.0);
        }
    }

    /// Interleaves the first `channels` slots into `out`.
    ///
    /// `out` is read as frames of `stride` samples; device channels from
    /// `channels` up to `stride` are silenced. Writes at most
    /// [`frames()`](Self::frames) frames and returns how many were written.
    pub fn interleave_into(&self, out: &mut [f32], stride: usize, channels: usize) -> usize {
        if stride == 0 {
            return 0;
        }
        let channels = channels.min(stride).min(CANONICAL_CHANNELS);
        let mut written = 0;
        for (f, frame) in out.chunks_exact_mut(stride).take(self.frames).enumerate() {
            for (slot, sample) in frame.iter_mut().enumerate() {
                *sample = if slot < channels {
                    self.planes[slot][f]
                } else {
                    0.0
                };
            }
            written += 1;
        }
        written
    }
}

/// Result of one render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Real audio was written to the planes.
    Played,
    /// Not enough audio was buffered; the planes hold silence.
    Underrun,
}

/// Something the real-time sink can pull audio from.
///
/// Implemented by [`StagingReader`](crate::pipeline::StagingReader).
pub trait RenderSource: Send {
    /// Fills the first `outputs.frames()` samples of every plane.
    ///
    /// Must not block, allocate, or log.
    fn render(&mut self, outputs: &mut OutputPlanes) -> RenderOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32);

    impl RenderSource for Constant {
        fn render(&mut self, outputs: &mut OutputPlanes) -> RenderOutcome {
            for slot in 0..CANONICAL_CHANNELS {
                outputs.plane_mut(slot).fill(self.0);
            }
            RenderOutcome::Played
        }
    }

    #[test]
    fn test_set_frames_is_clamped() {
        let mut planes = OutputPlanes::new(8);
        planes.set_frames(100);
        assert_eq!(planes.frames(), 8);
        planes.set_frames(3);
        assert_eq!(planes.plane(5).len(), 3);
    }

    #[test]
    fn test_silence_clears_active_frames() {
        let mut planes = OutputPlanes::new(4);
        Constant(0.5).render(&mut planes);
        planes.silence();
        for slot in 0..CANONICAL_CHANNELS {
            assert!(planes.plane(slot).iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_interleave_silences_extra_device_channels() {
        let mut planes = OutputPlanes::new(2);
        planes.plane_mut(0).copy_from_slice(&[0.1, 0.2]);
        planes.plane_mut(1).copy_from_slice(&[0.3, 0.4]);
        planes.plane_mut(2).copy_from_slice(&[0.9, 0.9]);

        // Device with 3 channels, but only 2 slots routed to it
        let mut out = [7.0f32; 6];
        assert_eq!(planes.interleave_into(&mut out, 3, 2), 2);
        assert_eq!(out, [0.1, 0.3, 0.0, 0.2, 0.4, 0.0]);
    }

    #[test]
    fn test_interleave_stops_at_shorter_side() {
        let planes = OutputPlanes::new(4);
        let mut out = [1.0f32; 4];
        // Room for two stereo frames only
        assert_eq!(planes.interleave_into(&mut out, 2, 2), 2);
        assert_eq!(planes.interleave_into(&mut out, 0, 2), 0);
    }

    #[test]
    fn test_render_source_is_object_safe() {
        let mut source: Box<dyn RenderSource> = Box::new(Constant(0.25));
        let mut planes = OutputPlanes::new(2);
        assert_eq!(source.render(&mut planes), RenderOutcome::Played);
        assert_eq!(planes.plane(10), &[0.25, 0.25]);
    }
}
