//! Staging buffer shared by the bridge task and the audio callback.
//!
//! The bridge task appends decoded frames through a [`StagingWriter`]; the
//! audio callback drains them through a [`StagingReader`]. Both sides only
//! touch the buffer inside a short spin-locked critical section.
//!
//! Invariants, all maintained under the lock:
//! - `filled <= capacity_frames`
//! - `ready` is set only once `filled >= period_frames` and cleared as soon as
//!   a render leaves less than a period behind
//! - storage is only replaced together with `filled = 0` and `ready = false`

use std::sync::Arc;

use super::spin::{lock_spinning, SpinMutex};
use crate::format::ChannelRouting;
use crate::sink::{OutputPlanes, RenderOutcome, RenderSource};

struct StagingState {
    samples: Vec<f32>,
    channels: usize,
    capacity_frames: usize,
    filled: usize,
    ready: bool,
    routing: ChannelRouting,
}

struct Shared {
    period_frames: usize,
    state: SpinMutex<StagingState>,
}

/// Point-in-time view of the staging buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingStatus {
    /// Interleaved channels per frame.
    pub channels: usize,
    /// Frames the buffer can hold.
    pub capacity_frames: usize,
    /// Frames currently staged.
    pub filled_frames: usize,
    /// Whether the reader is allowed to play.
    pub ready: bool,
}

/// Creates an empty staging buffer for a sink that renders `period_frames` per call.
///
/// The buffer holds no storage until [`StagingWriter::reconfigure`] is called;
/// until then every render is an underrun.
pub fn staging_buffer(period_frames: usize) -> (StagingWriter, StagingReader) {
    let shared = Arc::new(Shared {
        period_frames,
        state: SpinMutex::new(StagingState {
            samples: Vec::new(),
            channels: 0,
            capacity_frames: 0,
            filled: 0,
            ready: false,
            routing: ChannelRouting::default(),
        }),
    });

    (
        StagingWriter {
            shared: Arc::clone(&shared),
        },
        StagingReader { shared },
    )
}

fn status_of(state: &StagingState) -> StagingStatus {
    StagingStatus {
        channels: state.channels,
        capacity_frames: state.capacity_frames,
        filled_frames: state.filled,
        ready: state.ready,
    }
}

/// Producer half of the staging buffer, owned by the bridge task.
pub struct StagingWriter {
    shared: Arc<Shared>,
}

impl StagingWriter {
    /// Frames the sink renders per call.
    pub fn period_frames(&self) -> usize {
        self.shared.period_frames
    }

    /// Replaces the storage for a new stream format.
    ///
    /// The new storage is allocated before the lock is taken and the old one
    /// is freed after it is released; only the swap and the reset of
    /// `filled`/`ready` happen inside the critical section.
    pub fn reconfigure(&self, channels: usize, capacity_frames: usize, routing: ChannelRouting) {
        let mut storage = vec![0.0f32; channels * capacity_frames];

        {
            let mut state = self.shared.state.lock();
            std::mem::swap(&mut state.samples, &mut storage);
            state.channels = channels;
            state.capacity_frames = capacity_frames;
            state.filled = 0;
            state.ready = false;
            state.routing = routing;
        }

        drop(storage);
    }

    /// Stops playback without discarding staged frames.
    pub fn halt(&self) {
        self.shared.state.lock().ready = false;
    }

    /// Appends `frames` frames written in place by `fill`.
    ///
    /// `fill` receives exactly `frames * channels` interleaved samples at the
    /// end of the staged data and runs while the lock is held, so it must be
    /// a plain copy or decode. If the buffer lacks room for all of them the
    /// chunk is dropped: `fill` is not called, nothing changes, and `false` is
    /// returned.
    pub fn push_with<F>(&self, frames: usize, fill: F) -> bool
    where
        F: FnOnce(&mut [f32]),
    {
        let mut state = self.shared.state.lock();
        if state.channels == 0 || state.capacity_frames - state.filled < frames {
            return false;
        }

        let start = state.filled * state.channels;
        let end = start + frames * state.channels;
        fill(&mut state.samples[start..end]);

        state.filled += frames;
        if state.filled >= self.shared.period_frames {
            state.ready = true;
        }
        true
    }

    /// Appends whole interleaved frames from `interleaved`.
    ///
    /// Trailing samples that do not form a whole frame are ignored. Returns
    /// `false` if the frames were dropped for lack of room.
    pub fn push(&self, interleaved: &[f32]) -> bool {
        let channels = self.shared.state.lock().channels;
        if channels == 0 {
            return false;
        }
        let frames = interleaved.len() / channels;
        self.push_with(frames, |dst| {
            let n = dst.len().min(interleaved.len());
            dst[..n].copy_from_slice(&interleaved[..n]);
        })
    }

    /// Current fill state.
    pub fn status(&self) -> StagingStatus {
        status_of(&self.shared.state.lock())
    }
}

/// Consumer half of the staging buffer, owned by the audio callback.
pub struct StagingReader {
    shared: Arc<Shared>,
}

impl StagingReader {
    /// Current fill state.
    pub fn status(&self) -> StagingStatus {
        status_of(&self.shared.state.lock())
    }
}

impl RenderSource for StagingReader {
    fn render(&mut self, outputs: &mut OutputPlanes) -> RenderOutcome {
        let frames = outputs.frames();
        let mut state = lock_spinning(&self.shared.state);

        if !state.ready || state.filled < frames {
            drop(state);
            outputs.silence();
            return RenderOutcome::Underrun;
        }

        let channels = state.channels;
        let used = frames * channels;
        let staged = state.filled * channels;
        state.routing.demux(&state.samples[..used], outputs);

        // Left-compact what remains
        state.samples.copy_within(used..staged, 0);
        state.filled -= frames;
        if state.filled < self.shared.period_frames {
            state.ready = false;
        }

        RenderOutcome::Played
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CANONICAL_CHANNELS;

    fn stereo(period: usize, capacity: usize) -> (StagingWriter, StagingReader) {
        let (writer, reader) = staging_buffer(period);
        writer.reconfigure(2, capacity, ChannelRouting::new(0x0003, 2));
        (writer, reader)
    }

    /// Interleaved stereo frames where left = n and right = -n.
    fn frames(range: std::ops::Range<usize>) -> Vec<f32> {
        range
            .flat_map(|n| [n as f32, -(n as f32)])
            .collect()
    }

    #[test]
    fn test_empty_buffer_underruns() {
        let (writer, mut reader) = staging_buffer(4);
        assert!(!writer.push(&[0.5, 0.5]));

        let mut planes = OutputPlanes::new(4);
        planes.plane_mut(0).fill(1.0);
        assert_eq!(reader.render(&mut planes), RenderOutcome::Underrun);
        assert!(planes.plane(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_ready_after_one_period() {
        let (writer, _reader) = stereo(4, 12);

        assert!(writer.push(&frames(0..3)));
        assert!(!writer.status().ready);

        assert!(writer.push(&frames(3..4)));
        let status = writer.status();
        assert!(status.ready);
        assert_eq!(status.filled_frames, 4);
    }

    #[test]
    fn test_full_buffer_drops_chunk() {
        let (writer, _reader) = stereo(2, 6);
        assert!(writer.push(&frames(0..4)));

        let mut called = false;
        let accepted = writer.push_with(3, |_| called = true);
        assert!(!accepted);
        assert!(!called);
        assert_eq!(writer.status().filled_frames, 4);

        // A smaller chunk still fits
        assert!(writer.push(&frames(4..6)));
        assert_eq!(writer.status().filled_frames, 6);
    }

    #[test]
    fn test_underrun_when_not_ready_outputs_silence() {
        let (writer, mut reader) = stereo(4, 12);
        writer.push(&frames(1..3));

        let mut planes = OutputPlanes::new(4);
        for slot in 0..CANONICAL_CHANNELS {
            planes.plane_mut(slot).fill(0.7);
        }

        assert_eq!(reader.render(&mut planes), RenderOutcome::Underrun);
        for slot in 0..CANONICAL_CHANNELS {
            assert!(planes.plane(slot).iter().all(|&s| s == 0.0));
        }
        // Nothing was consumed
        assert_eq!(reader.status().filled_frames, 2);
    }

    #[test]
    fn test_render_left_compacts_remaining_frames() {
        let (writer, mut reader) = stereo(2, 8);
        writer.push(&frames(0..5));

        let mut planes = OutputPlanes::new(2);
        assert_eq!(reader.render(&mut planes), RenderOutcome::Played);
        assert_eq!(planes.plane(0), &[0.0, 1.0]);
        assert_eq!(planes.plane(1), &[-0.0, -1.0]);

        assert_eq!(reader.render(&mut planes), RenderOutcome::Played);
        assert_eq!(planes.plane(0), &[2.0, 3.0]);

        // One frame left, below a period
        let status = reader.status();
        assert_eq!(status.filled_frames, 1);
        assert!(!status.ready);
        assert_eq!(reader.render(&mut planes), RenderOutcome::Underrun);

        writer.push(&frames(5..6));
        assert_eq!(reader.render(&mut planes), RenderOutcome::Played);
        assert_eq!(planes.plane(0), &[4.0, 5.0]);
    }

    #[test]
    fn test_reconfigure_resets_fill_state() {
        let (writer, reader) = stereo(2, 8);
        writer.push(&frames(0..4));
        assert!(writer.status().ready);

        writer.reconfigure(6, 16, ChannelRouting::new(0x003F, 6));

        let status = reader.status();
        assert_eq!(status.filled_frames, 0);
        assert!(!status.ready);
        assert_eq!(status.channels, 6);
        assert_eq!(status.capacity_frames, 16);
    }

    #[test]
    fn test_halt_keeps_frames() {
        let (writer, mut reader) = stereo(2, 8);
        writer.push(&frames(0..4));
        writer.halt();

        let mut planes = OutputPlanes::new(2);
        assert_eq!(reader.render(&mut planes), RenderOutcome::Underrun);
        assert_eq!(reader.status().filled_frames, 4);
    }

    #[test]
    fn test_render_routes_through_channel_map() {
        let (writer, mut reader) = staging_buffer(1);
        // Mono routed to front center
        writer.reconfigure(1, 4, ChannelRouting::new(0x0004, 1));
        writer.push(&[0.25, 0.5]);

        let mut planes = OutputPlanes::new(2);
        assert_eq!(reader.render(&mut planes), RenderOutcome::Played);
        assert_eq!(planes.plane(2), &[0.25, 0.5]);
        assert_eq!(planes.plane(0), &[0.0, 0.0]);
    }

    #[test]
    fn test_concurrent_render_preserves_order() {
        let (writer, mut reader) = stereo(16, 64);

        let producer = std::thread::spawn(move || {
            let mut next = 0usize;
            while next < 4_096 {
                if writer.push(&frames(next..next + 8)) {
                    next += 8;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let mut planes = OutputPlanes::new(16);
        let mut expected = 0.0f32;
        while expected < 4_096.0 {
            if reader.render(&mut planes) == RenderOutcome::Played {
                for &sample in planes.plane(0) {
                    assert_eq!(sample, expected);
                    expected += 1.0;
                }
            } else {
                std::thread::yield_now();
                if producer.is_finished() && reader.status().filled_frames < 16 {
                    break;
                }
            }
        }

        producer.join().unwrap();
        // Whatever was not rendered is still staged, in order
        assert_eq!(
            expected as usize + reader.status().filled_frames,
            4_096
        );
    }
}
