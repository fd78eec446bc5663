//! Underrun reporting out of the audio callback.

use ringbuf::traits::Producer;
use ringbuf::HeapProd;

use super::{OutputPlanes, RenderOutcome, RenderSource};

/// Playback transition observed by the audio callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderNote {
    /// Playback ran dry after having played audio.
    Underrun,
    /// Playback resumed after an underrun.
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playback {
    /// Nothing has played yet; silence here is expected, not an underrun.
    Waiting,
    Playing,
    Starved,
}

/// Wraps a [`RenderSource`] and reports playback transitions.
///
/// Each transition is pushed once into a lock-free queue that the bridge
/// task drains; a full queue drops the note rather than block the callback.
pub struct ReportingSource<S> {
    inner: S,
    notes: HeapProd<RenderNote>,
    playback: Playback,
}

impl<S: RenderSource> ReportingSource<S> {
    /// Wraps `inner`, reporting into `notes`.
    pub fn new(inner: S, notes: HeapProd<RenderNote>) -> Self {
        Self {
            inner,
            notes,
            playback: Playback::Waiting,
        }
    }

    fn observe(&mut self, outcome: RenderOutcome) -> Option<RenderNote> {
        let (next, note) = match (self.playback, outcome) {
            (Playback::Waiting, RenderOutcome::Played) => (Playback::Playing, None),
            (Playback::Playing, RenderOutcome::Underrun) => {
                (Playback::Starved, Some(RenderNote::Underrun))
            }
            (Playback::Starved, RenderOutcome::Played) => {
                (Playback::Playing, Some(RenderNote::Recovered))
            }
            (state, _) => (state, None),
        };
        self.playback = next;
        note
    }
}

impl<S: RenderSource> RenderSource for ReportingSource<S> {
    fn render(&mut self, outputs: &mut OutputPlanes) -> RenderOutcome {
        let outcome = self.inner.render(outputs);
        if let Some(note) = self.observe(outcome) {
            let _ = self.notes.try_push(note);
        }
        outcome
    }
}
