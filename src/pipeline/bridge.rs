//! Bridge task - polls the shared ring, negotiates formats, stages audio for the sink.
//!
//! The task owns the non-real-time half of the bridge:
//! - Polling the ring reader at a fixed interval
//! - Renegotiating the format whenever a chunk's header changes it
//! - Decoding (and resampling) chunks into the staging buffer
//! - Turning underrun notes from the audio callback into stats, logs and events

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::Consumer;
use ringbuf::HeapCons;
use tokio::time::MissedTickBehavior;

use super::staging::StagingWriter;
use crate::event::EventCallback;
use crate::format::{FormatNegotiator, Negotiation};
use crate::session::SessionState;
use crate::sink::RenderNote;
use crate::source::{ChunkRef, ReaderPoll, RingReader, SharedRegion};
use crate::{BridgeError, BridgeEvent};

/// Consumed chunks between progress logs.
const PROGRESS_EVERY: u64 = 500;

/// What a single [`BridgeTask::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// The producer has not initialized the ring.
    NotReady,
    /// The cursor was synced to the producer.
    Resynced,
    /// No new chunk.
    Idle,
    /// A chunk was handled (staged, dropped or skipped).
    Chunk,
}

/// The bridge task: moves chunks from the shared ring into the staging buffer.
pub(crate) struct BridgeTask<R> {
    reader: RingReader<R>,
    negotiator: FormatNegotiator,
    staging: StagingWriter,
    notes: HeapCons<RenderNote>,
    state: Arc<SessionState>,
    poll_interval: Duration,
    event_callback: Option<EventCallback>,
    /// Scratch for the raw bytes of one chunk.
    chunk_bytes: Vec<u8>,
    producer_present: bool,
    out_of_bounds_run: bool,
}

impl<R: SharedRegion> BridgeTask<R> {
    pub fn new(
        reader: RingReader<R>,
        negotiator: FormatNegotiator,
        staging: StagingWriter,
        notes: HeapCons<RenderNote>,
        state: Arc<SessionState>,
        poll_interval: Duration,
        event_callback: Option<EventCallback>,
    ) -> Self {
        tracing::info!(
            region_len = reader.region().len(),
            sink_rate = negotiator.sink_rate(),
            period = staging.period_frames(),
            poll = ?poll_interval,
            "Bridge task created"
        );

        Self {
            reader,
            negotiator,
            staging,
            notes,
            state,
            poll_interval,
            event_callback,
            chunk_bytes: Vec::new(),
            producer_present: false,
            out_of_bounds_run: false,
        }
    }

    /// Runs the bridge loop until the session stops.
    ///
    /// Each tick drains every chunk the producer has completed, then waits
    /// for the next tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the resampler fails. The session stops with it.
    pub async fn run(mut self) -> Result<(), BridgeError> {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.state.is_running() {
            interval.tick().await;

            if let Err(e) = self.drain_ready() {
                tracing::error!(error = %e, "Bridge stopped on a fatal error");
                self.state.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        self.drain_notes();
        tracing::info!(stats = ?self.state.stats(), "Bridge stopped");
        Ok(())
    }

    /// Handles the chunks that are ready right now, at most one ring's worth.
    ///
    /// Returns the number of chunks handled.
    fn drain_ready(&mut self) -> Result<usize, BridgeError> {
        let limit = self
            .reader
            .header()
            .map_or(1, |header| usize::from(header.max_chunks).max(1));

        let mut handled = 0;
        while handled < limit && self.state.is_running() {
            if self.step()? != Step::Chunk {
                break;
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Polls the ring once and handles what it reports.
    pub fn step(&mut self) -> Result<Step, BridgeError> {
        self.drain_notes();

        match self.reader.poll() {
            ReaderPoll::NotReady => {
                if self.producer_present {
                    self.producer_present = false;
                    tracing::warn!("Producer stopped, waiting for it to come back");
                }
                Ok(Step::NotReady)
            }
            ReaderPoll::Resynced {
                write_index,
                after_reset,
            } => {
                self.producer_present = true;
                if after_reset {
                    self.state.producer_resets.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(write_index, "Producer restarted, skipping its backlog");
                    self.emit_event(BridgeEvent::ProducerReset { write_index });
                } else {
                    tracing::info!(write_index, "Producer found");
                }
                Ok(Step::Resynced)
            }
            ReaderPoll::Idle => Ok(Step::Idle),
            ReaderPoll::Chunk(chunk) => {
                self.consume(&chunk)?;
                Ok(Step::Chunk)
            }
        }
    }

    fn consume(&mut self, chunk: &ChunkRef) -> Result<(), BridgeError> {
        // Checked before negotiating: buffers are sized from the header's chunk size
        let region_len = self.reader.region().len();
        let fits = chunk
            .start
            .checked_add(chunk.len)
            .is_some_and(|end| end <= region_len);
        if !fits {
            self.skip_out_of_bounds(chunk, region_len);
            return Ok(());
        }

        self.renegotiate(chunk);

        // Consumed without decoding while the format is unplayable
        if self.negotiator.decoder_mut().is_none() {
            self.state.chunks_skipped.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        self.chunk_bytes.resize(chunk.len, 0);
        if !self.reader.read_chunk(chunk, &mut self.chunk_bytes) {
            self.skip_out_of_bounds(chunk, region_len);
            return Ok(());
        }
        self.out_of_bounds_run = false;

        let Some(decoder) = self.negotiator.decoder_mut() else {
            return Ok(());
        };
        let delivery = decoder.deliver(&self.chunk_bytes, &self.staging)?;

        if let Some(unconsumed) = delivery.unconsumed {
            tracing::warn!(
                index = chunk.index,
                unconsumed,
                "Resampler did not consume the whole chunk"
            );
            self.emit_event(BridgeEvent::PartialResample {
                index: chunk.index,
                unconsumed,
            });
        }

        if delivery.staged {
            let consumed = self.state.chunks_consumed.fetch_add(1, Ordering::SeqCst) + 1;
            if consumed % PROGRESS_EVERY == 0 {
                tracing::debug!(
                    consumed,
                    staged = ?self.staging.status(),
                    "Bridge progress"
                );
            }
        } else {
            self.state.chunks_dropped.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                index = chunk.index,
                frames = delivery.frames,
                "Staging buffer full, dropped chunk"
            );
            self.emit_event(BridgeEvent::ChunkDropped {
                index: chunk.index,
                frames: delivery.frames,
            });
        }

        Ok(())
    }

    fn renegotiate(&mut self, chunk: &ChunkRef) {
        match self.negotiator.negotiate(&chunk.header, &self.staging) {
            Negotiation::Unchanged => {}
            Negotiation::Playing { previous, active } => {
                self.state.format_changes.fetch_add(1, Ordering::SeqCst);
                self.emit_event(BridgeEvent::FormatChanged {
                    previous,
                    current: active.format,
                    sink_rate: active.sink_rate,
                    resampling: active.resample_ratio.is_some(),
                });
            }
            Negotiation::Unsupported { format, reason } => {
                self.state.format_changes.fetch_add(1, Ordering::SeqCst);
                self.emit_event(BridgeEvent::FormatUnsupported { format, reason });
            }
        }
    }

    fn skip_out_of_bounds(&mut self, chunk: &ChunkRef, region_len: usize) {
        self.state.chunks_skipped.fetch_add(1, Ordering::SeqCst);
        if !self.out_of_bounds_run {
            self.out_of_bounds_run = true;
            tracing::warn!(
                index = chunk.index,
                start = chunk.start,
                len = chunk.len,
                region_len,
                "Chunk lies outside the shared region, skipping"
            );
        }
        self.emit_event(BridgeEvent::ChunkOutOfBounds {
            index: chunk.index,
            start: chunk.start,
            len: chunk.len,
            region_len,
        });
    }

    /// Turns underrun notes from the audio callback into stats and events.
    fn drain_notes(&mut self) {
        while let Some(note) = self.notes.try_pop() {
            match note {
                RenderNote::Underrun => {
                    let total = self.state.underruns.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::warn!(total, "Output underrun");
                    self.emit_event(BridgeEvent::Underrun { total });
                }
                RenderNote::Recovered => {
                    tracing::info!("Output recovered from underrun");
                    self.emit_event(BridgeEvent::Recovered);
                }
            }
        }
    }

    /// Emits an event via the callback if registered.
    fn emit_event(&self, event: BridgeEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }
}

/// Spawns the bridge task onto the current tokio runtime.
pub(crate) fn spawn_bridge<R>(task: BridgeTask<R>) -> tokio::task::JoinHandle<Result<(), BridgeError>>
where
    R: SharedRegion + 'static,
{
    tokio::spawn(task.run())
}
