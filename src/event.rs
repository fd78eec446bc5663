//! Runtime events for monitoring bridge health.
//!
//! Events are non-fatal notifications. The bridge keeps running after any of
//! them is emitted; they exist for logging, metrics and UI, not error handling.

use std::sync::Arc;

use crate::source::StreamFormat;

/// Runtime events emitted while bridging.
///
/// # Example
///
/// ```
/// use shm_audio_bridge::BridgeEvent;
///
/// fn handle_event(event: BridgeEvent) {
///     match event {
///         BridgeEvent::FormatChanged { current, resampling, .. } => {
///             eprintln!("Now playing {current} (resampling: {resampling})");
///         }
///         BridgeEvent::FormatUnsupported { format, reason } => {
///             eprintln!("Cannot play {format}: {reason}");
///         }
///         BridgeEvent::Underrun { total } => {
///             eprintln!("Underrun #{total}");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A new stream format was negotiated and playback restarted with it.
    FormatChanged {
        /// Format seen before, if any.
        previous: Option<StreamFormat>,
        /// Format now playing.
        current: StreamFormat,
        /// Rate the sink plays at.
        sink_rate: u32,
        /// Whether chunks are resampled on their way to the sink.
        resampling: bool,
    },

    /// The producer switched to a format that cannot be played.
    ///
    /// Chunks are skipped until the format changes again.
    FormatUnsupported {
        /// The rejected format.
        format: StreamFormat,
        /// Why it was rejected.
        reason: String,
    },

    /// The producer went away (invalid header) and came back.
    ///
    /// The read cursor jumped to the producer's write index; anything
    /// written in between was skipped.
    ProducerReset {
        /// Write index the cursor resumed at.
        write_index: u16,
    },

    /// A chunk was discarded because the staging buffer was full.
    ///
    /// Happens when the producer runs ahead of the sink for longer than the
    /// staging headroom covers.
    ChunkDropped {
        /// Ring index of the discarded chunk.
        index: u16,
        /// Frames lost.
        frames: usize,
    },

    /// A chunk's advertised location lies outside the shared region.
    ChunkOutOfBounds {
        /// Ring index of the chunk.
        index: u16,
        /// Advertised byte offset.
        start: usize,
        /// Advertised length in bytes.
        len: usize,
        /// Actual size of the region.
        region_len: usize,
    },

    /// The resampler did not consume a whole chunk.
    PartialResample {
        /// Ring index of the chunk.
        index: u16,
        /// Source frames left unconsumed.
        unconsumed: usize,
    },

    /// The sink ran out of staged audio after having played.
    Underrun {
        /// Underruns seen in this session, including this one.
        total: u64,
    },

    /// The sink is playing again after an [`Underrun`](BridgeEvent::Underrun).
    Recovered,
}

/// Callback type for receiving runtime events.
///
/// Register one via [`BridgeBuilder::on_event()`]. The callback runs on the
/// bridge task, never on the audio thread, but it should still return quickly.
///
/// [`BridgeBuilder::on_event()`]: crate::BridgeBuilder::on_event
pub type EventCallback = Arc<dyn Fn(BridgeEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use shm_audio_bridge::{event_callback, BridgeEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(BridgeEvent::Recovered);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(BridgeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_event_debug() {
        let event = BridgeEvent::ChunkDropped {
            index: 7,
            frames: 480,
        };
        let debug = format!("{:?}", event);
        assert!(debug.contains("ChunkDropped"));
        assert!(debug.contains("480"));
    }

    #[test]
    fn test_bridge_event_clone() {
        let event = BridgeEvent::FormatUnsupported {
            format: StreamFormat::default(),
            reason: "8-bit samples are not supported".to_string(),
        };
        let cloned = event.clone();
        assert_eq!(cloned, event);
        if let BridgeEvent::FormatUnsupported { reason, .. } = cloned {
            assert!(reason.starts_with("8-bit"));
        } else {
            panic!("Expected FormatUnsupported variant");
        }
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(BridgeEvent::Underrun { total: 1 });
        assert!(called.load(Ordering::SeqCst));
    }
}
