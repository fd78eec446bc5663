//! Bridge session management.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::sink::OutputStream;
use crate::BridgeError;

/// Statistics about a bridge session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Chunks decoded and staged.
    pub chunks_consumed: u64,
    /// Chunks discarded because the staging buffer was full.
    pub chunks_dropped: u64,
    /// Chunks passed over without decoding (unsupported format or out of bounds).
    pub chunks_skipped: u64,
    /// Stream formats negotiated, playable or not.
    pub format_changes: u64,
    /// Times the sink ran dry after having played.
    pub underruns: u64,
    /// Times the producer went away and came back.
    pub producer_resets: u64,
}

/// Internal state shared between Session, the bridge task and the output stream.
pub(crate) struct SessionState {
    pub running: Arc<AtomicBool>,
    pub chunks_consumed: AtomicU64,
    pub chunks_dropped: AtomicU64,
    pub chunks_skipped: AtomicU64,
    pub format_changes: AtomicU64,
    pub underruns: AtomicU64,
    pub producer_resets: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            chunks_consumed: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
            chunks_skipped: AtomicU64::new(0),
            format_changes: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            producer_resets: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            chunks_consumed: self.chunks_consumed.load(Ordering::SeqCst),
            chunks_dropped: self.chunks_dropped.load(Ordering::SeqCst),
            chunks_skipped: self.chunks_skipped.load(Ordering::SeqCst),
            format_changes: self.format_changes.load(Ordering::SeqCst),
            underruns: self.underruns.load(Ordering::SeqCst),
            producer_resets: self.producer_resets.load(Ordering::SeqCst),
        }
    }
}

/// Cloneable handle that asks a running session to stop.
///
/// Useful where the [`Session`] itself is busy in [`Session::wait()`], e.g. a
/// Ctrl-C handler.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Requests shutdown. The bridge task exits at its next poll.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns `true` once shutdown has been requested or the session ended.
    pub fn is_shutdown(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

/// Handle to a running bridge session.
///
/// The `Session` is returned by [`BridgeBuilder::start()`] and represents an
/// active bridge: a background task polling the shared region and, unless
/// started headless, an output stream playing the staged audio.
///
/// # Lifecycle
///
/// 1. Created by [`BridgeBuilder::start()`]
/// 2. Audio is bridged in the background
/// 3. Call [`stop()`](Session::stop), or trigger a [`ShutdownHandle`] and
///    [`wait()`](Session::wait)
/// 4. Dropping the `Session` also stops the bridge
///
/// # Example
///
/// ```ignore
/// let session = AudioBridge::builder()
///     .shm_path("/dev/shm/scream-ivshmem")
///     .start()
///     .await?;
///
/// let shutdown = session.shutdown_handle();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     shutdown.shutdown();
/// });
///
/// session.wait().await?;
/// ```
///
/// [`BridgeBuilder::start()`]: crate::BridgeBuilder::start
pub struct Session {
    state: Arc<SessionState>,
    bridge_handle: Option<JoinHandle<Result<(), BridgeError>>>,
    // Keep the output stream alive - dropping it stops CPAL
    _output: Option<OutputStream>,
}

impl Session {
    /// Creates a new session with the given handles.
    pub(crate) fn new(
        state: Arc<SessionState>,
        bridge_handle: JoinHandle<Result<(), BridgeError>>,
        output: Option<OutputStream>,
    ) -> Self {
        Self {
            state,
            bridge_handle: Some(bridge_handle),
            _output: output,
        }
    }

    /// Returns `true` if the session is still running.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Returns current session statistics.
    pub fn stats(&self) -> SessionStats {
        self.state.stats()
    }

    /// Returns a handle that can stop this session from elsewhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.state.running),
        }
    }

    /// Waits until the bridge task ends.
    ///
    /// The task ends after a shutdown request, after the output device
    /// reports an error, or on a fatal resampler failure.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the session, if any.
    pub async fn wait(mut self) -> Result<(), BridgeError> {
        self.join().await
    }

    /// Stops the session and waits for the bridge task to finish.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the session, if it failed before
    /// being stopped.
    pub async fn stop(mut self) -> Result<(), BridgeError> {
        self.state.running.store(false, Ordering::SeqCst);
        self.join().await
    }

    async fn join(&mut self) -> Result<(), BridgeError> {
        let result = match self.bridge_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| BridgeError::BackendError(format!("bridge task failed: {e}")))?,
            None => Ok(()),
        };
        self.state.running.store(false, Ordering::SeqCst);
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Dropped without stop() - the bridge task exits at its next poll
        self.state.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_new() {
        let state = SessionState::new();
        assert!(state.is_running());
        assert_eq!(state.stats(), SessionStats::default());
    }

    #[test]
    fn test_stats_snapshot() {
        let state = SessionState::new();
        state.chunks_consumed.fetch_add(3, Ordering::SeqCst);
        state.underruns.fetch_add(1, Ordering::SeqCst);

        let stats = state.stats();
        assert_eq!(stats.chunks_consumed, 3);
        assert_eq!(stats.underruns, 1);
        assert_eq!(stats.chunks_dropped, 0);
    }

    #[tokio::test]
    async fn test_shutdown_handle_stops_wait() {
        let state = Arc::new(SessionState::new());
        let task_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while task_state.is_running() {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
            Ok(())
        });

        let session = Session::new(state, handle, None);
        let shutdown = session.shutdown_handle();
        assert!(!shutdown.is_shutdown());

        shutdown.shutdown();
        session.wait().await.unwrap();
        assert!(shutdown.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_returns_task_error() {
        let state = Arc::new(SessionState::new());
        let handle = tokio::spawn(async {
            Err(BridgeError::Resample(crate::ResampleError::process("boom")))
        });

        let session = Session::new(state, handle, None);
        let err = session.wait().await.unwrap_err();
        assert!(matches!(err, BridgeError::Resample(_)));
    }
}
