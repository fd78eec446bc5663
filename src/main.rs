//! shm-audio-bridge - play a Scream IVSHMEM stream through the local audio output.
//!
//! # Usage
//!
//! ```bash
//! shm-audio-bridge /dev/shm/scream-ivshmem
//! RUST_LOG=debug shm-audio-bridge --period 256 --rate 48000 /dev/shm/scream-ivshmem
//! cargo run --features jack -- /dev/shm/scream-ivshmem
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use shm_audio_bridge::{AudioBridge, BridgeConfig, ShutdownHandle};
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "shm-audio-bridge")]
#[command(about = "Play audio from a Scream IVSHMEM shared-memory ring")]
#[command(version)]
struct Args {
    /// Shared-memory file or IVSHMEM device written by the producer
    shm_path: PathBuf,

    /// Frames per output period
    #[arg(short, long, default_value_t = 1024)]
    period: u32,

    /// Output sample rate in Hz (default: the device's rate)
    #[arg(short, long)]
    rate: Option<u32>,

    /// Output device name (default: the system default output)
    #[arg(short, long)]
    device: Option<String>,

    /// Milliseconds between polls of the shared ring
    #[arg(long, default_value_t = 10)]
    poll_ms: u64,

    /// Staging capacity, in periods
    #[arg(long, default_value_t = 3)]
    headroom: u32,
}

impl Args {
    fn config(&self) -> BridgeConfig {
        BridgeConfig {
            poll_interval: Duration::from_millis(self.poll_ms),
            period_frames: self.period,
            headroom: self.headroom,
            sample_rate: self.rate,
            output_device: self.device.clone(),
            ..BridgeConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Usage errors exit with status 2 via clap
    let args = Args::parse();

    let session = match AudioBridge::builder()
        .shm_path(args.shm_path.clone())
        .config(args.config())
        .on_event(|event| tracing::debug!(?event, "Bridge event"))
        .start()
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, path = %args.shm_path.display(), "Failed to start bridge");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(shutdown_on_signal(session.shutdown_handle()));

    match session.wait().await {
        Ok(()) => {
            tracing::info!("Bridge shut down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Bridge failed");
            ExitCode::FAILURE
        }
    }
}

/// Stops the session on Ctrl-C or SIGTERM.
async fn shutdown_on_signal(shutdown: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown requested");
    shutdown.shutdown();
}
