//! Runtime wiring for the wavesync binary.
//!
//! Device enumeration, and local playback: a [`LocalSender`] and the
//! [`SyncLoop`] share one event queue and run as cooperative tasks on a
//! current-thread tokio runtime until the file is played out or Ctrl-C.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use wavesync_player::clock::SystemClock;
use wavesync_player::cpal_output::CpalOutput;
use wavesync_player::queue::ChunkQueue;
use wavesync_player::{SyncLoop, device};
use wavesync_types::PlayerStatus;

use crate::config::PlayConfig;
use crate::sender::LocalSender;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let names = device::list_devices(&host).context("enumerate output devices")?;
    for (i, name) in names.iter().enumerate() {
        println!("#{i}: {name}");
    }
    Ok(())
}

/// Play a raw PCM file through the synchronized player.
pub fn run_play(config: PlayConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("build tokio runtime")?;

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || cancel_for_signal.cancel()) {
        tracing::warn!("ctrl-c handler not installed: {e}");
    }

    runtime.block_on(play(config, cancel))
}

async fn play(config: PlayConfig, cancel: CancellationToken) -> Result<()> {
    let file = File::open(&config.path)
        .with_context(|| format!("open pcm file {:?}", config.path))?;

    let queue = Arc::new(
        ChunkQueue::new().with_recovery_hook(|| tracing::debug!("player requested a recovery")),
    );
    let sender = LocalSender::new(queue.clone(), config.format, SystemClock)?;
    let link = sender.stats();
    let output = CpalOutput::new(config.output.clone());
    let mut player = SyncLoop::new(queue.clone(), output, config.sync.clone())
        .context("configure player")?
        .with_receiver(link.clone());
    let status_rx = player.subscribe();

    tracing::info!(path = ?config.path, "playing local file");

    let feed = async {
        let summary = sender.run(BufReader::new(file)).await?;
        sender.drain().await;
        Ok::<_, anyhow::Error>(summary)
    };

    tokio::select! {
        res = player.run() => res.context("playback stopped")?,
        res = feed => {
            let summary = res?;
            tracing::info!(
                chunks = summary.chunks,
                bytes = summary.bytes,
                reanchors = summary.reanchors,
                "playback finished"
            );
        }
        _ = log_transitions(status_rx) => {}
        _ = cancel.cancelled() => tracing::info!("interrupted"),
    }

    let status = player.status();
    tracing::info!(
        chunks_sent = link.chunks_sent(),
        chunks_seen = status.chunks_seen,
        time_drops = status.time_drops,
        output_delays = status.output_delays,
        stuck_writes = status.stuck_writes,
        recoveries = status.recoveries,
        underruns = ?status.output_underruns,
        avg_delay_ms = status.avg_delay_ms,
        "final status"
    );
    Ok(())
}

/// Log player state changes as they are published. Ends when the player is gone.
async fn log_transitions(mut rx: watch::Receiver<PlayerStatus>) {
    let mut last = rx.borrow_and_update().state;
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().state;
        if state != last {
            tracing::info!(from = ?last, to = ?state, "player state");
            last = state;
        }
    }
}
