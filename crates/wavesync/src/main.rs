//! wavesync: play a timestamped PCM stream in sync with the sender's clock.
//!
//! ## Pipeline
//! 1. **Send**: a local sender reads a raw PCM file and queues one format
//!    change, then timestamped chunks in real time.
//! 2. **Sync**: the sync loop waits until each chunk's play time, drops late
//!    chunks probabilistically and recovers from stalls or heavy loss.
//! 3. **Output**: chunks are decoded into a bounded ring that the CPAL
//!    callback drains without blocking.
//!
//! Logging honors `RUST_LOG`.

use anyhow::{Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wavesync::cli::{Args, Command};
use wavesync::config::PlayConfig;
use wavesync::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,wavesync=info,wavesync_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    match &args.cmd {
        Some(Command::Play(play)) => runtime::run_play(PlayConfig::from_args(&args, play)),
        None => bail!("nothing to do; pass a subcommand or --list-devices"),
    }
}
