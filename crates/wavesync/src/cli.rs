use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("WAVESYNC_REVISION"),
    ", built ",
    env!("WAVESYNC_BUILD_DAY"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "wavesync", version = VERSION, arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Output ring size in frames (never smaller than one chunk)
    #[arg(long)]
    pub buffer_frames: Option<u32>,

    /// Late chunks start getting dropped past half of this tolerance
    #[arg(long, default_value_t = 50.0)]
    pub tolerance_ms: f64,

    /// Fixed delay of the audio sink, subtracted from every play time
    #[arg(long, default_value_t = 0.0)]
    pub sink_latency_ms: f64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a raw little-endian PCM file through the synchronized player
    Play(PlayArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlayArgs {
    /// Path to a headerless PCM file
    pub path: PathBuf,

    /// Bits per sample (16 or 24)
    #[arg(long, default_value_t = 16)]
    pub sample_bits: u16,

    #[arg(long, default_value_t = 2)]
    pub channels: u16,

    #[arg(long, default_value_t = 44_100)]
    pub sample_rate: u32,

    /// Bytes of audio per chunk
    #[arg(long, default_value_t = 4096)]
    pub chunk_size: usize,

    /// How far ahead of real time chunks are stamped
    #[arg(long, default_value_t = 500)]
    pub latency_ms: u32,
}
