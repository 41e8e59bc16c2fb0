use std::path::PathBuf;

use wavesync_player::config::{OutputConfig, SyncConfig};
use wavesync_types::StreamFormat;

use crate::cli::{Args, PlayArgs};

#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub format: StreamFormat,
    pub sync: SyncConfig,
    pub output: OutputConfig,
}

impl PlayConfig {
    pub fn from_args(args: &Args, play: &PlayArgs) -> Self {
        Self {
            path: play.path.clone(),
            format: StreamFormat {
                sample_bits: play.sample_bits,
                channels: play.channels,
                sample_rate: play.sample_rate,
                chunk_size_bytes: play.chunk_size,
                latency_msec: play.latency_ms,
            },
            sync: SyncConfig {
                tolerance_secs: args.tolerance_ms / 1000.0,
                sink_latency_secs: args.sink_latency_ms / 1000.0,
            },
            output: OutputConfig::new(args.device.clone(), args.buffer_frames),
        }
    }
}
