//! Timestamp-driven playback for a wavesync receiver.

pub mod clock;
pub mod config;
pub mod cpal_output;
pub mod device;
pub mod drop_policy;
pub mod format;
pub mod output;
pub mod queue;
pub mod recovery;
pub mod silence;
pub mod stats;
pub mod sync_loop;
pub mod writer;

pub use sync_loop::{RecoveryCause, Step, SyncError, SyncLoop};
