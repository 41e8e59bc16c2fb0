//! Audio output abstraction consumed by the sync loop.
//!
//! An [`AudioOutput`] opens one [`OutputStream`] per audio configuration.
//! Dropping the stream closes the device, so every exit path (format change,
//! recovery, shutdown) releases it.

use thiserror::Error;

use crate::format::AudioConfig;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no output devices available: {0}")]
    NoDevices(String),
    #[error("no output device matched: {0}")]
    DeviceNotFound(String),
    #[error("no default output device")]
    NoDefaultDevice,
    #[error("device does not support {channels} channel(s) at {sample_rate} Hz")]
    UnsupportedConfig { sample_rate: u32, channels: u16 },
    #[error("failed to build output stream")]
    Build(#[source] cpal::BuildStreamError),
    #[error("failed to start output stream")]
    Play(#[source] cpal::PlayStreamError),
    #[error("{0}")]
    Other(String),
}

/// Something that can open an output device for a given configuration.
pub trait AudioOutput {
    type Stream: OutputStream;

    fn open(&mut self, config: &AudioConfig) -> Result<Self::Stream, OutputError>;
}

/// An open output device. Closed on drop.
pub trait OutputStream {
    /// Frames the device buffer can take right now without blocking.
    fn available_write_frames(&self) -> usize;

    /// Queue raw PCM bytes in the stream's configured format.
    ///
    /// Callers check [`OutputStream::available_write_frames`] first.
    fn write(&mut self, payload: &[u8]);

    /// Underrun events seen by the device, when it keeps count.
    fn underrun_events(&self) -> Option<u64> {
        None
    }
}
