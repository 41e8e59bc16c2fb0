//! Derived audio configuration for the active stream.

use thiserror::Error;
use wavesync_types::StreamFormat;

/// PCM sample encoding carried by chunk payloads (always little-endian, signed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleEncoding {
    S16,
    S24,
}

impl SampleEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleEncoding::S16 => 2,
            SampleEncoding::S24 => 3,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("stream format has no channels")]
    NoChannels,
    #[error("stream format has a zero sample rate")]
    NoSampleRate,
    #[error("chunk size of {chunk_size_bytes} bytes holds no whole frame of {frame_size_bytes} bytes")]
    ChunkTooSmall {
        chunk_size_bytes: usize,
        frame_size_bytes: usize,
    },
}

/// Audio configuration derived from the latest `ConfigChange`.
///
/// Replaced wholesale on every format change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioConfig {
    pub format: StreamFormat,
    pub encoding: SampleEncoding,
    pub frame_size_bytes: usize,
    pub chunk_frames: usize,
}

impl AudioConfig {
    pub fn from_format(format: StreamFormat) -> Result<Self, FormatError> {
        if format.channels == 0 {
            return Err(FormatError::NoChannels);
        }
        if format.sample_rate == 0 {
            return Err(FormatError::NoSampleRate);
        }
        let encoding = if format.sample_bits == 24 {
            SampleEncoding::S24
        } else {
            SampleEncoding::S16
        };
        let frame_size_bytes = encoding.bytes_per_sample() * format.channels as usize;
        let chunk_frames = format.chunk_size_bytes / frame_size_bytes;
        if chunk_frames == 0 {
            return Err(FormatError::ChunkTooSmall {
                chunk_size_bytes: format.chunk_size_bytes,
                frame_size_bytes,
            });
        }
        Ok(Self {
            format,
            encoding,
            frame_size_bytes,
            chunk_frames,
        })
    }

    pub fn chunk_size_bytes(&self) -> usize {
        self.format.chunk_size_bytes
    }

    /// Sender latency budget in seconds.
    pub fn latency_secs(&self) -> f64 {
        self.format.latency_msec as f64 / 1000.0
    }

    /// Playback duration of one full chunk in seconds.
    pub fn chunk_duration_secs(&self) -> f64 {
        self.chunk_frames as f64 / self.format.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(sample_bits: u16, channels: u16, chunk_size_bytes: usize) -> StreamFormat {
        StreamFormat {
            sample_bits,
            channels,
            sample_rate: 44_100,
            chunk_size_bytes,
            latency_msec: 100,
        }
    }

    #[test]
    fn sixteen_bit_stereo_derives_frame_and_chunk_sizes() {
        let cfg = AudioConfig::from_format(format(16, 2, 4096)).unwrap();
        assert_eq!(cfg.encoding, SampleEncoding::S16);
        assert_eq!(cfg.frame_size_bytes, 4);
        assert_eq!(cfg.chunk_frames, 1024);
        assert!((cfg.latency_secs() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn twenty_four_bit_uses_packed_frames() {
        let cfg = AudioConfig::from_format(format(24, 2, 1536)).unwrap();
        assert_eq!(cfg.encoding, SampleEncoding::S24);
        assert_eq!(cfg.frame_size_bytes, 6);
        assert_eq!(cfg.chunk_frames, 256);
    }

    #[test]
    fn unknown_bit_depth_falls_back_to_sixteen() {
        let cfg = AudioConfig::from_format(format(8, 1, 100)).unwrap();
        assert_eq!(cfg.encoding, SampleEncoding::S16);
        assert_eq!(cfg.frame_size_bytes, 2);
        assert_eq!(cfg.chunk_frames, 50);
    }

    #[test]
    fn rejects_degenerate_formats() {
        assert_eq!(
            AudioConfig::from_format(format(16, 0, 4096)),
            Err(FormatError::NoChannels)
        );
        assert_eq!(
            AudioConfig::from_format(format(16, 2, 3)),
            Err(FormatError::ChunkTooSmall {
                chunk_size_bytes: 3,
                frame_size_bytes: 4
            })
        );
        let mut no_rate = format(16, 2, 4096);
        no_rate.sample_rate = 0;
        assert_eq!(
            AudioConfig::from_format(no_rate),
            Err(FormatError::NoSampleRate)
        );
    }

    #[test]
    fn chunk_duration_matches_frames_over_rate() {
        let cfg = AudioConfig::from_format(format(16, 2, 4 * 441)).unwrap();
        assert!((cfg.chunk_duration_secs() - 0.01).abs() < 1e-12);
    }
}
