//! Zero-filled chunks for padding under-delivered payloads.

use crate::format::AudioConfig;

/// Cache of one silent chunk for the active format.
///
/// Must be invalidated whenever the audio configuration changes.
#[derive(Debug, Default)]
pub struct SilenceCache {
    chunk: Option<Vec<u8>>,
}

impl SilenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zeroed chunk of `chunk_size_bytes`, generated on first use.
    pub fn silent_chunk(&mut self, config: &AudioConfig) -> &[u8] {
        let size = config.chunk_size_bytes();
        let chunk = self.chunk.get_or_insert_with(|| vec![0u8; size]);
        if chunk.len() != size {
            *chunk = vec![0u8; size];
        }
        chunk
    }

    pub fn invalidate(&mut self) {
        self.chunk = None;
    }

    /// Fit `payload` to exactly one chunk.
    ///
    /// Short payloads get a silent tail; anything past the chunk size is cut
    /// off, so the output never needs room for more than `chunk_frames`.
    pub fn pad_to_chunk(&mut self, mut payload: Vec<u8>, config: &AudioConfig) -> Vec<u8> {
        let chunk_size = config.chunk_size_bytes();
        if payload.len() < chunk_size {
            let missing = chunk_size - payload.len();
            let silence = self.silent_chunk(config);
            payload.extend_from_slice(&silence[..missing]);
        }
        payload.truncate(config.chunk_frames * config.frame_size_bytes);
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavesync_types::StreamFormat;

    fn config(chunk_size_bytes: usize) -> AudioConfig {
        AudioConfig::from_format(StreamFormat {
            sample_bits: 16,
            channels: 2,
            sample_rate: 48_000,
            chunk_size_bytes,
            latency_msec: 100,
        })
        .unwrap()
    }

    #[test]
    fn silent_chunk_matches_chunk_size_and_is_zeroed() {
        let mut cache = SilenceCache::new();
        let chunk = cache.silent_chunk(&config(16));
        assert_eq!(chunk.len(), 16);
        assert!(chunk.iter().all(|b| *b == 0));
    }

    #[test]
    fn silent_chunk_regenerates_after_invalidate() {
        let mut cache = SilenceCache::new();
        assert_eq!(cache.silent_chunk(&config(16)).len(), 16);
        cache.invalidate();
        assert_eq!(cache.silent_chunk(&config(32)).len(), 32);
    }

    #[test]
    fn pad_fills_short_payload_with_silence() {
        let mut cache = SilenceCache::new();
        let padded = cache.pad_to_chunk(vec![7u8; 6], &config(12));
        assert_eq!(padded.len(), 12);
        assert_eq!(&padded[..6], &[7u8; 6]);
        assert!(padded[6..].iter().all(|b| *b == 0));
    }

    #[test]
    fn pad_leaves_full_payload_untouched() {
        let mut cache = SilenceCache::new();
        let payload: Vec<u8> = (0..12).collect();
        assert_eq!(cache.pad_to_chunk(payload.clone(), &config(12)), payload);
    }

    #[test]
    fn pad_cuts_oversize_payload_to_one_chunk() {
        let mut cache = SilenceCache::new();
        let padded = cache.pad_to_chunk((0..30).collect(), &config(12));
        assert_eq!(padded, (0..12).collect::<Vec<u8>>());
    }

    #[test]
    fn pad_keeps_whole_frames_when_chunk_size_is_unaligned() {
        let mut cache = SilenceCache::new();
        // 14 bytes hold three 4-byte frames.
        let padded = cache.pad_to_chunk(vec![1u8; 20], &config(14));
        assert_eq!(padded.len(), 12);
        let padded = cache.pad_to_chunk(vec![1u8; 5], &config(14));
        assert_eq!(padded.len(), 12);
    }
}
