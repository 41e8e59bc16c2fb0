//! CPAL-backed audio output.
//!
//! Chunks written by the sync loop are decoded to interleaved `f32` and pushed
//! into a bounded [`SampleRing`]. The CPAL callback drains the ring without
//! blocking and converts to the device sample format, filling any shortfall
//! with silence. The ring's free space is what the sync loop sees as available
//! write frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::OutputConfig;
use crate::device;
use crate::format::{AudioConfig, SampleEncoding};
use crate::output::{AudioOutput, OutputError, OutputStream};

/// Ring capacity when none is configured.
pub const DEFAULT_RING_FRAMES: usize = 4096;

/// Bounded FIFO of interleaved `f32` samples shared with the CPAL callback.
pub struct SampleRing {
    channels: usize,
    capacity_samples: usize,
    samples: Mutex<VecDeque<f32>>,
}

impl SampleRing {
    pub fn new(channels: usize, capacity_frames: usize) -> Self {
        let capacity_samples = capacity_frames.saturating_mul(channels);
        Self {
            channels,
            capacity_samples,
            samples: Mutex::new(VecDeque::with_capacity(capacity_samples)),
        }
    }

    /// Frames that can be pushed right now.
    pub fn free_frames(&self) -> usize {
        let queued = self.lock().len();
        self.capacity_samples.saturating_sub(queued) / self.channels
    }

    pub fn len_frames(&self) -> usize {
        self.lock().len() / self.channels
    }

    /// Push as many samples as fit; returns how many were accepted.
    pub fn push(&self, samples: &[f32]) -> usize {
        let mut q = self.lock();
        let room = self.capacity_samples.saturating_sub(q.len());
        let take = samples.len().min(room);
        q.extend(&samples[..take]);
        take
    }

    /// Fill `out` from the front of the ring; returns how many samples were filled.
    fn pop_into<T>(&self, out: &mut [T]) -> usize
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let mut q = self.lock();
        let take = out.len().min(q.len());
        for (slot, sample) in out.iter_mut().zip(q.drain(..take)) {
            *slot = <T as cpal::Sample>::from_sample::<f32>(sample);
        }
        take
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ring size for a stream: the configured size, but never less than one chunk.
pub fn ring_capacity_frames(buffer_frames: Option<u32>, chunk_frames: usize) -> usize {
    buffer_frames
        .map(|frames| frames as usize)
        .unwrap_or(DEFAULT_RING_FRAMES)
        .max(chunk_frames)
}

/// Decode little-endian signed PCM into normalized `f32` samples, appending to `out`.
pub fn decode_pcm(payload: &[u8], encoding: SampleEncoding, out: &mut Vec<f32>) {
    match encoding {
        SampleEncoding::S16 => out.extend(
            payload
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0),
        ),
        SampleEncoding::S24 => out.extend(payload.chunks_exact(3).map(|b| {
            let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
            v as f32 / 8_388_608.0
        })),
    }
}

/// Opens CPAL output streams on the selected device.
pub struct CpalOutput {
    host: cpal::Host,
    config: OutputConfig,
}

impl CpalOutput {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            host: cpal::default_host(),
            config,
        }
    }
}

impl AudioOutput for CpalOutput {
    type Stream = CpalStream;

    fn open(&mut self, config: &AudioConfig) -> Result<CpalStream, OutputError> {
        let format = config.format;
        let device = device::pick_device(&self.host, self.config.device.as_deref())?;
        let supported = device::pick_output_config(&device, format.sample_rate, format.channels)?;
        let stream_config = supported.config();
        let ring_frames = ring_capacity_frames(self.config.buffer_frames, config.chunk_frames);
        let ring = Arc::new(SampleRing::new(format.channels as usize, ring_frames));
        let underruns = Arc::new(AtomicU64::new(0));

        let stream = build_output_stream(
            &device,
            &stream_config,
            supported.sample_format(),
            ring.clone(),
            underruns.clone(),
        )?;
        stream.play().map_err(OutputError::Play)?;

        tracing::info!(
            device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            sample_format = ?supported.sample_format(),
            ring_frames,
            "output stream started"
        );

        Ok(CpalStream {
            stream,
            ring,
            encoding: config.encoding,
            underruns,
            scratch: Vec::with_capacity(config.chunk_frames * format.channels as usize),
        })
    }
}

/// An open CPAL output stream. Pauses and releases the device on drop.
pub struct CpalStream {
    stream: cpal::Stream,
    ring: Arc<SampleRing>,
    encoding: SampleEncoding,
    underruns: Arc<AtomicU64>,
    scratch: Vec<f32>,
}

impl OutputStream for CpalStream {
    fn available_write_frames(&self) -> usize {
        self.ring.free_frames()
    }

    fn write(&mut self, payload: &[u8]) {
        self.scratch.clear();
        decode_pcm(payload, self.encoding, &mut self.scratch);
        let pushed = self.ring.push(&self.scratch);
        if pushed < self.scratch.len() {
            tracing::warn!(
                dropped_samples = self.scratch.len() - pushed,
                "output ring overflow"
            );
        }
    }

    fn underrun_events(&self) -> Option<u64> {
        Some(self.underruns.load(Ordering::Relaxed))
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!("pause on close failed: {e}");
        }
        tracing::info!(
            buffered_frames = self.ring.len_frames(),
            "output stream closed"
        );
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: Arc<SampleRing>,
    underruns: Arc<AtomicU64>,
) -> Result<cpal::Stream, OutputError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring, underruns),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring, underruns),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring, underruns),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring, underruns),
        other => Err(OutputError::Other(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
///
/// The callback never waits: whatever the ring cannot supply is played as
/// silence and counted as one underrun.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<SampleRing>,
    underruns: Arc<AtomicU64>,
) -> Result<cpal::Stream, OutputError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let err_fn = |err| tracing::warn!("stream error: {err}");

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let filled = ring.pop_into(data);
                if filled < data.len() {
                    underruns.fetch_add(1, Ordering::Relaxed);
                    data[filled..].fill(<T as cpal::Sample>::from_sample::<f32>(0.0));
                }
            },
            err_fn,
            None,
        )
        .map_err(OutputError::Build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_reports_free_frames_and_caps_pushes() {
        let ring = SampleRing::new(2, 4);
        assert_eq!(ring.free_frames(), 4);
        assert_eq!(ring.push(&[0.1; 6]), 6);
        assert_eq!(ring.free_frames(), 1);
        assert_eq!(ring.push(&[0.2; 6]), 2);
        assert_eq!(ring.free_frames(), 0);
        assert_eq!(ring.len_frames(), 4);
    }

    #[test]
    fn pop_into_drains_in_order_and_reports_shortfall() {
        let ring = SampleRing::new(1, 8);
        ring.push(&[0.5, -0.5, 0.25]);
        let mut out = [0.0f32; 5];
        assert_eq!(ring.pop_into(&mut out), 3);
        assert_eq!(&out[..3], &[0.5, -0.5, 0.25]);
        assert_eq!(ring.free_frames(), 8);
    }

    #[test]
    fn pop_into_converts_to_integer_formats() {
        let ring = SampleRing::new(1, 4);
        ring.push(&[0.0, 1.0]);
        let mut out = [7i16; 2];
        assert_eq!(ring.pop_into(&mut out), 2);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], i16::MAX);
    }

    #[test]
    fn ring_capacity_is_at_least_one_chunk() {
        assert_eq!(ring_capacity_frames(None, 1024), DEFAULT_RING_FRAMES);
        assert_eq!(ring_capacity_frames(Some(512), 1024), 1024);
        assert_eq!(ring_capacity_frames(Some(8192), 1024), 8192);
        assert_eq!(ring_capacity_frames(None, 10_000), 10_000);
    }

    #[test]
    fn decode_s16_little_endian() {
        let mut out = Vec::new();
        let payload = [0x00, 0x00, 0x00, 0x40, 0x00, 0x80, 0xff, 0x7f];
        decode_pcm(&payload, SampleEncoding::S16, &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.5);
        assert_eq!(out[2], -1.0);
        assert!((out[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn decode_s24_sign_extends() {
        let mut out = Vec::new();
        let payload = [0x00, 0x00, 0x40, 0x00, 0x00, 0x80, 0xff, 0xff, 0xff];
        decode_pcm(&payload, SampleEncoding::S24, &mut out);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], 0.5);
        assert_eq!(out[1], -1.0);
        assert!(out[2] < 0.0 && out[2] > -1e-6);
    }

    #[test]
    fn decode_ignores_trailing_partial_sample() {
        let mut out = Vec::new();
        decode_pcm(&[0x00, 0x40, 0x12], SampleEncoding::S16, &mut out);
        assert_eq!(out, vec![0.5]);
    }
}
