//! Local PCM source standing in for the network receiver.
//!
//! Reads a headerless little-endian PCM file and feeds the player's queue
//! the way a receiver would: one `ConfigChange` up front, then one
//! `AudioChunk` per chunk, stamped `anchor + latency + n * chunk_duration`
//! and delivered in real time. When the player asks for a recovery the
//! timeline is re-anchored at the current time.

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use wavesync_player::clock::Clock;
use wavesync_player::format::AudioConfig;
use wavesync_player::queue::{ChunkQueue, EventQueue};
use wavesync_player::stats::ReceiverStats;
use wavesync_types::{AudioChunk, QueueEvent, StreamFormat};

/// Delivery statistics readable by the player while the sender runs.
#[derive(Debug, Default)]
pub struct LinkStats {
    latency_bits: AtomicU64,
    chunks_sent: AtomicU64,
}

impl LinkStats {
    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::Relaxed)
    }

    fn record_send(&self, latency_secs: f64) {
        self.latency_bits.store(latency_secs.to_bits(), Ordering::Relaxed);
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
    }
}

impl ReceiverStats for LinkStats {
    /// How far behind its schedule the last chunk was queued.
    fn network_latency_secs(&self) -> f64 {
        f64::from_bits(self.latency_bits.load(Ordering::Relaxed))
    }

    /// A local file never loses packets.
    fn network_drop_count(&self) -> u64 {
        0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendSummary {
    pub chunks: u64,
    pub bytes: u64,
    pub reanchors: u64,
}

pub struct LocalSender<C> {
    queue: Arc<ChunkQueue>,
    format: StreamFormat,
    chunk_duration: f64,
    latency: f64,
    clock: C,
    stats: Arc<LinkStats>,
}

impl<C: Clock> LocalSender<C> {
    pub fn new(queue: Arc<ChunkQueue>, format: StreamFormat, clock: C) -> Result<Self> {
        let config = AudioConfig::from_format(format).context("invalid stream format")?;
        Ok(Self {
            queue,
            format,
            chunk_duration: config.chunk_duration_secs(),
            latency: config.latency_secs(),
            clock,
            stats: Arc::new(LinkStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    /// Send every chunk of `source`, then return.
    pub async fn run<R: Read>(&self, mut source: R) -> Result<SendSummary> {
        self.queue.push_back(QueueEvent::ConfigChange(self.format));
        tracing::info!(
            sample_rate = self.format.sample_rate,
            channels = self.format.channels,
            chunk_ms = self.chunk_duration * 1000.0,
            latency_ms = self.format.latency_msec,
            "sending local stream"
        );

        let mut summary = SendSummary::default();
        let mut generation = self.queue.recovery_generation();
        let mut anchor = self.clock.now();
        let mut start = Instant::now();
        let mut index = 0u64;
        let mut buf = vec![0u8; self.format.chunk_size_bytes];

        loop {
            let read = read_chunk(&mut source, &mut buf).context("read pcm source")?;
            if read == 0 {
                break;
            }

            let current = self.queue.recovery_generation();
            if current != generation {
                generation = current;
                anchor = self.clock.now();
                start = Instant::now();
                index = 0;
                summary.reanchors += 1;
                tracing::info!("player recovered; re-anchoring timeline");
            }

            let offset = index as f64 * self.chunk_duration;
            tokio::time::sleep_until(start + Duration::from_secs_f64(offset)).await;

            let send_timestamp = anchor + self.latency + offset;
            self.stats.record_send(self.clock.now() - (anchor + offset));
            self.queue.push_back(QueueEvent::AudioChunk(AudioChunk {
                send_timestamp,
                payload: buf[..read].to_vec(),
            }));

            index += 1;
            summary.chunks += 1;
            summary.bytes += read as u64;
        }

        tracing::info!(chunks = summary.chunks, bytes = summary.bytes, "source exhausted");
        Ok(summary)
    }

    /// Resolve once queued audio has had time to reach the output.
    pub async fn drain(&self) {
        while !self.queue.is_empty() {
            tokio::time::sleep(Duration::from_secs_f64(self.chunk_duration)).await;
        }
        tokio::time::sleep(Duration::from_secs_f64(self.latency)).await;
    }
}

/// Fill `buf` as far as the source allows; a short count means end of input.
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
