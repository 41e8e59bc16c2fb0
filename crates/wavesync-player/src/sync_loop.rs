//! The playback synchronization loop.
//!
//! Pulls one [`QueueEvent`] at a time and decides whether each chunk is
//! played, delayed, dropped, or triggers a full recovery, so that output
//! timing tracks the sender's clock.
//!
//! State machine:
//! - `Idle`: no stream format yet; chunks are discarded.
//! - `Streaming`: format known and output open.
//! - `Recovering`: pending events were cleared after a catastrophic delay or
//!   loss and the output is closed. The next format change opens a new
//!   output; the next chunk reopens it with the retained format.
//!
//! Only output-open failures (and unusable formats) leave [`SyncLoop::run`].

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tokio::sync::watch;
use wavesync_types::{AudioChunk, PlayerStatus, QueueEvent, StreamFormat, SyncState};

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, SyncConfig};
use crate::drop_policy;
use crate::format::{AudioConfig, FormatError};
use crate::output::{AudioOutput, OutputError, OutputStream};
use crate::queue::EventQueue;
use crate::recovery;
use crate::silence::SilenceCache;
use crate::stats::{ReceiverStats, ReportContext, StatsAggregator, SyncCounters};
use crate::writer::{self, WriteOutcome};

const ONE_MSEC: f64 = 0.001;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid sync configuration")]
    Config(#[from] ConfigError),
    #[error("unusable stream format")]
    Format(#[from] FormatError),
    #[error("failed to open audio output")]
    Output(#[from] OutputError),
}

/// Why a full recovery was started.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RecoveryCause {
    /// A loss notice reported more packets than can be absorbed.
    Loss { dropped: u64 },
    /// A chunk was scheduled further ahead than the maximum sensible delay.
    Delay { delay: f64 },
}

/// Outcome of one loop iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    /// The queue was empty; it has events again.
    Resumed,
    /// A new format was applied and the output opened.
    Configured,
    /// A small loss was added to the silence budget.
    LossAbsorbed { dropped: u64 },
    /// Pending state was cleared.
    Recovered(RecoveryCause),
    /// A chunk arrived with no format active.
    Discarded,
    /// A late chunk was dropped by the drop policy.
    Dropped,
    /// A chunk was written after `retries` backpressure waits.
    Played { retries: u32 },
    /// The output stayed full and the chunk was skipped.
    Abandoned,
}

struct ActiveStream<S> {
    config: AudioConfig,
    stream: S,
    max_delay: f64,
}

enum PlayerState<S> {
    Idle,
    Streaming(ActiveStream<S>),
    Recovering(AudioConfig),
}

/// Single-task player driving one [`AudioOutput`] from an [`EventQueue`].
pub struct SyncLoop<Q: EventQueue, O: AudioOutput> {
    queue: Arc<Q>,
    output: O,
    config: SyncConfig,
    clock: Box<dyn Clock>,
    rng: StdRng,
    receiver: Option<Arc<dyn ReceiverStats>>,
    state: PlayerState<O::Stream>,
    silence_budget: u64,
    silence: SilenceCache,
    stats: StatsAggregator,
    status_tx: watch::Sender<PlayerStatus>,
}

impl<Q: EventQueue, O: AudioOutput> SyncLoop<Q, O> {
    pub fn new(queue: Arc<Q>, output: O, config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let (status_tx, _) = watch::channel(PlayerStatus::default());
        Ok(Self {
            queue,
            output,
            config,
            clock: Box::new(SystemClock),
            rng: StdRng::from_os_rng(),
            receiver: None,
            state: PlayerState::Idle,
            silence_budget: 0,
            silence: SilenceCache::new(),
            stats: StatsAggregator::new(),
            status_tx,
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Make drop decisions reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_receiver(mut self, receiver: Arc<dyn ReceiverStats>) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn state(&self) -> SyncState {
        match self.state {
            PlayerState::Idle => SyncState::Idle,
            PlayerState::Streaming(_) => SyncState::Streaming,
            PlayerState::Recovering(_) => SyncState::Recovering,
        }
    }

    /// Lost packets absorbed since the last recovery.
    pub fn silence_budget(&self) -> u64 {
        self.silence_budget
    }

    pub fn counters(&self) -> &SyncCounters {
        self.stats.counters()
    }

    /// Format of the current stream, kept across a recovery.
    pub fn audio_config(&self) -> Option<&AudioConfig> {
        match &self.state {
            PlayerState::Idle => None,
            PlayerState::Streaming(active) => Some(&active.config),
            PlayerState::Recovering(config) => Some(config),
        }
    }

    /// Receiver for snapshots published on state changes and status reports.
    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> PlayerStatus {
        let counters = self.stats.counters();
        let report = self.stats.last_report();
        let config = self.audio_config();
        let (network_latency_secs, network_drops) = self
            .receiver
            .as_ref()
            .map(|r| (r.network_latency_secs(), r.network_drop_count()))
            .unwrap_or((0.0, 0));
        PlayerStatus {
            state: self.state(),
            sample_rate: config.map(|c| c.format.sample_rate),
            channels: config.map(|c| c.format.channels),
            chunk_frames: config.map(|c| c.chunk_frames),
            queue_len: self.queue.len(),
            buffer_chunks: report.map(|r| r.buffer_chunks),
            chunks_per_sec: report.map_or(0.0, |r| r.chunks_per_sec),
            avg_delay_ms: counters.avg_delay_secs() * 1000.0,
            network_latency_ms: network_latency_secs * 1000.0,
            network_drops,
            time_drops: counters.time_drops,
            output_delays: counters.output_delays,
            stuck_writes: counters.stuck_writes,
            recoveries: counters.recoveries,
            chunks_seen: counters.chunks_seen,
            silence_budget: self.silence_budget,
            output_underruns: match &self.state {
                PlayerState::Streaming(active) => active.stream.underrun_events(),
                _ => None,
            },
            advisories: report.map(|r| r.advisories.clone()).unwrap_or_default(),
        }
    }

    /// Process events until the host drops the future or an output fails to open.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        loop {
            self.step().await?;
        }
    }

    /// Process a single queue event, or wait for one if the queue is empty.
    pub async fn step(&mut self) -> Result<Step, SyncError> {
        let Some(event) = self.queue.pop_front() else {
            self.wait_for_events().await;
            return Ok(Step::Resumed);
        };
        match event {
            QueueEvent::ConfigChange(format) => self.apply_format(format),
            QueueEvent::LossNotice { dropped_count } => Ok(self.absorb_loss(dropped_count)),
            QueueEvent::AudioChunk(chunk) => self.play_chunk(chunk).await,
        }
    }

    async fn wait_for_events(&mut self) {
        let latency_msec = self.audio_config().map(|c| c.format.latency_msec);
        if latency_msec.is_some() {
            tracing::info!("queue empty - waiting");
        }
        self.queue.wait_until_non_empty().await;
        self.stats.reset_window();

        // Let the receiver get ahead before racing a half-filled queue.
        if let Some(latency_msec) = latency_msec {
            tokio::time::sleep(Duration::from_secs_f64(latency_msec as f64 / 1000.0 / 4.0)).await;
            tracing::info!(q_len = self.queue.len(), "stream flowing");
        }
    }

    fn apply_format(&mut self, format: StreamFormat) -> Result<Step, SyncError> {
        let config = AudioConfig::from_format(format)?;
        recovery::clear_state(&*self.queue, &mut self.silence_budget);

        // Close the current output before opening the next one.
        self.state = PlayerState::Idle;
        self.silence.invalidate();

        let stream = self.output.open(&config)?;
        let max_delay = drop_policy::max_delay(self.config.sink_latency_secs, format.latency_msec);
        tracing::info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            sample_bits = format.sample_bits,
            chunk_frames = config.chunk_frames,
            max_delay_ms = max_delay * 1000.0,
            "new stream format; output opened"
        );
        self.state = PlayerState::Streaming(ActiveStream {
            config,
            stream,
            max_delay,
        });
        self.publish();
        Ok(Step::Configured)
    }

    fn absorb_loss(&mut self, dropped: u64) -> Step {
        if drop_policy::is_catastrophic_loss(dropped) {
            tracing::warn!(dropped, "recovering after a huge packet loss");
            self.recover();
            return Step::Recovered(RecoveryCause::Loss { dropped });
        }
        self.silence_budget = self.silence_budget.saturating_add(dropped);
        Step::LossAbsorbed { dropped }
    }

    fn recover(&mut self) {
        let outcome = recovery::clear_state(&*self.queue, &mut self.silence_budget);
        self.state = match std::mem::replace(&mut self.state, PlayerState::Idle) {
            PlayerState::Streaming(active) => PlayerState::Recovering(active.config),
            other => other,
        };
        self.stats.counters_mut().recoveries += 1;
        tracing::debug!(
            discarded = outcome.discarded,
            kept_config = outcome.kept_config,
            "pending state cleared"
        );
        self.publish();
    }

    fn resume_output(&mut self) -> Result<(), SyncError> {
        if let PlayerState::Recovering(config) = self.state {
            let stream = self.output.open(&config)?;
            let max_delay =
                drop_policy::max_delay(self.config.sink_latency_secs, config.format.latency_msec);
            tracing::info!("output reopened after recovery");
            self.state = PlayerState::Streaming(ActiveStream {
                config,
                stream,
                max_delay,
            });
            self.publish();
        }
        Ok(())
    }

    async fn play_chunk(&mut self, chunk: AudioChunk) -> Result<Step, SyncError> {
        self.resume_output()?;
        let (config, max_delay) = match &self.state {
            PlayerState::Streaming(active) => (active.config, active.max_delay),
            _ => return Ok(Step::Discarded),
        };

        let desired_time = chunk.send_timestamp - self.config.sink_latency_secs;
        let delay = desired_time - self.clock.now();
        self.stats.record_chunk(delay);

        if drop_policy::should_drop(delay, self.config.tolerance_secs, &mut self.rng) {
            self.stats.counters_mut().time_drops += 1;
            tracing::debug!(
                q_len = self.queue.len(),
                delay_ms = delay * 1000.0,
                tolerance_ms = self.config.tolerance_secs * 1000.0,
                "late chunk dropped"
            );
            return Ok(Step::Dropped);
        }

        if drop_policy::is_catastrophic_delay(delay, max_delay) {
            tracing::warn!(
                delay_ms = delay * 1000.0,
                max_delay_ms = max_delay * 1000.0,
                "huge recovery - delay exceeds the maximum"
            );
            self.recover();
            return Ok(Step::Recovered(RecoveryCause::Delay { delay }));
        }

        if delay > ONE_MSEC {
            tokio::time::sleep(Duration::from_secs_f64((delay - ONE_MSEC).max(ONE_MSEC))).await;
        }

        let payload = self.silence.pad_to_chunk(chunk.payload, &config);
        let PlayerState::Streaming(active) = &mut self.state else {
            return Ok(Step::Discarded);
        };
        let outcome = writer::write_chunk(
            &mut active.stream,
            &payload,
            config.chunk_frames,
            delay,
            &mut self.stats.counters_mut().output_delays,
        )
        .await;

        let step = match outcome {
            WriteOutcome::Written { retries } => Step::Played { retries },
            WriteOutcome::Abandoned => {
                self.stats.counters_mut().stuck_writes += 1;
                Step::Abandoned
            }
        };

        if self.stats.window_complete() {
            self.emit_report();
        }
        Ok(step)
    }

    fn emit_report(&mut self) {
        let PlayerState::Streaming(active) = &self.state else {
            return;
        };
        let ctx = ReportContext {
            queue_len: self.queue.len(),
            buffer_space_frames: active.stream.available_write_frames(),
            frames_in_chunk: active.config.chunk_frames,
        };
        let report = self.stats.report(ctx, self.receiver.as_deref());
        tracing::info!(
            stuck_writes = self.stats.counters().stuck_writes,
            recoveries = self.stats.counters().recoveries,
            "{report}"
        );
        for advisory in &report.advisories {
            match advisory {
                wavesync_types::StatusAdvisory::HugeNetworkLatency => tracing::warn!(
                    "network latency seems huge; are the clocks synchronised?"
                ),
                wavesync_types::StatusAdvisory::NegativeNetworkLatency => tracing::warn!(
                    "network latency is negative; the clocks are not synchronised"
                ),
            }
        }
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}
