//! Playback counters and the periodic status report.

use std::fmt;

use tokio::time::Instant;
use wavesync_types::StatusAdvisory;

/// Chunks per report window.
pub const REPORT_INTERVAL_CHUNKS: u64 = 200;

const HUGE_NETWORK_LATENCY_SECS: f64 = 4.0;

/// Read-only statistics exposed by the network receiver.
pub trait ReceiverStats {
    fn network_latency_secs(&self) -> f64;
    fn network_drop_count(&self) -> u64;
}

/// Counters accumulated since the player started.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncCounters {
    /// Chunks dropped by the late-chunk policy.
    pub time_drops: u64,
    /// Backpressure polls that found no room in the output buffer.
    pub output_delays: u64,
    /// Chunks abandoned after the output stayed full.
    pub stuck_writes: u64,
    /// Full recoveries performed.
    pub recoveries: u64,
    /// Audio chunks considered for playback.
    pub chunks_seen: u64,
    /// Sum of every considered chunk's delay, in seconds.
    pub total_delay_secs: f64,
}

impl SyncCounters {
    pub fn avg_delay_secs(&self) -> f64 {
        if self.chunks_seen == 0 {
            0.0
        } else {
            self.total_delay_secs / self.chunks_seen as f64
        }
    }
}

/// Inputs to a report that only the sync loop knows.
#[derive(Clone, Copy, Debug)]
pub struct ReportContext {
    pub queue_len: usize,
    pub buffer_space_frames: usize,
    pub frames_in_chunk: usize,
}

/// One status snapshot, emitted every [`REPORT_INTERVAL_CHUNKS`] chunks.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusReport {
    pub queue_len: usize,
    /// Free output buffer in chunk equivalents.
    pub buffer_chunks: f64,
    pub chunks_per_sec: f64,
    pub network_latency_secs: f64,
    pub avg_delay_secs: f64,
    pub time_drops: u64,
    pub network_drops: u64,
    pub output_delays: u64,
    pub advisories: Vec<StatusAdvisory>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunks: q_len={:<3} bs={:4.1} ch/s={:5.1} net lat: {:<5.1}ms avg_delay={:<5.2}ms \
             drops: time={} net={} out_delay={}",
            self.queue_len,
            self.buffer_chunks,
            self.chunks_per_sec,
            self.network_latency_secs * 1000.0,
            self.avg_delay_secs * 1000.0,
            self.time_drops,
            self.network_drops,
            self.output_delays,
        )
    }
}

/// Conditions implied by the receiver's latency estimate.
pub fn advisories(network_latency_secs: f64) -> Vec<StatusAdvisory> {
    if network_latency_secs > HUGE_NETWORK_LATENCY_SECS {
        vec![StatusAdvisory::HugeNetworkLatency]
    } else if network_latency_secs < 0.0 {
        vec![StatusAdvisory::NegativeNetworkLatency]
    } else {
        Vec::new()
    }
}

/// Lifetime counters plus the windowed chunk rate.
#[derive(Debug)]
pub struct StatsAggregator {
    counters: SyncCounters,
    recent: u64,
    recent_start: Instant,
    last_report: Option<StatusReport>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            counters: SyncCounters::default(),
            recent: 0,
            recent_start: Instant::now(),
            last_report: None,
        }
    }

    pub fn counters(&self) -> &SyncCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut SyncCounters {
        &mut self.counters
    }

    pub fn last_report(&self) -> Option<&StatusReport> {
        self.last_report.as_ref()
    }

    /// Start a fresh rate window, e.g. when the queue starts flowing again.
    pub fn reset_window(&mut self) {
        self.recent = 0;
        self.recent_start = Instant::now();
    }

    /// Account for one chunk taken off the queue.
    pub fn record_chunk(&mut self, delay: f64) {
        self.counters.total_delay_secs += delay;
        self.counters.chunks_seen += 1;
        self.recent += 1;
    }

    pub fn window_complete(&self) -> bool {
        self.recent >= REPORT_INTERVAL_CHUNKS
    }

    /// Build a report for the current window and start the next one.
    pub fn report(
        &mut self,
        ctx: ReportContext,
        receiver: Option<&dyn ReceiverStats>,
    ) -> StatusReport {
        let took = self.recent_start.elapsed().as_secs_f64();
        let chunks_per_sec = if took > 0.0 {
            self.recent as f64 / took
        } else {
            0.0
        };
        let buffer_chunks = if ctx.frames_in_chunk > 0 {
            ctx.buffer_space_frames as f64 / ctx.frames_in_chunk as f64
        } else {
            0.0
        };
        let (network_latency_secs, network_drops) = receiver
            .map(|r| (r.network_latency_secs(), r.network_drop_count()))
            .unwrap_or((0.0, 0));

        let report = StatusReport {
            queue_len: ctx.queue_len,
            buffer_chunks,
            chunks_per_sec,
            network_latency_secs,
            avg_delay_secs: self.counters.avg_delay_secs(),
            time_drops: self.counters.time_drops,
            network_drops,
            output_delays: self.counters.output_delays,
            advisories: advisories(network_latency_secs),
        };
        self.last_report = Some(report.clone());
        self.reset_window();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct FixedReceiver {
        latency: f64,
        drops: u64,
    }

    impl ReceiverStats for FixedReceiver {
        fn network_latency_secs(&self) -> f64 {
            self.latency
        }

        fn network_drop_count(&self) -> u64 {
            self.drops
        }
    }

    fn ctx() -> ReportContext {
        ReportContext {
            queue_len: 7,
            buffer_space_frames: 2048,
            frames_in_chunk: 1024,
        }
    }

    #[test]
    fn average_delay_is_zero_before_any_chunk() {
        assert_eq!(SyncCounters::default().avg_delay_secs(), 0.0);
    }

    #[test]
    fn window_completes_at_interval() {
        let mut stats = StatsAggregator::new();
        for _ in 0..REPORT_INTERVAL_CHUNKS - 1 {
            stats.record_chunk(0.01);
        }
        assert!(!stats.window_complete());
        stats.record_chunk(0.01);
        assert!(stats.window_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn report_computes_rate_and_resets_window() {
        let mut stats = StatsAggregator::new();
        for _ in 0..200 {
            stats.record_chunk(0.02);
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        let report = stats.report(ctx(), None);

        assert!((report.chunks_per_sec - 100.0).abs() < 1.0);
        assert!((report.avg_delay_secs - 0.02).abs() < 1e-9);
        assert!((report.buffer_chunks - 2.0).abs() < 1e-9);
        assert_eq!(report.queue_len, 7);
        assert_eq!(report.network_drops, 0);
        assert_eq!(report.network_latency_secs, 0.0);
        assert!(report.advisories.is_empty());
        assert!(!stats.window_complete());
        assert_eq!(stats.counters().chunks_seen, 200);
        assert_eq!(stats.last_report(), Some(&report));
    }

    #[test]
    fn report_pulls_receiver_stats() {
        let mut stats = StatsAggregator::new();
        stats.record_chunk(0.0);
        stats.counters_mut().time_drops = 3;
        stats.counters_mut().output_delays = 5;
        let receiver = FixedReceiver {
            latency: 0.012,
            drops: 9,
        };

        let report = stats.report(ctx(), Some(&receiver));

        assert_eq!(report.network_drops, 9);
        assert!((report.network_latency_secs - 0.012).abs() < 1e-12);
        assert_eq!(report.time_drops, 3);
        assert_eq!(report.output_delays, 5);
    }

    #[test]
    fn aggregated_report_renders_as_one_status_line() {
        let mut stats = StatsAggregator::new();
        stats.record_chunk(0.004);
        stats.counters_mut().output_delays = 2;

        let line = stats.report(ctx(), None).to_string();

        assert!(line.starts_with("chunks: q_len=7"), "{line}");
        assert!(line.contains("bs= 2.0"), "{line}");
        assert!(line.contains("avg_delay=4.00 ms"), "{line}");
        assert!(line.contains("drops: time=0 net=0 out_delay=2"), "{line}");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn advisories_flag_huge_and_negative_latency() {
        assert_eq!(advisories(4.5), vec![StatusAdvisory::HugeNetworkLatency]);
        assert_eq!(advisories(-0.001), vec![StatusAdvisory::NegativeNetworkLatency]);
        assert!(advisories(4.0).is_empty());
        assert!(advisories(0.0).is_empty());
    }

    #[test]
    fn display_renders_a_status_line() {
        let report = StatusReport {
            queue_len: 3,
            buffer_chunks: 2.0,
            chunks_per_sec: 43.1,
            network_latency_secs: 0.0125,
            avg_delay_secs: 0.05,
            time_drops: 1,
            network_drops: 2,
            output_delays: 4,
            advisories: Vec::new(),
        };
        let line = report.to_string();
        assert!(line.starts_with("chunks: q_len=3"));
        assert!(line.contains("ch/s= 43.1"));
        assert!(line.contains("net lat: 12.5 ms"));
        assert!(line.contains("drops: time=1 net=2 out_delay=4"));
    }
}
