use serde::{Deserialize, Serialize};

/// Audio stream format announced by the sender before any chunk of that stream.
///
/// Immutable once issued; a format change arrives as a new `ConfigChange` event.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamFormat {
    /// Bits per sample. `24` selects packed 24-bit samples, anything else is 16-bit.
    pub sample_bits: u16,
    /// Interleaved channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Size of one audio chunk payload in bytes.
    pub chunk_size_bytes: usize,
    /// Sender-side latency budget in milliseconds.
    pub latency_msec: u32,
}

/// One unit of timestamped audio as received from the network.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    /// Wall-clock time (seconds since the Unix epoch, sender clock) at which the
    /// chunk should start playing.
    pub send_timestamp: f64,
    /// Raw little-endian PCM bytes.
    pub payload: Vec<u8>,
}

/// Events produced by the receiver and consumed, in order, by the player.
#[derive(Clone, Debug, PartialEq)]
pub enum QueueEvent {
    /// A new stream format; the output device must be reopened.
    ConfigChange(StreamFormat),
    /// The network layer detected missing packets.
    LossNotice { dropped_count: u64 },
    /// Audio to be played at its timestamp.
    AudioChunk(AudioChunk),
}

impl QueueEvent {
    pub fn is_config(&self) -> bool {
        matches!(self, QueueEvent::ConfigChange(_))
    }
}

/// Coarse synchronization state of the player.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No stream format received yet.
    #[default]
    Idle,
    /// Output device open and chunks flowing.
    Streaming,
    /// State was cleared after a timing or loss failure; the device is closed
    /// until the next chunk or format arrives.
    Recovering,
}

/// Non-fatal conditions worth telling the operator about.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusAdvisory {
    /// Network latency above four seconds; sender and receiver clocks are
    /// probably not synchronized.
    HugeNetworkLatency,
    /// Negative network latency, only possible with clock skew.
    NegativeNetworkLatency,
}

/// Point-in-time view of the player, published on every status report.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    pub state: SyncState,
    /// Active sample rate (Hz).
    pub sample_rate: Option<u32>,
    /// Active channel count.
    pub channels: Option<u16>,
    /// Frames carried by one full chunk in the active format.
    pub chunk_frames: Option<usize>,
    /// Events waiting in the queue when the snapshot was taken.
    pub queue_len: usize,
    /// Free output buffer space expressed in chunks.
    pub buffer_chunks: Option<f64>,
    /// Chunk throughput over the last report window.
    pub chunks_per_sec: f64,
    /// Mean of `play time - now` over every chunk seen, in milliseconds.
    pub avg_delay_ms: f64,
    /// Receiver-estimated network latency in milliseconds.
    pub network_latency_ms: f64,
    /// Packets the receiver reported as lost.
    pub network_drops: u64,
    /// Chunks dropped for arriving too late.
    pub time_drops: u64,
    /// Polls that found the output buffer too full to take a chunk.
    pub output_delays: u64,
    /// Chunks abandoned because the output never made room.
    pub stuck_writes: u64,
    /// Full recoveries performed.
    pub recoveries: u64,
    /// Audio chunks taken from the queue while a format was active.
    pub chunks_seen: u64,
    /// Lost packets absorbed without a recovery since the last one.
    pub silence_budget: u64,
    /// Underrun events reported by the output device, when it tracks them.
    pub output_underruns: Option<u64>,
    pub advisories: Vec<StatusAdvisory>,
}
