//! Writing chunks to the output under backpressure.

use std::time::Duration;

use crate::output::OutputStream;

/// Retries allowed while the output buffer lacks room for a chunk.
pub const MAX_WRITE_RETRIES: u32 = 100;

/// Pause after giving up on a stuck output.
pub const STUCK_OUTPUT_PAUSE: Duration = Duration::from_secs(1);

const MIN_RETRY_SECS: f64 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The payload was handed to the device after `retries` waits.
    Written { retries: u32 },
    /// The device never made room; the chunk was skipped.
    Abandoned,
}

/// Interval between backpressure polls: the chunk's own delay, at least 1 ms.
pub fn retry_interval(delay: f64) -> Duration {
    Duration::from_secs_f64(delay.max(MIN_RETRY_SECS))
}

/// Write `payload` once the device reports room for `chunk_frames` frames.
///
/// Every poll that finds too little room bumps `output_delays` and sleeps for
/// [`retry_interval`]. After [`MAX_WRITE_RETRIES`] retries the next failed
/// poll abandons the chunk after a [`STUCK_OUTPUT_PAUSE`].
pub async fn write_chunk<S: OutputStream>(
    stream: &mut S,
    payload: &[u8],
    chunk_frames: usize,
    delay: f64,
    output_delays: &mut u64,
) -> WriteOutcome {
    let mut retries = 0u32;
    loop {
        if stream.available_write_frames() >= chunk_frames {
            stream.write(payload);
            return WriteOutcome::Written { retries };
        }
        if retries >= MAX_WRITE_RETRIES {
            tracing::warn!(retries, "output is stuck; skipping chunk");
            tokio::time::sleep(STUCK_OUTPUT_PAUSE).await;
            return WriteOutcome::Abandoned;
        }
        *output_delays += 1;
        tokio::time::sleep(retry_interval(delay)).await;
        retries += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Reports scripted availability, then `fallback` once the script runs out.
    struct ScriptedStream {
        script: std::cell::RefCell<VecDeque<usize>>,
        fallback: usize,
        polls: std::cell::Cell<usize>,
        written: Vec<Vec<u8>>,
    }

    impl ScriptedStream {
        fn new(script: &[usize], fallback: usize) -> Self {
            Self {
                script: std::cell::RefCell::new(script.iter().copied().collect()),
                fallback,
                polls: std::cell::Cell::new(0),
                written: Vec::new(),
            }
        }
    }

    impl OutputStream for ScriptedStream {
        fn available_write_frames(&self) -> usize {
            self.polls.set(self.polls.get() + 1);
            self.script.borrow_mut().pop_front().unwrap_or(self.fallback)
        }

        fn write(&mut self, payload: &[u8]) {
            self.written.push(payload.to_vec());
        }
    }

    #[test]
    fn retry_interval_has_a_one_millisecond_floor() {
        assert_eq!(retry_interval(-0.5), Duration::from_millis(1));
        assert_eq!(retry_interval(0.0), Duration::from_millis(1));
        assert_eq!(retry_interval(0.02), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_immediately_when_room_available() {
        let mut stream = ScriptedStream::new(&[], 4096);
        let mut delays = 0;
        let outcome = write_chunk(&mut stream, &[1, 2, 3, 4], 1024, 0.0, &mut delays).await;
        assert_eq!(outcome, WriteOutcome::Written { retries: 0 });
        assert_eq!(delays, 0);
        assert_eq!(stream.written, vec![vec![1, 2, 3, 4]]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_room_then_writes() {
        let mut stream = ScriptedStream::new(&[10, 500, 1023], 1024);
        let mut delays = 0;
        let start = tokio::time::Instant::now();
        let outcome = write_chunk(&mut stream, &[0; 8], 1024, 0.005, &mut delays).await;
        assert_eq!(outcome, WriteOutcome::Written { retries: 3 });
        assert_eq!(delays, 3);
        assert_eq!(stream.written.len(), 1);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(15), "waited {waited:?}");
        assert!(waited < Duration::from_millis(25), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn abandons_after_retry_budget() {
        let mut stream = ScriptedStream::new(&[], 0);
        let mut delays = 0;
        let start = tokio::time::Instant::now();
        let outcome = write_chunk(&mut stream, &[0; 8], 1024, -0.2, &mut delays).await;
        assert_eq!(outcome, WriteOutcome::Abandoned);
        assert_eq!(delays, 100);
        assert_eq!(stream.polls.get(), 101);
        assert!(stream.written.is_empty());
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(100) + STUCK_OUTPUT_PAUSE);
        assert!(waited < Duration::from_millis(1300), "waited {waited:?}");
    }
}
