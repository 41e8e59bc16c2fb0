//! Late-chunk dropping and catastrophic-failure thresholds.
//!
//! Chunks late by more than half the tolerance are dropped with a probability
//! that grows linearly with their lateness, saturating at 1. Spreading drops
//! this way avoids the burst of synchronized drops a hard cutoff produces when
//! many chunks cross it together (same idea as RED queue management).

use rand::Rng;

/// Lost-packet count above which a loss notice forces a full recovery.
pub const CATASTROPHIC_LOSS: u64 = 200;

/// Fixed slack added on top of sink and stream latency for the maximum delay.
const MAX_DELAY_SLACK_SECS: f64 = 0.2;

/// Raw drop probability for a chunk `delay` seconds from its play time.
///
/// `None` while the chunk is no later than half the tolerance. The returned
/// value is not clamped and exceeds 1 for very late chunks.
pub fn drop_probability(delay: f64, tolerance: f64) -> Option<f64> {
    let mid_tolerance = tolerance / 2.0;
    if delay < -mid_tolerance {
        let over = -delay - mid_tolerance;
        Some(over / mid_tolerance)
    } else {
        None
    }
}

/// Decide whether to drop a chunk, drawing from `rng` only when it is late
/// enough to be a candidate.
pub fn should_drop<R: Rng>(delay: f64, tolerance: f64, rng: &mut R) -> bool {
    match drop_probability(delay, tolerance) {
        Some(prob) if prob >= 1.0 => true,
        Some(prob) => rng.random::<f64>() < prob,
        None => false,
    }
}

/// Ceiling above which a chunk is considered catastrophically early, usually
/// because the loop stalled long enough for the sender timeline to move on.
pub fn max_delay(sink_latency_secs: f64, latency_msec: u32) -> f64 {
    MAX_DELAY_SLACK_SECS + sink_latency_secs + latency_msec as f64 / 1000.0
}

pub fn is_catastrophic_delay(delay: f64, max_delay: f64) -> bool {
    delay > max_delay
}

pub fn is_catastrophic_loss(dropped_count: u64) -> bool {
    dropped_count > CATASTROPHIC_LOSS
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn on_time_and_slightly_late_chunks_are_never_candidates() {
        for delay in [0.5, 0.1, 0.0, -0.01, -0.049, -0.05] {
            assert_eq!(drop_probability(delay, 0.1), None, "delay {delay}");
        }
    }

    #[test]
    fn probability_ramps_linearly_past_half_tolerance() {
        let prob = drop_probability(-0.09, 0.1).unwrap();
        assert!((prob - 0.8).abs() < 1e-9);
        let prob = drop_probability(-0.075, 0.1).unwrap();
        assert!((prob - 0.5).abs() < 1e-9);
    }

    #[test]
    fn never_drops_outside_candidate_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for i in 0..1000 {
            let delay = 0.5 - i as f64 * 0.00055;
            assert!(!should_drop(delay, 0.1, &mut rng), "delay {delay}");
        }
    }

    #[test]
    fn saturates_to_always_drop() {
        let mut rng = StdRng::seed_from_u64(2);
        for delay in [-0.11, -0.2, -5.0] {
            assert!(drop_probability(delay, 0.1).unwrap() > 1.0);
            for _ in 0..200 {
                assert!(should_drop(delay, 0.1, &mut rng));
            }
        }
    }

    #[test]
    fn eighty_percent_candidate_drops_about_eighty_percent() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let trials = 20_000;
        let dropped = (0..trials)
            .filter(|_| should_drop(-0.09, 0.1, &mut rng))
            .count();
        let rate = dropped as f64 / trials as f64;
        assert!((rate - 0.8).abs() < 0.02, "drop rate {rate}");
    }

    #[test]
    fn max_delay_adds_slack_sink_and_stream_latency() {
        assert!((max_delay(0.1, 100) - 0.4).abs() < 1e-12);
        assert!(is_catastrophic_delay(0.5, max_delay(0.1, 100)));
        assert!(!is_catastrophic_delay(0.4, max_delay(0.1, 100)));
    }

    #[test]
    fn loss_boundary_is_exclusive_at_two_hundred() {
        assert!(!is_catastrophic_loss(200));
        assert!(is_catastrophic_loss(201));
        assert!(!is_catastrophic_loss(0));
    }
}
