//! Exponential backoff for browser attach retries.

use std::time::Duration;

use rand::Rng;

/// Longest delay between attach attempts regardless of attempt count.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Deterministic exponential delay: `base * 2^attempt`, capped.
///
/// `attempt` is zero-based; attempt 0 waits `base`.
pub fn retry_delay(attempt: u32, base: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

/// `retry_delay` with ±25% jitter so independent processes don't hammer a
/// dying endpoint in lockstep.
pub fn jittered_retry_delay(attempt: u32, base: Duration) -> Duration {
    let delay = retry_delay(attempt, base);
    let spread = delay.as_millis() as i64 / 4;
    if spread == 0 {
        return delay;
    }
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    let millis = (delay.as_millis() as i64 + offset).max(0) as u64;
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(0, base), Duration::from_millis(500));
        assert_eq!(retry_delay(1, base), Duration::from_millis(1000));
        assert_eq!(retry_delay(2, base), Duration::from_millis(2000));
        assert_eq!(retry_delay(3, base), Duration::from_millis(4000));
    }

    #[test]
    fn delay_is_capped() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(20, base), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(u32::MAX, base), MAX_RETRY_DELAY);
    }

    #[test]
    fn jitter_stays_within_quarter_spread() {
        let base = Duration::from_millis(400);
        for attempt in 0..4 {
            let nominal = retry_delay(attempt, base);
            for _ in 0..50 {
                let jittered = jittered_retry_delay(attempt, base);
                let lo = nominal.mul_f64(0.75);
                let hi = nominal.mul_f64(1.25);
                assert!(
                    jittered >= lo && jittered <= hi,
                    "attempt {attempt}: {jittered:?} outside [{lo:?}, {hi:?}]"
                );
            }
        }
    }

    #[test]
    fn zero_base_never_panics() {
        assert_eq!(retry_delay(5, Duration::ZERO), Duration::ZERO);
        assert_eq!(jittered_retry_delay(5, Duration::ZERO), Duration::ZERO);
    }
}
