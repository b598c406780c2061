//! Exponential backoff with jitter, and a sleep that yields to cancellation.

use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Jitter applied to every delay: the result is scaled by a factor in `[0.8, 1.2]`.
pub const JITTER_FRACTION: f64 = 0.2;

/// Delay before retry number `attempt` (1-based), with random jitter.
///
/// `min(base * 2^(attempt-1), cap)`, scaled by a uniform factor in
/// `[1 - JITTER_FRACTION, 1 + JITTER_FRACTION]` and never above `cap`.
/// A zero `base` or `cap` yields a zero delay.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = rand::rng().random_range((1.0 - JITTER_FRACTION)..=(1.0 + JITTER_FRACTION));
    backoff_delay_with_factor(attempt, base, cap, factor)
}

/// [`backoff_delay`] with an explicit jitter factor.
pub fn backoff_delay_with_factor(
    attempt: u32,
    base: Duration,
    cap: Duration,
    factor: f64,
) -> Duration {
    if base.is_zero() || cap.is_zero() {
        return Duration::ZERO;
    }
    let exponent = attempt.saturating_sub(1).min(31);
    let raw = base.saturating_mul(1u32 << exponent);
    let capped = raw.min(cap);
    let factor = if factor.is_finite() { factor.max(0.0) } else { 1.0 };
    capped.mul_f64(factor).min(cap)
}

/// Sleeps for `delay` unless `cancel` fires first.
///
/// Returns `false` when the sleep was cut short by cancellation.
pub async fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);
    const CAP: Duration = Duration::from_secs(10);

    fn ms(d: Duration) -> u128 {
        d.as_millis()
    }

    #[test]
    fn delays_stay_within_jitter_bounds() {
        for _ in 0..200 {
            let d1 = ms(backoff_delay(1, BASE, CAP));
            let d2 = ms(backoff_delay(2, BASE, CAP));
            let d3 = ms(backoff_delay(3, BASE, CAP));
            assert!((80..=120).contains(&d1), "attempt 1 gave {d1}ms");
            assert!((160..=240).contains(&d2), "attempt 2 gave {d2}ms");
            assert!((320..=480).contains(&d3), "attempt 3 gave {d3}ms");
        }
    }

    #[test]
    fn delays_never_exceed_cap() {
        for attempt in [8, 10, 20, 64, u32::MAX] {
            for _ in 0..50 {
                assert!(backoff_delay(attempt, BASE, CAP) <= CAP);
            }
        }
        assert_eq!(backoff_delay_with_factor(20, BASE, CAP, 1.2), CAP);
    }

    #[test]
    fn explicit_factor_scales_the_raw_delay() {
        assert_eq!(backoff_delay_with_factor(1, BASE, CAP, 1.0), BASE);
        assert_eq!(
            backoff_delay_with_factor(3, BASE, CAP, 0.5),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn zero_configuration_means_no_delay() {
        assert_eq!(backoff_delay(1, Duration::ZERO, CAP), Duration::ZERO);
        assert_eq!(backoff_delay(1, BASE, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn negative_factor_is_clamped_to_zero() {
        assert_eq!(backoff_delay_with_factor(2, BASE, CAP, -3.0), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_cancellation() {
        let cancel = CancellationToken::new();
        assert!(sleep_unless_cancelled(Duration::from_secs(5), &cancel).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_returns_early_on_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let started = tokio::time::Instant::now();
        assert!(!sleep_unless_cancelled(Duration::from_secs(60), &cancel).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
