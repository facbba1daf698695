//! Exponential backoff with optional jitter.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Floor applied to every actual retry delay.
pub const MIN_DELAY: Duration = Duration::from_millis(100);

/// Maximum relative jitter in either direction.
const JITTER_FRACTION: f64 = 0.25;

/// Pre-jitter delay before retry `attempt`.
///
/// `attempt` 0 is the first call and has no delay. For `attempt >= 1` the
/// delay is `base × multiplier^(attempt−1)`, capped at the configured maximum.
/// A multiplier below 1 is treated as 1 so the sequence never decreases.
#[must_use]
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let multiplier = config.backoff_multiplier.max(1.0);
    let max_ms = config.max_delay_ms as f64;
    let delay_ms = (config.base_delay_ms as f64 * multiplier.powi(exponent)).min(max_ms);

    Duration::from_millis(delay_ms as u64)
}

/// Actual delay to sleep before retry `attempt`.
///
/// Applies jitter if enabled, raises the delay to `retry_after` when the
/// platform asked for a longer wait, then clamps to `[MIN_DELAY, max_delay]`.
#[must_use]
pub fn retry_delay(config: &RetryConfig, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let base = backoff_delay(config, attempt);
    let delay = if config.jitter {
        jittered(base, rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION))
    } else {
        base
    };
    let delay = retry_after.map_or(delay, |hint| delay.max(hint));

    delay.max(MIN_DELAY).min(config.max_delay())
}

/// Scales `delay` by `1 + offset`.
fn jittered(delay: Duration, offset: f64) -> Duration {
    delay.mul_f64((1.0 + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig::default()
            .with_delays(Duration::from_millis(1_000), Duration::from_millis(30_000))
            .with_jitter(false)
    }

    #[test]
    fn first_attempt_has_no_delay() {
        assert_eq!(backoff_delay(&config(), 0), Duration::ZERO);
    }

    #[test]
    fn grows_exponentially() {
        let config = config();
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(&config, 5), Duration::from_millis(16_000));
    }

    #[test]
    fn non_decreasing_and_capped() {
        for multiplier in [0.5, 1.0, 1.5, 2.0, 10.0] {
            let mut config = config();
            config.backoff_multiplier = multiplier;

            let mut previous = Duration::ZERO;
            for attempt in 0..200 {
                let delay = backoff_delay(&config, attempt);
                assert!(delay >= previous, "attempt {attempt} decreased");
                assert!(delay <= config.max_delay(), "attempt {attempt} above cap");
                previous = delay;
            }
        }
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let base = Duration::from_millis(1_000);
        assert_eq!(jittered(base, -0.25), Duration::from_millis(750));
        assert_eq!(jittered(base, 0.25), Duration::from_millis(1_250));
    }

    #[test]
    fn actual_delay_is_clamped() {
        let config = RetryConfig::default()
            .with_delays(Duration::from_millis(10), Duration::from_millis(2_000));
        for attempt in 1..20 {
            let delay = retry_delay(&config, attempt, None);
            assert!(delay >= MIN_DELAY);
            assert!(delay <= Duration::from_millis(2_000));
        }
    }

    #[test]
    fn retry_after_raises_delay_up_to_cap() {
        let config = config();
        assert_eq!(
            retry_delay(&config, 1, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            retry_delay(&config, 1, Some(Duration::from_secs(600))),
            config.max_delay()
        );
    }
}
