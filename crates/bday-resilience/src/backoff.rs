// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential retry backoff with multiplicative jitter.

use std::future::Future;
use std::time::Duration;

use bday_config::model::WorkerConfig;
use rand::Rng;
use tracing::warn;

/// `base * 2^(attempt - 1)`, spread by `±jitter_factor`, never above `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, jitter_factor: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.base_backoff(), config.max_backoff(), config.jitter_factor)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Un-jittered delay before retry number `attempt` (1-based).
    pub fn nominal(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64 << exponent;
        let millis = (self.base.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis).min(self.max)
    }

    /// Jittered delay using the thread-local RNG.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal(attempt);
        if self.jitter_factor == 0.0 || nominal.is_zero() {
            return nominal;
        }
        let spread = rng.gen_range(1.0 - self.jitter_factor..=1.0 + self.jitter_factor);
        nominal.mul_f64(spread).min(self.max)
    }
}

/// Run `op` up to `max_attempts` times, sleeping `backoff.delay(n)` between
/// attempts while `should_retry` accepts the error.
pub async fn retry<T, E, F, Fut>(
    backoff: &ExponentialBackoff,
    max_attempts: u32,
    should_retry: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && should_retry(&err) => {
                let delay = backoff.delay(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn doubles_per_attempt_until_the_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10), 0.0);
        let delays: Vec<u64> = (1..=6).map(|n| backoff.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn attempt_zero_behaves_like_the_first() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(5), 0.0);
        assert_eq!(backoff.nominal(0), Duration::from_millis(250));
    }

    #[test]
    fn huge_attempts_saturate_at_max() {
        let backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(3600), 0.5);
        assert!(backoff.delay(u32::MAX) <= Duration::from_secs(3600));
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(60), 0.3);
        let a = backoff.delay_with(3, &mut StdRng::seed_from_u64(7));
        let b = backoff.delay_with(3, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn reads_worker_config() {
        let backoff = ExponentialBackoff::from_config(&WorkerConfig::default());
        assert_eq!(backoff.base(), Duration::from_secs(1));
        assert_eq!(backoff.max(), Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_at_first_success() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), 0.0);
        let mut calls = 0;
        let result: Result<u32, String> = retry(&backoff, 5, |_| true, || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err(format!("boom {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_on_rejected_or_exhausted_errors() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), 0.0);
        let mut calls = 0;
        let result: Result<(), String> = retry(&backoff, 3, |_| true, || {
            calls += 1;
            async { Err("down".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: Result<(), String> = retry(&backoff, 3, |e: &String| e != "fatal", || {
            calls += 1;
            async { Err("fatal".to_string()) }
        })
        .await;
        assert_eq!(result, Err("fatal".to_string()));
        assert_eq!(calls, 1);
    }

    proptest! {
        #[test]
        fn jittered_delay_stays_within_bounds(
            attempt in 1u32..40,
            base_ms in 1u64..5_000,
            jitter in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let max = Duration::from_secs(600);
            let backoff = ExponentialBackoff::new(Duration::from_millis(base_ms), max, jitter);
            let nominal = backoff.nominal(attempt);
            let delay = backoff.delay_with(attempt, &mut StdRng::seed_from_u64(seed));
            prop_assert!(delay <= max);
            let floor = nominal.mul_f64(1.0 - jitter).saturating_sub(Duration::from_millis(1));
            prop_assert!(delay >= floor);
        }
    }
}
