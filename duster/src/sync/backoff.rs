use rand::Rng;
use std::time::Duration;

/// Exponential delay between retries, capped at `max`, optionally jittered
/// down to a random point in `0..=delay`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    /// No waiting at all; for tests and for callers that pace themselves.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, false)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let ceiling = base_ms.saturating_mul(1u64 << attempt.min(16)).min(max_ms);
        if self.jitter && ceiling > 0 {
            Duration::from_millis(rng.gen_range(0..=ceiling))
        } else {
            Duration::from_millis(ceiling)
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(8), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(800), false);
        let mut rng = StdRng::seed_from_u64(1);
        let delays: Vec<u64> = (0..5)
            .map(|attempt| backoff.delay_with_rng(attempt, &mut rng).as_millis() as u64)
            .collect();
        assert_eq!(delays, [100, 200, 400, 800, 800]);
    }

    #[test]
    fn jitter_stays_under_the_cap() {
        let backoff = Backoff::default();
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 0..20 {
            assert!(backoff.delay_with_rng(attempt, &mut rng) <= Duration::from_secs(8));
        }
    }

    #[test]
    fn immediate_never_waits() {
        assert_eq!(Backoff::immediate().delay(5), Duration::ZERO);
    }
}
