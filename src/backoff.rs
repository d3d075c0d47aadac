//! Rate limit backoff policy.
//!
//! A [`BackoffPolicy`] is the injectable strategy; each sync run derives its own
//! [`Backoff`] state from it so concurrent runs never share delays.

use std::time::Duration;

/// Seed, growth factor and optional ceiling for rate limit retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    seed: Duration,
    multiplier: u32,
    cap: Option<Duration>,
}

impl BackoffPolicy {
    pub fn new(seed: Duration, multiplier: u32) -> Self {
        Self {
            seed,
            multiplier: multiplier.max(1),
            cap: None,
        }
    }

    /// Bound every delay by `cap`. Retries remain unlimited.
    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = Some(cap);
        self
    }

    pub fn seed(&self) -> Duration {
        self.seed
    }

    /// Fresh retry state for one run.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            next: self.bounded(self.seed),
            attempts: 0,
        }
    }

    fn bounded(&self, delay: Duration) -> Duration {
        match self.cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

impl Default for BackoffPolicy {
    /// One minute, doubling, uncapped.
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 2)
    }
}

/// Per-run retry state.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    next: Duration,
    attempts: u32,
}

impl Backoff {
    /// Returns the delay to wait before the next retry and advances the state.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        self.attempts = self.attempts.saturating_add(1);
        self.next = self
            .policy
            .bounded(current.saturating_mul(self.policy.multiplier));
        current
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_seed() {
        let mut backoff = BackoffPolicy::default().start();
        let delays: Vec<u64> = (0..4).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![60, 120, 240, 480]);
        assert_eq!(backoff.attempts(), 4);
    }

    #[test]
    fn cap_bounds_growth() {
        let policy = BackoffPolicy::new(Duration::from_secs(60), 2).with_cap(Duration::from_secs(150));
        let mut backoff = policy.start();
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(120));
        assert_eq!(backoff.next_delay(), Duration::from_secs(150));
        assert_eq!(backoff.next_delay(), Duration::from_secs(150));
    }

    #[test]
    fn runs_do_not_share_state() {
        let policy = BackoffPolicy::new(Duration::from_millis(5), 3);
        let mut first = policy.start();
        first.next_delay();
        first.next_delay();

        let mut second = policy.start();
        assert_eq!(second.next_delay(), Duration::from_millis(5));
        assert_eq!(first.next_delay(), Duration::from_millis(45));
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let mut backoff = BackoffPolicy::new(Duration::MAX, 2).start();
        assert_eq!(backoff.next_delay(), Duration::MAX);
        assert_eq!(backoff.next_delay(), Duration::MAX);
    }
}
