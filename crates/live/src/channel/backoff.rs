// Capped exponential reconnect backoff.

use std::time::Duration;

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Reconnection bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    initial_delay: Duration,
    max_delay: Duration,
}

impl ReconnectPolicy {
    /// A zero initial delay falls back to the default; the maximum is raised
    /// to at least the initial delay.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        let initial_delay =
            if initial_delay.is_zero() { DEFAULT_INITIAL_DELAY } else { initial_delay };
        Self { initial_delay, max_delay: max_delay.max(initial_delay) }
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

/// Delay to wait before the next reconnect attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, current: policy.initial_delay }
    }

    /// The delay the next scheduled reconnect will use.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Take the current delay and double it for the following failure.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = delay.saturating_mul(2).min(self.policy.max_delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.policy.initial_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn doubles_from_initial_and_caps_at_max() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.peek(), Duration::from_secs(4));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn policy_normalizes_degenerate_bounds() {
        let zero = ReconnectPolicy::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(zero.initial_delay(), DEFAULT_INITIAL_DELAY);
        assert_eq!(zero.max_delay(), DEFAULT_INITIAL_DELAY);

        let inverted = ReconnectPolicy::new(Duration::from_secs(5), Duration::from_secs(2));
        assert_eq!(inverted.max_delay(), Duration::from_secs(5));
    }

    proptest! {
        #[test]
        fn delays_are_monotonic_and_bounded(
            initial_ms in 1u64..5_000,
            max_ms in 1u64..120_000,
            failures in 1usize..64,
        ) {
            let policy = ReconnectPolicy::new(
                Duration::from_millis(initial_ms),
                Duration::from_millis(max_ms),
            );
            let mut backoff = Backoff::new(policy);

            let first = backoff.next_delay();
            prop_assert_eq!(first, policy.initial_delay());

            let mut previous = first;
            for _ in 1..failures {
                let delay = backoff.next_delay();
                prop_assert!(delay >= previous);
                prop_assert!(delay <= policy.max_delay());
                previous = delay;
            }
        }
    }
}
