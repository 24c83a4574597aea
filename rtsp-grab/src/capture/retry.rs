//! Bounded retry with a constant delay.

use std::time::Duration;

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first failure.
    pub max_retries: u32,
    /// Constant delay before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then try again. `attempt` counts failures so far (1-based).
    Retry { attempt: u32, delay: Duration },
    /// The bound is reached; `attempts` counts every failed attempt.
    Exhausted { attempts: u32 },
}

/// Consecutive failure counter owned by the supervisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn record_failure(&mut self, policy: &RetryPolicy) -> RetryDecision {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt <= policy.max_retries {
            RetryDecision::Retry {
                attempt: self.attempt,
                delay: policy.delay,
            }
        } else {
            RetryDecision::Exhausted {
                attempts: self.attempt,
            }
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_retries_then_exhausted() {
        let policy = RetryPolicy::new(5, Duration::from_secs(5));
        let mut state = RetryState::new();

        for expected in 1..=5 {
            assert_eq!(
                state.record_failure(&policy),
                RetryDecision::Retry {
                    attempt: expected,
                    delay: Duration::from_secs(5)
                }
            );
        }
        assert_eq!(
            state.record_failure(&policy),
            RetryDecision::Exhausted { attempts: 6 }
        );
    }

    #[test]
    fn test_delay_is_constant() {
        let policy = RetryPolicy::new(10, Duration::from_millis(250));
        let mut state = RetryState::new();
        let delays: Vec<_> = (0..10)
            .map(|_| match state.record_failure(&policy) {
                RetryDecision::Retry { delay, .. } => delay,
                RetryDecision::Exhausted { .. } => panic!("exhausted early"),
            })
            .collect();
        assert!(delays.iter().all(|d| *d == Duration::from_millis(250)));
    }

    #[test]
    fn test_reset_restores_full_budget() {
        let policy = RetryPolicy::new(1, Duration::ZERO);
        let mut state = RetryState::new();
        assert!(matches!(state.record_failure(&policy), RetryDecision::Retry { .. }));
        state.reset();
        assert_eq!(state.attempt(), 0);
        assert!(matches!(state.record_failure(&policy), RetryDecision::Retry { .. }));
        assert!(matches!(state.record_failure(&policy), RetryDecision::Exhausted { .. }));
    }

    #[test]
    fn test_zero_retries_escalates_immediately() {
        let mut state = RetryState::new();
        assert_eq!(
            state.record_failure(&RetryPolicy::new(0, Duration::ZERO)),
            RetryDecision::Exhausted { attempts: 1 }
        );
    }
}
