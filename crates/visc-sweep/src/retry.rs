//! One bounded polling primitive shared by artifact waits and queue drains.

use std::thread;
use std::time::{Duration, Instant};

use visc_core::SweepError;

/// Attempt cap, fixed backoff between attempts and optional wall-clock limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    Ready(T),
    Pending(T),
}

/// Final state of a wait.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    Ready { value: T, attempts: u32 },
    /// Limits reached; `last` is the value of the final probe.
    Exhausted { last: T, attempts: u32 },
}

impl<T> WaitOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            WaitOutcome::Ready { attempts, .. } | WaitOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_value(self) -> T {
        match self {
            WaitOutcome::Ready { value, .. } => value,
            WaitOutcome::Exhausted { last, .. } => last,
        }
    }
}

/// Calls `probe` until it reports ready or the policy is exhausted. The probe
/// receives the one-based attempt number. Probe errors end the wait.
pub fn wait_for<T, F>(policy: &RetryPolicy, mut probe: F) -> Result<WaitOutcome<T>, SweepError>
where
    F: FnMut(u32) -> Result<Probe<T>, SweepError>,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let last = match probe(attempt)? {
            Probe::Ready(value) => {
                return Ok(WaitOutcome::Ready {
                    value,
                    attempts: attempt,
                })
            }
            Probe::Pending(value) => value,
        };
        let out_of_attempts = attempt >= policy.attempts;
        let out_of_time = policy
            .timeout
            .map(|limit| started.elapsed() + policy.backoff > limit)
            .unwrap_or(false);
        if out_of_attempts || out_of_time {
            return Ok(WaitOutcome::Exhausted {
                last,
                attempts: attempt,
            });
        }
        if !policy.backoff.is_zero() {
            thread::sleep(policy.backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_on_third_attempt() {
        let outcome = wait_for(&RetryPolicy::new(5, Duration::ZERO), |attempt| {
            Ok(if attempt == 3 {
                Probe::Ready(attempt)
            } else {
                Probe::Pending(attempt)
            })
        })
        .expect("wait");
        assert_eq!(outcome, WaitOutcome::Ready { value: 3, attempts: 3 });
    }

    #[test]
    fn exhausted_keeps_last_probe() {
        let outcome = wait_for(&RetryPolicy::new(4, Duration::ZERO), |attempt| {
            Ok(Probe::Pending(attempt * 10))
        })
        .expect("wait");
        assert_eq!(outcome, WaitOutcome::Exhausted { last: 40, attempts: 4 });
    }

    #[test]
    fn timeout_ends_unbounded_attempts() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_millis(5))
            .with_timeout(Duration::from_millis(20));
        let outcome = wait_for(&policy, |_| Ok(Probe::Pending(()))).expect("wait");
        assert!(!outcome.is_ready());
        assert!(outcome.attempts() < 10);
    }

    #[test]
    fn probe_errors_propagate() {
        let err = wait_for::<(), _>(&RetryPolicy::new(3, Duration::ZERO), |_| {
            Err(SweepError::Connectivity(visc_core::ErrorInfo::new("lost", "gone")))
        })
        .expect_err("error");
        assert!(err.is_fatal_for_sweep());
    }
}
