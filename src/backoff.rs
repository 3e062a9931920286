//! Delay between dial attempts

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Growth of the pause between failed dial attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectDelay {
    /// `attempt × unit`
    #[default]
    Linear,
    /// `fib(attempt) × unit` (1, 1, 2, 3, 5, ...)
    Fibonacci,
}

impl ReconnectDelay {
    /// Pause after the failed attempt numbered `attempt` (1-based).
    ///
    /// A non-zero `max` caps the result.
    pub fn delay(&self, attempt: u32, unit: Duration, max: Duration) -> Duration {
        let factor = match self {
            ReconnectDelay::Linear => u64::from(attempt),
            ReconnectDelay::Fibonacci => fibonacci(attempt),
        };
        let delay = unit.saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX));
        if max.is_zero() {
            delay
        } else {
            delay.min(max)
        }
    }
}

fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        (a, b) = (b, a.saturating_add(b));
    }
    a
}
