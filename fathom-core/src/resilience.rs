// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Retry policy for transient filesystem contention.

use crate::error::{FathomError, Result};
use rand::random;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(200, Duration::from_millis(100))
    }
}

impl RetryPolicy {
    /// Constant backoff between attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let jitter_factor = if self.jitter > 0.0 {
            1.0 + (random::<f64>() - 0.5) * 2.0 * self.jitter
        } else {
            1.0
        };
        let jittered = base * jitter_factor;
        let clamped = jittered.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(clamped)
    }

    /// Run `operation`, sleeping and retrying while it fails transiently.
    ///
    /// Non-transient errors return immediately. Exhausting the budget
    /// yields [`FathomError::LockContention`].
    pub fn run<T, F>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error: Option<FathomError> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                thread::sleep(self.delay_for_attempt(attempt - 1));
            }

            match operation() {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "Succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(
            operation = operation_name,
            attempts = attempts,
            last_error = ?last_error.as_ref().map(|e| e.to_string()),
            "Retry budget exhausted"
        );
        Err(FathomError::LockContention {
            operation: operation_name.to_string(),
            attempts,
        })
    }
}
