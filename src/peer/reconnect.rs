//! Reconnect policy with exponential backoff
//!
//! Shared by per-session ICE recovery and the signaling transport's
//! reconnect loop.

use std::time::Duration;

/// Reconnect policy configuration
///
/// Controls how reconnection attempts are made when a peer connection or
/// the signaling transport drops.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnection attempts (default: 5)
    pub max_attempts: u32,
    /// Initial backoff delay (default: 1s)
    pub base_delay: Duration,
    /// Maximum backoff delay (default: 30s)
    pub max_delay: Duration,
    /// Backoff multiplier (default: 2.0)
    pub multiplier: f64,
    /// Whether to add jitter to backoff (default: true)
    pub jitter_enabled: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_enabled: true,
        }
    }
}

impl ReconnectPolicy {
    /// Policy with aggressive reconnection (for low-latency scenarios)
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 1.5,
            jitter_enabled: true,
        }
    }

    /// Calculate backoff duration for a given attempt number (0-indexed)
    ///
    /// Exponential backoff with optional jitter of 0-25% of the delay.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let backoff_ms =
            (self.base_delay.as_millis() as f64) * self.multiplier.powi(attempt as i32);
        let backoff_ms = backoff_ms.min(self.max_delay.as_millis() as f64);

        let final_ms = if self.jitter_enabled {
            backoff_ms + rand::random::<f64>() * backoff_ms * 0.25
        } else {
            backoff_ms
        };

        Duration::from_millis(final_ms as u64)
    }

    /// Check if more retries are allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = ReconnectPolicy {
            jitter_enabled: false,
            ..Default::default()
        };

        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_max_clamp() {
        let policy = ReconnectPolicy {
            jitter_enabled: false,
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };

        assert_eq!(policy.backoff(10), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = ReconnectPolicy::default();
        for attempt in 0..4 {
            let base = ReconnectPolicy {
                jitter_enabled: false,
                ..policy.clone()
            }
            .backoff(attempt);
            let jittered = policy.backoff(attempt);
            assert!(jittered >= base);
            assert!(jittered <= base + base.mul_f64(0.25) + Duration::from_millis(1));
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            ..Default::default()
        };

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));
    }
}
