// Progressive retry delays for detection failures, counted per entity
use crate::config::BackoffConfig;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    tiers: Vec<(u32, Duration)>,
    max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            tiers: config
                .tiers
                .iter()
                .map(|tier| (tier.up_to, Duration::from_secs(tier.delay_secs)))
                .collect(),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }

    /// Delay for the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        self.tiers
            .iter()
            .find(|(up_to, _)| failures <= *up_to)
            .map(|(_, delay)| *delay)
            .unwrap_or(self.max_delay)
    }
}

/// Consecutive failure counts keyed by commander, building or activity.
#[derive(Debug, Default)]
pub struct FailureTracker {
    policy: BackoffPolicy,
    counts: Mutex<HashMap<String, u32>>,
}

impl FailureTracker {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Count one more failure and return the new count with its retry delay.
    pub fn record_failure(&self, key: &str) -> (u32, Duration) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        (*count, self.policy.delay_for(*count))
    }

    /// Delay before retrying something that failed for reasons outside the
    /// entity itself; the streak is left as it is.
    pub fn first_delay(&self) -> Duration {
        self.policy.delay_for(1)
    }

    pub fn record_success(&self, key: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        if counts.remove(key).is_some_and(|n| n > 0) {
            log::debug!("✅ Failure count for '{}' reset", key);
        }
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 300)]
    #[case(2, 300)]
    #[case(3, 900)]
    #[case(4, 900)]
    #[case(5, 1800)]
    #[case(6, 1800)]
    #[case(7, 3600)]
    #[case(40, 3600)]
    fn default_tiers(#[case] failures: u32, #[case] secs: u64) {
        assert_eq!(BackoffPolicy::default().delay_for(failures), Duration::from_secs(secs));
    }

    #[test]
    fn tracker_escalates_and_resets_on_success() {
        let tracker = FailureTracker::new(BackoffPolicy::default());
        let delays: Vec<u64> = (0..3)
            .map(|_| tracker.record_failure("commander_1").1.as_secs())
            .collect();
        assert_eq!(delays, vec![300, 300, 900]);
        assert_eq!(tracker.failures("commander_1"), 3);

        tracker.record_success("commander_1");
        assert_eq!(tracker.failures("commander_1"), 0);
        assert_eq!(tracker.record_failure("commander_1"), (1, Duration::from_secs(300)));
    }

    #[test]
    fn entities_are_counted_separately() {
        let tracker = FailureTracker::new(BackoffPolicy::default());
        tracker.record_failure("barracks");
        tracker.record_failure("barracks");
        tracker.record_failure("stable");

        assert_eq!(tracker.failures("barracks"), 2);
        assert_eq!(tracker.failures("stable"), 1);
    }
}
