//! The screen collaborator: everything the scheduler core needs from the
//! device, plus its ADB-backed, dry-run and scripted implementations.

pub mod adb_screen;
pub mod dry_run;
pub mod fake;
pub mod matcher;
pub mod ocr;
pub mod region;

pub use adb_screen::AdbScreen;
pub use dry_run::DryRunScreen;
pub use fake::FakeScreen;
pub use region::SearchRegion;

use crate::error::AutomationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Reads and drives the game screen.
pub trait GameScreen: Send + Sync {
    /// Centre of the best match for `template` if it scores at least `threshold`.
    fn find_image(
        &self,
        template: &str,
        region: Option<&SearchRegion>,
        threshold: f32,
    ) -> impl Future<Output = Result<Option<Point>, AutomationError>> + Send;

    fn read_text_from_region(
        &self,
        region: &SearchRegion,
    ) -> impl Future<Output = Result<String, AutomationError>> + Send;

    fn click(&self, point: Point) -> impl Future<Output = Result<(), AutomationError>> + Send;

    fn press_key(&self, key: &str) -> impl Future<Output = Result<(), AutomationError>> + Send;

    /// Sleep a random time between `min` and `max` and return how long it was.
    fn wait_random(&self, min: Duration, max: Duration) -> impl Future<Output = Duration> + Send {
        let wait = random_between(min, max);
        async move {
            tokio::time::sleep(wait).await;
            wait
        }
    }
}

pub fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let lo = min.as_millis() as u64;
    let hi = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_between_stays_in_bounds() {
        let (min, max) = (Duration::from_millis(200), Duration::from_millis(900));
        for _ in 0..200 {
            let d = random_between(min, max);
            assert!(d >= min && d <= max, "{d:?} out of range");
        }
    }

    #[test]
    fn random_between_handles_inverted_bounds() {
        let d = random_between(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(d, Duration::from_secs(2));
    }
}
