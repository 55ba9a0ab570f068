//! Header timestamps that never run backwards.

use crate::msg::Time;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock stamps driven by a monotonic clock.
///
/// The wall time is sampled once at construction; every later stamp is that
/// anchor plus the elapsed `Instant`, so NTP steps cannot reorder messages.
#[derive(Debug, Clone)]
pub struct StampClock {
    anchor_wall: std::time::Duration,
    anchor: Instant,
}

impl StampClock {
    pub fn new() -> Self {
        let anchor_wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            anchor_wall,
            anchor: Instant::now(),
        }
    }

    pub fn now(&self) -> Time {
        Time::from_unix(self.anchor_wall + self.anchor.elapsed())
    }
}

impl Default for StampClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamps_non_decreasing() {
        let clock = StampClock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn test_stamp_near_wall_time() {
        let clock = StampClock::new();
        let wall = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        let stamp = clock.now();
        assert!((stamp.sec as i64 - wall.as_secs() as i64).abs() <= 1);
    }
}
