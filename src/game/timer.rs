//! The round countdown.

use web_time::{Duration, Instant};

/// Counts a fixed duration down from the moment PLAY is entered.
///
/// `remaining = duration - (now - start)`, saturating at zero. A cleared timer reports the full
/// duration and never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimer {
    duration: Duration,
    started_at: Option<Instant>,
}

impl RoundTimer {
    /// Creates a stopped timer.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: None,
        }
    }

    /// Starts (or restarts) the countdown at `now`.
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    /// Stops the countdown and forgets the start instant.
    pub fn clear(&mut self) {
        self.started_at = None;
    }

    /// Returns `true` between [`start`](Self::start) and [`clear`](Self::clear).
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// The configured round length.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Time left at `now`.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(start) => self
                .duration
                .saturating_sub(now.saturating_duration_since(start)),
            None => self.duration,
        }
    }

    /// Time left at `now`, in whole milliseconds.
    #[must_use]
    pub fn remaining_ms(&self, now: Instant) -> u64 {
        self.remaining(now).as_millis() as u64
    }

    /// Returns `true` once a running timer has reached zero.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.is_running() && self.remaining(now).is_zero()
    }

    /// Renders milliseconds as `m:ss`, rounding partial seconds up so the display reads `0:00`
    /// only at zero.
    ///
    /// ```
    /// use princess_of_fire::RoundTimer;
    ///
    /// assert_eq!(RoundTimer::format_remaining(120_000), "2:00");
    /// assert_eq!(RoundTimer::format_remaining(59_001), "1:00");
    /// assert_eq!(RoundTimer::format_remaining(9_000), "0:09");
    /// assert_eq!(RoundTimer::format_remaining(0), "0:00");
    /// ```
    #[must_use]
    pub fn format_remaining(remaining_ms: u64) -> String {
        let seconds = remaining_ms.div_ceil(1000);
        format!("{}:{:02}", seconds / 60, seconds % 60)
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    const ROUND: Duration = Duration::from_millis(120_000);

    #[test]
    fn counts_down_from_start() {
        let t0 = Instant::now();
        let mut timer = RoundTimer::new(ROUND);
        timer.start(t0);
        assert_eq!(timer.remaining_ms(t0), 120_000);
        assert_eq!(timer.remaining_ms(t0 + Duration::from_millis(1_000)), 119_000);
        assert!(!timer.is_expired(t0 + Duration::from_millis(119_999)));
    }

    #[test]
    fn saturates_at_zero() {
        let t0 = Instant::now();
        let mut timer = RoundTimer::new(ROUND);
        timer.start(t0);
        assert_eq!(timer.remaining_ms(t0 + Duration::from_millis(120_000)), 0);
        assert_eq!(timer.remaining_ms(t0 + Duration::from_millis(120_001)), 0);
        assert!(timer.is_expired(t0 + Duration::from_millis(120_001)));
    }

    #[test]
    fn cleared_timer_never_expires() {
        let t0 = Instant::now();
        let mut timer = RoundTimer::new(ROUND);
        assert!(!timer.is_running());
        assert!(!timer.is_expired(t0 + Duration::from_secs(600)));
        timer.start(t0);
        timer.clear();
        assert_eq!(timer.remaining(t0 + Duration::from_secs(600)), ROUND);
    }

    #[test]
    fn clock_before_start_reads_full() {
        let t0 = Instant::now();
        let mut timer = RoundTimer::new(ROUND);
        timer.start(t0 + Duration::from_millis(50));
        assert_eq!(timer.remaining(t0), ROUND);
    }

    #[test]
    fn format_rounds_partial_seconds_up() {
        assert_eq!(RoundTimer::format_remaining(61_000), "1:01");
        assert_eq!(RoundTimer::format_remaining(60_999), "1:01");
        assert_eq!(RoundTimer::format_remaining(1), "0:01");
    }
}
