//! The reveal power-up: a limited number of timed windows in which the opponent is visible.

use web_time::{Duration, Instant};

/// Charges and the active window of one player's power-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerUp {
    max_charges: u8,
    charges_remaining: u8,
    window: Duration,
    active_until: Option<Instant>,
}

impl PowerUp {
    /// Creates a full power-up.
    #[must_use]
    pub const fn new(max_charges: u8, window: Duration) -> Self {
        Self {
            max_charges,
            charges_remaining: max_charges,
            window,
            active_until: None,
        }
    }

    /// Charges left this round.
    #[must_use]
    pub const fn charges_remaining(&self) -> u8 {
        self.charges_remaining
    }

    /// Charges at the start of a round.
    #[must_use]
    pub const fn max_charges(&self) -> u8 {
        self.max_charges
    }

    /// Returns `true` while `now` is inside the activation window.
    #[must_use]
    pub fn is_active(&self, now: Instant) -> bool {
        self.active_until.is_some_and(|until| now < until)
    }

    /// Returns `true` if a window was opened and has not been closed by
    /// [`expire_if_elapsed`](Self::expire_if_elapsed) yet.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.active_until.is_some()
    }

    /// Opens a window `[now, now + window)` and spends a charge.
    ///
    /// Returns `false` and changes nothing if no charge is left or a window is already active.
    pub fn try_activate(&mut self, now: Instant) -> bool {
        if self.charges_remaining == 0 || self.is_active(now) {
            return false;
        }
        self.charges_remaining -= 1;
        self.active_until = Some(now + self.window);
        true
    }

    /// Closes an open window whose end has passed. Returns `true` exactly once per window.
    pub fn expire_if_elapsed(&mut self, now: Instant) -> bool {
        match self.active_until {
            Some(until) if now >= until => {
                self.active_until = None;
                true
            }
            _ => false,
        }
    }

    /// Closes any open window without refunding the charge.
    pub fn deactivate(&mut self) {
        self.active_until = None;
    }

    /// Refills the charges and closes any window.
    pub fn reset(&mut self) {
        self.charges_remaining = self.max_charges;
        self.active_until = None;
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

    const WINDOW: Duration = Duration::from_millis(5_000);

    #[test]
    fn window_is_half_open() {
        let t0 = Instant::now();
        let mut power = PowerUp::new(3, WINDOW);
        assert!(power.try_activate(t0));
        assert!(power.is_active(t0));
        assert!(power.is_active(t0 + Duration::from_millis(4_999)));
        assert!(!power.is_active(t0 + WINDOW));
    }

    #[test]
    fn cannot_stack_while_active() {
        let t0 = Instant::now();
        let mut power = PowerUp::new(3, WINDOW);
        assert!(power.try_activate(t0));
        assert!(!power.try_activate(t0 + Duration::from_millis(100)));
        assert_eq!(power.charges_remaining(), 2);
    }

    #[test]
    fn three_charges_then_empty() {
        let mut now = Instant::now();
        let mut power = PowerUp::new(3, WINDOW);
        for expected in [2, 1, 0] {
            assert!(power.try_activate(now));
            assert_eq!(power.charges_remaining(), expected);
            now += WINDOW;
            assert!(power.expire_if_elapsed(now));
        }
        assert!(!power.try_activate(now));
        assert_eq!(power.charges_remaining(), 0);
    }

    #[test]
    fn expiry_reports_once() {
        let t0 = Instant::now();
        let mut power = PowerUp::new(1, WINDOW);
        power.try_activate(t0);
        assert!(!power.expire_if_elapsed(t0 + Duration::from_millis(10)));
        assert!(power.expire_if_elapsed(t0 + WINDOW));
        assert!(!power.expire_if_elapsed(t0 + WINDOW * 2));
        assert!(!power.is_open());
    }

    #[test]
    fn reset_refills() {
        let t0 = Instant::now();
        let mut power = PowerUp::new(3, WINDOW);
        power.try_activate(t0);
        power.reset();
        assert_eq!(power.charges_remaining(), 3);
        assert!(!power.is_active(t0));
    }
}
