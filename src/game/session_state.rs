//! The single mutable state of a session.

use web_time::Instant;

use crate::attributes::Attribute;
use crate::game::{Acceleration, ButtonLatch, GamePhase, Outcome, PowerUp, RoundTimer};
use crate::sessions::config::GameConfig;
use crate::shared_state::SharedState;
use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::Role;

/// Everything one peer knows about the session.
///
/// Owned by the [`GameSession`](crate::GameSession) and lent by `&mut` to the
/// [`GameStateMachine`](crate::GameStateMachine) and the [`PlayLoop`](crate::PlayLoop).
#[derive(Debug, Clone)]
pub struct SessionState {
    pub(crate) shared: SharedState,
    pub(crate) config: GameConfig,
    pub(crate) timer: RoundTimer,
    pub(crate) power_up: PowerUp,
    pub(crate) acceleration: Acceleration,
    pub(crate) latch: ButtonLatch,
    pub(crate) outcome: Option<Outcome>,
    pub(crate) connected: bool,
}

impl SessionState {
    /// Creates a disconnected session in SELECT.
    #[must_use]
    pub fn new(role: Role, config: GameConfig) -> Self {
        Self {
            shared: SharedState::new(role, &config),
            config,
            timer: RoundTimer::new(config.round_duration),
            power_up: PowerUp::new(config.power_up_charges, config.power_up_window),
            acceleration: Acceleration::default(),
            latch: ButtonLatch::default(),
            outcome: None,
            connected: false,
        }
    }

    /// This peer's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.shared.role()
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> GamePhase {
        self.shared.phase()
    }

    /// The shared attributes.
    #[must_use]
    pub const fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// The game configuration.
    #[must_use]
    pub const fn config(&self) -> &GameConfig {
        &self.config
    }

    /// The round countdown.
    #[must_use]
    pub const fn timer(&self) -> &RoundTimer {
        &self.timer
    }

    /// This peer's power-up.
    #[must_use]
    pub const fn power_up(&self) -> &PowerUp {
        &self.power_up
    }

    /// The current step multiplier.
    #[must_use]
    pub const fn acceleration(&self) -> Acceleration {
        self.acceleration
    }

    /// The result of the last round, while in OVER.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Whether the link to the peer is up.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    fn reset_locals(&mut self) {
        self.timer.clear();
        self.power_up.reset();
        self.acceleration = Acceleration::default();
        self.latch.reset();
        self.outcome = None;
    }

    /// Back to SELECT for another round. Changed local attributes are staged for the peer.
    pub(crate) fn reset_round(&mut self) {
        self.shared.reset_session(&self.config);
        self.reset_locals();
    }

    /// Back to SELECT for a fresh link. Every local attribute is staged for the peer.
    pub(crate) fn resync(&mut self) {
        self.shared.resync();
        self.reset_locals();
    }

    /// Whether the reveal window is open at `now`.
    #[must_use]
    pub fn is_revealing(&self, now: Instant) -> bool {
        self.power_up.is_active(now)
    }
}

impl InvariantChecker for SessionState {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for attribute in Attribute::ALL {
            let value = self.shared.read(attribute);
            if !attribute.accepts(value, self.config.arena) {
                return Err(InvariantViolation::new(
                    "SessionState",
                    "every attribute holds a value in its domain",
                )
                .with_details(format!("{} = {}", attribute, value)));
            }
        }

        let phase = self.phase();
        if self.timer.is_running() != (phase == GamePhase::Play) {
            return Err(InvariantViolation::new(
                "SessionState",
                "the round timer runs exactly while in PLAY",
            )
            .with_details(format!(
                "phase={}, timer_running={}",
                phase,
                self.timer.is_running()
            )));
        }

        if self.power_up.is_open() != self.shared.local_power_up() {
            return Err(InvariantViolation::new(
                "SessionState",
                "the local power-up flag mirrors the open window",
            )
            .with_details(format!(
                "window_open={}, flag={}",
                self.power_up.is_open(),
                self.shared.local_power_up()
            )));
        }

        if self.power_up.charges_remaining() > self.power_up.max_charges() {
            return Err(InvariantViolation::new(
                "SessionState",
                "charges_remaining <= max_charges",
            )
            .with_details(format!(
                "charges_remaining={}, max_charges={}",
                self.power_up.charges_remaining(),
                self.power_up.max_charges()
            )));
        }

        if self.outcome.is_some() && phase != GamePhase::Over {
            return Err(InvariantViolation::new(
                "SessionState",
                "an outcome exists only in OVER",
            )
            .with_details(format!("phase={}", phase)));
        }

        Ok(())
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
    use crate::game::{PlayerType, Position};

    #[test]
    fn fresh_state_is_consistent() {
        let state = SessionState::new(Role::Host, GameConfig::default());
        assert!(state.check_invariants().is_ok());
        assert!(!state.is_connected());
        assert_eq!(state.phase(), GamePhase::Select);
        assert_eq!(state.acceleration().get(), 5);
        assert_eq!(state.power_up().charges_remaining(), 3);
    }

    #[test]
    fn running_timer_outside_play_is_flagged() {
        let mut state = SessionState::new(Role::Guest, GameConfig::default());
        state.timer.start(Instant::now());
        let violation = state.check_invariants().unwrap_err();
        assert!(violation.invariant.contains("timer"));
    }

    #[test]
    fn open_window_without_flag_is_flagged() {
        let mut state = SessionState::new(Role::Guest, GameConfig::default());
        state.power_up.try_activate(Instant::now());
        let violation = state.check_invariants().unwrap_err();
        assert!(violation.invariant.contains("power-up"));
    }

    #[test]
    fn reset_round_restores_defaults() {
        let now = Instant::now();
        let mut state = SessionState::new(Role::Host, GameConfig::default());
        state.shared.set_local_selection(PlayerType::Dragon).unwrap();
        state
            .shared
            .set_local_position(Position::new(100, 100))
            .unwrap();
        state.power_up.try_activate(now);
        state.acceleration.cycle();
        state.shared.drain_outbox().for_each(drop);

        state.reset_round();
        assert_eq!(state.shared.local_selection(), PlayerType::Unchosen);
        assert_eq!(state.shared.local_position(), Position::new(10, 120));
        assert_eq!(state.power_up.charges_remaining(), 3);
        assert_eq!(state.acceleration.get(), 5);
        assert!(state.shared.pending_writes() > 0);
    }
}
