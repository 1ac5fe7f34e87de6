//! Per-tick logic while a round is running.
//!
//! One [`PlayLoop::tick`] does, in order:
//!
//! 1. move the local player from the joystick, scaled by the acceleration;
//! 2. stage the new position if it changed;
//! 3. measure the distance to the opponent;
//! 4. on the host, end the round on a catch (checked first) or a timeout;
//! 5. expire or open the reveal window;
//! 6. warp on START;
//! 7. cycle the acceleration on A.

use web_time::Instant;

use crate::game::{
    distance, step, Buttons, GamePhase, GameStateMachine, InputSample, PhaseTrigger, Position,
    SessionState, Transition,
};
use crate::rng::Rng;
use crate::{GameError, Role};

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// This peer's position after the tick.
    pub local_position: Position,
    /// The opponent's position, while the reveal window is open.
    pub reveal: Option<Position>,
    /// Time left in the round.
    pub remaining_ms: u64,
    /// Distance between the players.
    pub distance: u64,
    /// Set when this tick ended the round (host only). No later step ran.
    pub transition: Option<Transition>,
    /// Set when a reveal window opened, with the charges left afterwards.
    pub power_up_activated: Option<u8>,
    /// Set when a reveal window closed.
    pub power_up_expired: bool,
    /// Set when START moved the player.
    pub warped: Option<Position>,
    /// Set when A changed the acceleration, with the new value.
    pub acceleration_changed: Option<u8>,
}

/// Drives one peer through a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayLoop {
    machine: GameStateMachine,
}

impl PlayLoop {
    /// Creates a play loop.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            machine: GameStateMachine::new(),
        }
    }

    /// Runs one tick.
    ///
    /// # Errors
    ///
    /// * [`GameError::NotConnected`] while the link is down.
    /// * [`GameError::WrongPhase`] outside PLAY.
    pub fn tick<R: Rng + ?Sized>(
        &self,
        state: &mut SessionState,
        input: &InputSample,
        now: Instant,
        rng: &mut R,
    ) -> Result<TickReport, GameError> {
        if !state.connected {
            return Err(GameError::NotConnected);
        }
        let phase = state.phase();
        if phase != GamePhase::Play {
            return Err(GameError::WrongPhase {
                expected: GamePhase::Play,
                actual: phase,
            });
        }

        let config = state.config;
        let pressed = state.latch.update(input.buttons);

        // 1-2. move and push
        let direction = config.joystick.direction(input);
        let mut position = step(
            state.shared.local_position(),
            direction,
            state.acceleration.get(),
            config.arena,
            config.edge_policy,
        );
        state.shared.set_local_position(position)?;

        // 3. distance
        let peer = state.shared.peer_position();
        let mut report = TickReport {
            local_position: position,
            reveal: None,
            remaining_ms: state.timer.remaining_ms(now),
            distance: distance(position, peer),
            transition: None,
            power_up_activated: None,
            power_up_expired: false,
            warped: None,
            acceleration_changed: None,
        };

        // 4. round end, proximity before timeout
        if state.role() == Role::Host {
            for trigger in [PhaseTrigger::Caught, PhaseTrigger::TimerExpired] {
                if let Some(transition) = self.machine.request(state, trigger, now)? {
                    report.transition = Some(transition);
                    return Ok(report);
                }
            }
        }

        // 5. power-up
        if state.power_up.expire_if_elapsed(now) {
            state.shared.set_local_power_up(false)?;
            report.power_up_expired = true;
        }
        if pressed.contains(Buttons::SELECT) && state.power_up.try_activate(now) {
            state.shared.set_local_power_up(true)?;
            report.power_up_activated = Some(state.power_up.charges_remaining());
        }
        if state.power_up.is_active(now) {
            report.reveal = Some(peer);
        }

        // 6. warp
        if pressed.contains(Buttons::START) {
            position = config.arena.random_position(rng);
            state.shared.set_local_position(position)?;
            report.local_position = position;
            report.distance = distance(position, peer);
            report.warped = Some(position);
        }

        // 7. acceleration
        if pressed.contains(Buttons::A) {
            report.acceleration_changed = Some(state.acceleration.cycle());
        }

        Ok(report)
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
    use crate::attributes::Attribute;
    use crate::game::{EndCause, PlayerType};
    use crate::rng::{Pcg32, SeedableRng};
    use crate::sessions::config::GameConfig;
    use crate::telemetry::InvariantChecker;
    use web_time::Duration;

    const LOOP: PlayLoop = PlayLoop::new();

    fn playing(role: Role, now: Instant) -> SessionState {
        let machine = GameStateMachine::new();
        let mut state = SessionState::new(role, GameConfig::default());
        state.connected = true;
        let (local, peer) = (PlayerType::Princess, PlayerType::Dragon);
        machine.select_character(&mut state, local).unwrap();
        let peer_selection = state.shared.table().peer_selection;
        state
            .shared
            .apply_remote(peer_selection, peer.code())
            .unwrap();
        match role {
            Role::Host => {
                machine
                    .request(&mut state, PhaseTrigger::StartRequested, now)
                    .unwrap();
            }
            Role::Guest => {
                state.shared.apply_remote(Attribute::GamePhase, 3).unwrap();
                machine
                    .observe_phase(&mut state, GamePhase::Select, GamePhase::Play, now)
                    .unwrap();
            }
        }
        state.shared.drain_outbox().for_each(drop);
        state
    }

    fn right() -> InputSample {
        InputSample {
            axis_x: 1023,
            axis_y: InputSample::CENTER,
            buttons: Buttons::NONE,
        }
    }

    #[test]
    fn refuses_to_run_outside_play() {
        let mut state = SessionState::new(Role::Host, GameConfig::default());
        let mut rng = Pcg32::seed_from_u64(1);
        let now = Instant::now();
        assert_eq!(
            LOOP.tick(&mut state, &InputSample::neutral(), now, &mut rng),
            Err(GameError::NotConnected)
        );
        state.connected = true;
        assert_eq!(
            LOOP.tick(&mut state, &InputSample::neutral(), now, &mut rng),
            Err(GameError::WrongPhase {
                expected: GamePhase::Play,
                actual: GamePhase::Select,
            })
        );
    }

    #[test]
    fn moves_by_acceleration_and_pushes() {
        let now = Instant::now();
        let mut state = playing(Role::Guest, now);
        let mut rng = Pcg32::seed_from_u64(1);
        let report = LOOP.tick(&mut state, &right(), now, &mut rng).unwrap();
        assert_eq!(report.local_position, Position::new(305, 120));
        let writes: Vec<_> = state.shared.drain_outbox().collect();
        assert_eq!(writes, vec![(Attribute::GuestX, 305)]);
    }

    #[test]
    fn neutral_stick_stages_nothing() {
        let now = Instant::now();
        let mut state = playing(Role::Guest, now);
        let mut rng = Pcg32::seed_from_u64(1);
        LOOP.tick(&mut state, &InputSample::neutral(), now, &mut rng)
            .unwrap();
        assert_eq!(state.shared.pending_writes(), 0);
    }

    #[test]
    fn host_ends_round_on_catch_before_timeout() {
        let now = Instant::now();
        let mut state = playing(Role::Host, now);
        state.shared.apply_remote(Attribute::GuestX, 14).unwrap();
        let mut rng = Pcg32::seed_from_u64(1);
        let late = now + Duration::from_millis(200_000);
        let report = LOOP
            .tick(&mut state, &InputSample::neutral(), late, &mut rng)
            .unwrap();
        let transition = report.transition.unwrap();
        assert_eq!(transition.cause, Some(EndCause::Caught));
        assert_eq!(state.phase(), GamePhase::Over);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn host_ends_round_on_timeout() {
        let now = Instant::now();
        let mut state = playing(Role::Host, now);
        let mut rng = Pcg32::seed_from_u64(1);
        let report = LOOP
            .tick(
                &mut state,
                &InputSample::neutral(),
                now + Duration::from_millis(120_000),
                &mut rng,
            )
            .unwrap();
        assert_eq!(report.remaining_ms, 0);
        assert_eq!(report.transition.unwrap().cause, Some(EndCause::Timeout));
    }

    #[test]
    fn guest_never_ends_the_round() {
        let now = Instant::now();
        let mut state = playing(Role::Guest, now);
        state.shared.apply_remote(Attribute::HostX, 298).unwrap();
        let mut rng = Pcg32::seed_from_u64(1);
        let report = LOOP
            .tick(
                &mut state,
                &InputSample::neutral(),
                now + Duration::from_millis(130_000),
                &mut rng,
            )
            .unwrap();
        assert_eq!(report.transition, None);
        assert_eq!(report.distance, 2);
        assert_eq!(state.phase(), GamePhase::Play);
    }

    #[test]
    fn power_up_reveals_then_expires() {
        let now = Instant::now();
        let mut state = playing(Role::Guest, now);
        let mut rng = Pcg32::seed_from_u64(1);
        let select = InputSample::with_buttons(Buttons::SELECT);

        let report = LOOP.tick(&mut state, &select, now, &mut rng).unwrap();
        assert_eq!(report.power_up_activated, Some(2));
        assert_eq!(report.reveal, Some(Position::new(10, 120)));
        assert!(state.shared.local_power_up());

        // held button does not fire again
        let later = now + Duration::from_millis(1_000);
        let report = LOOP.tick(&mut state, &select, later, &mut rng).unwrap();
        assert_eq!(report.power_up_activated, None);
        assert!(report.reveal.is_some());

        let expired = now + Duration::from_millis(5_000);
        let report = LOOP
            .tick(&mut state, &InputSample::neutral(), expired, &mut rng)
            .unwrap();
        assert!(report.power_up_expired);
        assert_eq!(report.reveal, None);
        assert!(!state.shared.local_power_up());
        let writes: Vec<_> = state.shared.drain_outbox().collect();
        assert_eq!(
            writes,
            vec![(Attribute::GuestPowerUp, 1), (Attribute::GuestPowerUp, 0)]
        );
    }

    #[test]
    fn charges_run_out() {
        let mut now = Instant::now();
        let mut state = playing(Role::Guest, now);
        let mut rng = Pcg32::seed_from_u64(1);
        let select = InputSample::with_buttons(Buttons::SELECT);
        for expected in [2, 1, 0] {
            let report = LOOP.tick(&mut state, &select, now, &mut rng).unwrap();
            assert_eq!(report.power_up_activated, Some(expected));
            LOOP.tick(&mut state, &InputSample::neutral(), now, &mut rng)
                .unwrap();
            now += Duration::from_millis(5_000);
        }
        let report = LOOP.tick(&mut state, &select, now, &mut rng).unwrap();
        assert_eq!(report.power_up_activated, None);
        assert_eq!(state.power_up.charges_remaining(), 0);
    }

    #[test]
    fn warp_lands_in_bounds_and_is_pushed() {
        let now = Instant::now();
        let mut state = playing(Role::Guest, now);
        let mut rng = Pcg32::seed_from_u64(7);
        let start = InputSample::with_buttons(Buttons::START);
        let report = LOOP.tick(&mut state, &start, now, &mut rng).unwrap();
        let warped = report.warped.unwrap();
        assert!(state.config.arena.contains(warped));
        assert_eq!(state.shared.local_position(), warped);
        assert_eq!(report.local_position, warped);
    }

    #[test]
    fn a_button_cycles_acceleration() {
        let now = Instant::now();
        let mut state = playing(Role::Guest, now);
        let mut rng = Pcg32::seed_from_u64(1);
        let a = InputSample::with_buttons(Buttons::A);
        let report = LOOP.tick(&mut state, &a, now, &mut rng).unwrap();
        assert_eq!(report.acceleration_changed, Some(1));
        LOOP.tick(&mut state, &InputSample::neutral(), now, &mut rng)
            .unwrap();
        let report = LOOP.tick(&mut state, &right(), now, &mut rng).unwrap();
        assert_eq!(report.local_position, Position::new(301, 120));
    }
}
