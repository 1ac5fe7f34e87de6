//! Phase transitions: triggers, guards and entry effects.
//!
//! The host is authoritative. It evaluates every trigger, its own and the guest's
//! [`PhaseRequest`](crate::attributes::Attribute::PhaseRequest)s, and announces the result
//! through [`GamePhase`](crate::attributes::Attribute::GamePhase). The guest forwards its
//! requests and runs the entry effects when the announcement arrives.

use tracing::{debug, trace};
use web_time::Instant;

use crate::game::{distance, EndCause, GamePhase, Outcome, PlayerType, SessionState};
use crate::{GameError, Role};

/// Something that may move the session to another phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseTrigger {
    /// SELECT → TUTORIAL.
    TutorialRequested,
    /// TUTORIAL → SELECT.
    TutorialExit,
    /// SELECT → PLAY, once both players picked distinct characters.
    StartRequested,
    /// PLAY → OVER, when the round timer reaches zero.
    TimerExpired,
    /// PLAY → OVER, when the players are within the catch radius.
    Caught,
    /// OVER → SELECT.
    PlayAgain,
}

impl PhaseTrigger {
    /// The phase this trigger applies in.
    #[must_use]
    pub const fn source(self) -> GamePhase {
        match self {
            Self::TutorialRequested | Self::StartRequested => GamePhase::Select,
            Self::TutorialExit => GamePhase::Tutorial,
            Self::TimerExpired | Self::Caught => GamePhase::Play,
            Self::PlayAgain => GamePhase::Over,
        }
    }

    /// The phase this trigger leads to.
    #[must_use]
    pub const fn target(self) -> GamePhase {
        match self {
            Self::TutorialRequested => GamePhase::Tutorial,
            Self::TutorialExit | Self::PlayAgain => GamePhase::Select,
            Self::StartRequested => GamePhase::Play,
            Self::TimerExpired | Self::Caught => GamePhase::Over,
        }
    }

    /// The end cause recorded when this trigger ends a round.
    #[must_use]
    pub const fn end_cause(self) -> Option<EndCause> {
        match self {
            Self::TimerExpired => Some(EndCause::Timeout),
            Self::Caught => Some(EndCause::Caught),
            _ => None,
        }
    }

    /// Maps a guest's phase request to the trigger it stands for in `current`.
    ///
    /// A request for SELECT means "exit the tutorial" or "play again" depending on where the
    /// host is. Returns `None` when the request has no meaning in `current`.
    #[must_use]
    pub const fn for_request(current: GamePhase, requested: GamePhase) -> Option<Self> {
        match (current, requested) {
            (_, GamePhase::Tutorial) => Some(Self::TutorialRequested),
            (_, GamePhase::Play) => Some(Self::StartRequested),
            (GamePhase::Tutorial, GamePhase::Select) => Some(Self::TutorialExit),
            (GamePhase::Over, GamePhase::Select) => Some(Self::PlayAgain),
            _ => None,
        }
    }
}

/// A phase change that took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    /// The phase that was left.
    pub from: GamePhase,
    /// The phase that was entered.
    pub to: GamePhase,
    /// Why the round ended. Set only on PLAY → OVER, and `None` there only if the peer never
    /// announced a cause.
    pub cause: Option<EndCause>,
}

impl Transition {
    /// Returns `true` if the transition is in the legal table.
    #[must_use]
    pub const fn is_legal(&self) -> bool {
        self.from.can_transition_to(self.to)
    }
}

/// Evaluates triggers against a [`SessionState`].
///
/// The machine itself is stateless; everything it reads and writes lives in the session state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameStateMachine;

impl GameStateMachine {
    /// Creates a state machine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns `true` if the guard of `trigger` holds.
    ///
    /// | Trigger | Guard |
    /// |---------|-------|
    /// | `StartRequested` | both characters chosen and distinct |
    /// | `TimerExpired` | the round timer reached zero |
    /// | `Caught` | distance ≤ catch radius |
    /// | others | none |
    #[must_use]
    pub fn guard(&self, state: &SessionState, trigger: PhaseTrigger, now: Instant) -> bool {
        match trigger {
            PhaseTrigger::StartRequested => {
                let local = state.shared.local_selection();
                let peer = state.shared.peer_selection();
                local.is_chosen() && peer.is_chosen() && local != peer
            }
            PhaseTrigger::TimerExpired => state.timer.is_expired(now),
            PhaseTrigger::Caught => {
                distance(
                    state.shared.local_position(),
                    state.shared.peer_position(),
                ) <= state.config.catch_radius
            }
            PhaseTrigger::TutorialRequested
            | PhaseTrigger::TutorialExit
            | PhaseTrigger::PlayAgain => true,
        }
    }

    /// Evaluates a trigger raised on this peer.
    ///
    /// Returns `Ok(None)` when the trigger does not apply in the current phase or its guard
    /// fails. On the guest a passing request is forwarded as a phase request and `Ok(None)` is
    /// returned too; the transition arrives later as a phase notification.
    pub fn request(
        &self,
        state: &mut SessionState,
        trigger: PhaseTrigger,
        now: Instant,
    ) -> Result<Option<Transition>, GameError> {
        let current = state.phase();
        if trigger.source() != current {
            trace!("Ignoring {:?} in phase {}", trigger, current);
            return Ok(None);
        }
        if !self.guard(state, trigger, now) {
            trace!("Guard of {:?} failed in phase {}", trigger, current);
            return Ok(None);
        }

        match state.role() {
            Role::Guest => {
                // Round ends are decided by the host alone
                if trigger.target() != GamePhase::Over {
                    debug!("Requesting phase {} from host", trigger.target());
                    state.shared.request_phase(trigger.target())?;
                }
                Ok(None)
            }
            Role::Host => {
                let transition = Transition {
                    from: current,
                    to: trigger.target(),
                    cause: trigger.end_cause(),
                };
                self.enter(state, transition, now)?;
                state.shared.set_phase(transition.to)?;
                debug!(
                    "Phase {} -> {} ({:?})",
                    transition.from, transition.to, trigger
                );
                Ok(Some(transition))
            }
        }
    }

    /// Evaluates a phase request received from the guest. Host only.
    ///
    /// # Errors
    ///
    /// [`GameError::IllegalTransition`] for a request for OVER, which only the host decides.
    pub fn handle_phase_request(
        &self,
        state: &mut SessionState,
        requested: GamePhase,
        now: Instant,
    ) -> Result<Option<Transition>, GameError> {
        let current = state.phase();
        if requested == GamePhase::Over {
            return Err(GameError::IllegalTransition {
                from: current,
                to: requested,
            });
        }
        match PhaseTrigger::for_request(current, requested) {
            Some(trigger) => self.request(state, trigger, now),
            None => {
                trace!("Ignoring stale request for {} in {}", requested, current);
                Ok(None)
            }
        }
    }

    /// Runs the entry effects of a phase change announced by the host. Guest only.
    ///
    /// The mirror already holds the new phase. An announced change outside the legal table is
    /// still followed; callers check [`Transition::is_legal`] to report it.
    pub fn observe_phase(
        &self,
        state: &mut SessionState,
        from: GamePhase,
        to: GamePhase,
        now: Instant,
    ) -> Result<Transition, GameError> {
        let cause = if to == GamePhase::Over {
            state.shared.end_cause()
        } else {
            None
        };
        let transition = Transition { from, to, cause };
        self.enter(state, transition, now)?;
        debug!("Host moved phase {} -> {}", from, to);
        Ok(transition)
    }

    fn enter(
        &self,
        state: &mut SessionState,
        transition: Transition,
        now: Instant,
    ) -> Result<(), GameError> {
        match transition.to {
            GamePhase::Play => state.timer.start(now),
            GamePhase::Over => {
                state.timer.clear();
                if state.power_up.is_open() {
                    state.power_up.deactivate();
                    state.shared.set_local_power_up(false)?;
                }
                if state.role() == Role::Host {
                    // Written before the phase so the guest sees the cause first
                    state.shared.set_end_cause(transition.cause)?;
                }
                let local = state.shared.local_selection();
                state.outcome = transition
                    .cause
                    .map(|cause| Outcome::resolve(cause, local));
            }
            GamePhase::Select if transition.from == GamePhase::Over => state.reset_round(),
            GamePhase::Select | GamePhase::Tutorial => {
                if transition.from == GamePhase::Play {
                    state.timer.clear();
                }
            }
        }
        Ok(())
    }

    /// Picks this peer's character. `Unchosen` clears the choice.
    ///
    /// # Errors
    ///
    /// * [`GameError::WrongPhase`] outside SELECT.
    /// * [`GameError::CharacterTaken`] if the opponent already holds `character`.
    pub fn select_character(
        &self,
        state: &mut SessionState,
        character: PlayerType,
    ) -> Result<(), GameError> {
        let phase = state.phase();
        if phase != GamePhase::Select {
            return Err(GameError::WrongPhase {
                expected: GamePhase::Select,
                actual: phase,
            });
        }
        if character.is_chosen() && state.shared.peer_selection() == character {
            return Err(GameError::CharacterTaken { character });
        }
        state.shared.set_local_selection(character)
    }

    /// Settles two identical choices in the host's favour.
    ///
    /// On the guest, if both peers hold the same character, the guest's choice is dropped and
    /// `true` is returned. The host never yields.
    pub fn resolve_selection_conflict(&self, state: &mut SessionState) -> Result<bool, GameError> {
        let local = state.shared.local_selection();
        if state.role() == Role::Guest
            && local.is_chosen()
            && local == state.shared.peer_selection()
        {
            debug!("Host also chose {}; dropping our choice", local);
            state.shared.set_local_selection(PlayerType::Unchosen)?;
            return Ok(true);
        }
        Ok(false)
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
    use crate::game::Position;
    use crate::sessions::config::GameConfig;
    use crate::telemetry::InvariantChecker;
    use web_time::Duration;

    const MACHINE: GameStateMachine = GameStateMachine::new();

    fn host() -> SessionState {
        let mut state = SessionState::new(Role::Host, GameConfig::default());
        state.connected = true;
        state
    }

    fn guest() -> SessionState {
        let mut state = SessionState::new(Role::Guest, GameConfig::default());
        state.connected = true;
        state
    }

    fn host_with_selections(local: PlayerType, peer: PlayerType) -> SessionState {
        let mut state = host();
        MACHINE.select_character(&mut state, local).unwrap();
        state
            .shared
            .apply_remote(Attribute::GuestSelection, peer.code())
            .unwrap();
        state.shared.drain_outbox().for_each(drop);
        state
    }

    #[test]
    fn start_with_unchosen_is_a_no_op() {
        let now = Instant::now();
        let mut state = host_with_selections(PlayerType::Princess, PlayerType::Unchosen);
        let result = MACHINE.request(&mut state, PhaseTrigger::StartRequested, now);
        assert_eq!(result, Ok(None));
        assert_eq!(state.phase(), GamePhase::Select);
        assert_eq!(state.shared.pending_writes(), 0);
    }

    #[test]
    fn host_start_enters_play_and_starts_timer() {
        let now = Instant::now();
        let mut state = host_with_selections(PlayerType::Princess, PlayerType::Dragon);
        let transition = MACHINE
            .request(&mut state, PhaseTrigger::StartRequested, now)
            .unwrap()
            .unwrap();
        assert_eq!(transition.from, GamePhase::Select);
        assert_eq!(transition.to, GamePhase::Play);
        assert!(state.timer.is_running());
        let writes: Vec<_> = state.shared.drain_outbox().collect();
        assert_eq!(writes, vec![(Attribute::GamePhase, 3)]);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn trigger_from_wrong_phase_is_ignored() {
        let now = Instant::now();
        let mut state = host();
        assert_eq!(
            MACHINE.request(&mut state, PhaseTrigger::PlayAgain, now),
            Ok(None)
        );
        assert_eq!(
            MACHINE.request(&mut state, PhaseTrigger::TutorialExit, now),
            Ok(None)
        );
        assert_eq!(state.phase(), GamePhase::Select);
    }

    #[test]
    fn tutorial_round_trip() {
        let now = Instant::now();
        let mut state = host();
        MACHINE
            .request(&mut state, PhaseTrigger::TutorialRequested, now)
            .unwrap();
        assert_eq!(state.phase(), GamePhase::Tutorial);
        MACHINE
            .request(&mut state, PhaseTrigger::TutorialExit, now)
            .unwrap();
        assert_eq!(state.phase(), GamePhase::Select);
    }

    #[test]
    fn catch_writes_cause_before_phase() {
        let now = Instant::now();
        let mut state = host_with_selections(PlayerType::Princess, PlayerType::Dragon);
        MACHINE
            .request(&mut state, PhaseTrigger::StartRequested, now)
            .unwrap();
        state.shared.drain_outbox().for_each(drop);
        state
            .shared
            .set_local_position(Position::new(100, 100))
            .unwrap();
        state.shared.apply_remote(Attribute::GuestX, 105).unwrap();
        state.shared.apply_remote(Attribute::GuestY, 100).unwrap();
        state.shared.drain_outbox().for_each(drop);

        let transition = MACHINE
            .request(&mut state, PhaseTrigger::Caught, now)
            .unwrap()
            .unwrap();
        assert_eq!(transition.cause, Some(EndCause::Caught));
        let writes: Vec<_> = state.shared.drain_outbox().collect();
        assert_eq!(
            writes,
            vec![(Attribute::EndCause, 2), (Attribute::GamePhase, 4)]
        );
        let outcome = state.outcome.unwrap();
        assert_eq!(outcome.winner, PlayerType::Princess);
        assert!(outcome.local_won);
        assert!(!state.timer.is_running());
    }

    #[test]
    fn timer_guard_waits_for_zero() {
        let now = Instant::now();
        let mut state = host_with_selections(PlayerType::Dragon, PlayerType::Princess);
        MACHINE
            .request(&mut state, PhaseTrigger::StartRequested, now)
            .unwrap();
        let almost = now + Duration::from_millis(119_999);
        assert_eq!(
            MACHINE.request(&mut state, PhaseTrigger::TimerExpired, almost),
            Ok(None)
        );
        let done = now + Duration::from_millis(120_000);
        let transition = MACHINE
            .request(&mut state, PhaseTrigger::TimerExpired, done)
            .unwrap()
            .unwrap();
        assert_eq!(transition.cause, Some(EndCause::Timeout));
        assert!(state.outcome.unwrap().local_won);
    }

    #[test]
    fn guest_forwards_requests() {
        let now = Instant::now();
        let mut state = guest();
        assert_eq!(
            MACHINE.request(&mut state, PhaseTrigger::TutorialRequested, now),
            Ok(None)
        );
        assert_eq!(state.phase(), GamePhase::Select);
        let writes: Vec<_> = state.shared.drain_outbox().collect();
        assert_eq!(writes, vec![(Attribute::PhaseRequest, 2)]);
    }

    #[test]
    fn host_maps_requests_by_current_phase() {
        assert_eq!(
            PhaseTrigger::for_request(GamePhase::Tutorial, GamePhase::Select),
            Some(PhaseTrigger::TutorialExit)
        );
        assert_eq!(
            PhaseTrigger::for_request(GamePhase::Over, GamePhase::Select),
            Some(PhaseTrigger::PlayAgain)
        );
        assert_eq!(
            PhaseTrigger::for_request(GamePhase::Select, GamePhase::Select),
            None
        );
        let mut state = host();
        assert_eq!(
            MACHINE.handle_phase_request(&mut state, GamePhase::Over, Instant::now()),
            Err(GameError::IllegalTransition {
                from: GamePhase::Select,
                to: GamePhase::Over,
            })
        );
    }

    #[test]
    fn guest_follows_round_end_and_play_again() {
        let now = Instant::now();
        let mut state = guest();
        MACHINE
            .select_character(&mut state, PlayerType::Dragon)
            .unwrap();
        state.shared.apply_remote(Attribute::GamePhase, 3).unwrap();
        MACHINE
            .observe_phase(&mut state, GamePhase::Select, GamePhase::Play, now)
            .unwrap();
        assert!(state.timer.is_running());

        state.shared.apply_remote(Attribute::EndCause, 1).unwrap();
        state.shared.apply_remote(Attribute::GamePhase, 4).unwrap();
        let transition = MACHINE
            .observe_phase(&mut state, GamePhase::Play, GamePhase::Over, now)
            .unwrap();
        assert_eq!(transition.cause, Some(EndCause::Timeout));
        assert!(state.outcome.unwrap().local_won);
        state.shared.drain_outbox().for_each(drop);

        state.shared.apply_remote(Attribute::GamePhase, 1).unwrap();
        MACHINE
            .observe_phase(&mut state, GamePhase::Over, GamePhase::Select, now)
            .unwrap();
        assert_eq!(state.outcome, None);
        assert_eq!(state.shared.local_selection(), PlayerType::Unchosen);
        let writes: Vec<_> = state.shared.drain_outbox().collect();
        assert_eq!(writes, vec![(Attribute::GuestSelection, 3)]);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn over_without_cause_has_no_outcome() {
        let now = Instant::now();
        let mut state = guest();
        state.shared.apply_remote(Attribute::GamePhase, 3).unwrap();
        MACHINE
            .observe_phase(&mut state, GamePhase::Select, GamePhase::Play, now)
            .unwrap();
        state.shared.apply_remote(Attribute::GamePhase, 4).unwrap();
        let transition = MACHINE
            .observe_phase(&mut state, GamePhase::Play, GamePhase::Over, now)
            .unwrap();
        assert!(transition.is_legal());
        assert_eq!(transition.cause, None);
        assert_eq!(state.outcome, None);
    }

    #[test]
    fn taken_character_is_rejected() {
        let mut state = guest();
        state
            .shared
            .apply_remote(Attribute::HostSelection, PlayerType::Princess.code())
            .unwrap();
        assert_eq!(
            MACHINE.select_character(&mut state, PlayerType::Princess),
            Err(GameError::CharacterTaken {
                character: PlayerType::Princess
            })
        );
        assert!(MACHINE
            .select_character(&mut state, PlayerType::Dragon)
            .is_ok());
    }

    #[test]
    fn selection_outside_select_is_rejected() {
        let mut state = host();
        MACHINE
            .request(&mut state, PhaseTrigger::TutorialRequested, Instant::now())
            .unwrap();
        assert_eq!(
            MACHINE.select_character(&mut state, PlayerType::Dragon),
            Err(GameError::WrongPhase {
                expected: GamePhase::Select,
                actual: GamePhase::Tutorial,
            })
        );
    }

    #[test]
    fn simultaneous_choice_resolves_for_host() {
        let mut guest_state = guest();
        MACHINE
            .select_character(&mut guest_state, PlayerType::Princess)
            .unwrap();
        guest_state
            .shared
            .apply_remote(Attribute::HostSelection, PlayerType::Princess.code())
            .unwrap();
        assert_eq!(
            MACHINE.resolve_selection_conflict(&mut guest_state),
            Ok(true)
        );
        assert_eq!(guest_state.shared.local_selection(), PlayerType::Unchosen);

        let mut host_state =
            host_with_selections(PlayerType::Princess, PlayerType::Princess);
        assert_eq!(
            MACHINE.resolve_selection_conflict(&mut host_state),
            Ok(false)
        );
        assert_eq!(host_state.shared.local_selection(), PlayerType::Princess);
    }
}
