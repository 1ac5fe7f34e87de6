//! The shared-state store: local values, mirrors of the peer's values, and the write outbox.
//!
//! Every slot of [`Attribute::ALL`] lives here as an `i32`. Which slots are local and which are
//! mirrors depends on the [`Role`] the store was built for. Local slots change only through
//! [`SharedState::stage_local`], which also queues the write for the link. Mirrors change only
//! through [`SharedState::apply_remote`].

use std::collections::vec_deque::Drain;
use std::collections::VecDeque;

use tracing::trace;

use crate::attributes::{Attribute, OwnershipTable};
use crate::game::{EndCause, GamePhase, PlayerType, Position};
use crate::sessions::config::GameConfig;
use crate::{GameError, Role};

/// A decoded, validated change to one of the peer's attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteChange {
    /// The peer's position changed. Carries the full mirrored position.
    PeerMoved(Position),
    /// The peer picked (or dropped) a character.
    PeerSelected(PlayerType),
    /// The host moved the session to another phase.
    PhaseChanged {
        /// The mirrored phase before the notification.
        from: GamePhase,
        /// The phase the host announced.
        to: GamePhase,
    },
    /// The guest asked the host for a phase.
    PhaseRequested(GamePhase),
    /// The host recorded (or cleared) why the round ended.
    EndCause(Option<EndCause>),
    /// The peer's reveal window opened or closed.
    PeerPowerUp {
        /// Whether the window is open.
        active: bool,
    },
}

/// One role's view of the shared attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedState {
    table: OwnershipTable,
    config: GameConfig,
    values: [i32; Attribute::ALL.len()],
    outbox: VecDeque<(Attribute, i32)>,
}

impl SharedState {
    /// Creates the store for `role` holding the SELECT defaults.
    #[must_use]
    pub fn new(role: Role, config: &GameConfig) -> Self {
        let mut state = Self {
            table: OwnershipTable::for_role(role),
            config: *config,
            values: [0; Attribute::ALL.len()],
            outbox: VecDeque::new(),
        };
        state.values = state.defaults();
        state
    }

    fn defaults(&self) -> [i32; Attribute::ALL.len()] {
        let mut values = [0; Attribute::ALL.len()];
        for attribute in Attribute::ALL {
            values[attribute as usize] = match attribute {
                Attribute::HostX => self.config.host_spawn.x,
                Attribute::HostY => self.config.host_spawn.y,
                Attribute::GuestX => self.config.guest_spawn.x,
                Attribute::GuestY => self.config.guest_spawn.y,
                Attribute::HostSelection | Attribute::GuestSelection => {
                    PlayerType::Unchosen.code()
                }
                Attribute::GamePhase | Attribute::PhaseRequest => GamePhase::Select.code(),
                Attribute::EndCause => EndCause::NONE_CODE,
                Attribute::HostPowerUp | Attribute::GuestPowerUp => 0,
            };
        }
        values
    }

    /// The role this store belongs to.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.table.role
    }

    /// The role-relative attribute names.
    #[must_use]
    pub const fn table(&self) -> &OwnershipTable {
        &self.table
    }

    /// Returns the last-known value of `attribute`, local or mirrored.
    #[must_use]
    pub fn read(&self, attribute: Attribute) -> i32 {
        self.values[attribute as usize]
    }

    /// Applies a notification from the peer to its mirror.
    ///
    /// Returns `Ok(None)` when the value did not change and the attribute is not eventful.
    ///
    /// # Errors
    ///
    /// * [`GameError::NotOwner`] if `attribute` is one of ours. The peer wrote our slot.
    /// * [`GameError::InvalidAttributeValue`] if `value` is outside the domain.
    ///
    /// The mirror is left unchanged on error.
    pub fn apply_remote(
        &mut self,
        attribute: Attribute,
        value: i32,
    ) -> Result<Option<RemoteChange>, GameError> {
        if self.table.is_local(attribute) {
            return Err(GameError::NotOwner {
                attribute,
                role: self.role().opponent(),
            });
        }
        if !attribute.accepts(value, self.config.arena) {
            return Err(GameError::InvalidAttributeValue { attribute, value });
        }

        let previous = self.read(attribute);
        if previous == value && !attribute.is_eventful() {
            return Ok(None);
        }
        self.values[attribute as usize] = value;
        trace!("Mirror {} {} -> {}", attribute, previous, value);

        let change = match attribute {
            Attribute::HostX | Attribute::HostY | Attribute::GuestX | Attribute::GuestY => {
                RemoteChange::PeerMoved(self.peer_position())
            }
            Attribute::HostSelection | Attribute::GuestSelection => {
                RemoteChange::PeerSelected(self.peer_selection())
            }
            Attribute::GamePhase => RemoteChange::PhaseChanged {
                from: GamePhase::from_code(previous).unwrap_or_default(),
                to: self.phase(),
            },
            Attribute::PhaseRequest => RemoteChange::PhaseRequested(self.phase_request()),
            Attribute::EndCause => RemoteChange::EndCause(self.end_cause()),
            Attribute::HostPowerUp | Attribute::GuestPowerUp => RemoteChange::PeerPowerUp {
                active: self.peer_power_up(),
            },
        };
        Ok(Some(change))
    }

    /// Updates a local value and queues it for the peer.
    ///
    /// Unchanged values are not queued again, except for eventful attributes.
    ///
    /// # Errors
    ///
    /// * [`GameError::NotOwner`] if the peer owns `attribute`.
    /// * [`GameError::InvalidAttributeValue`] if `value` is outside the domain.
    pub fn stage_local(&mut self, attribute: Attribute, value: i32) -> Result<(), GameError> {
        if !self.table.is_local(attribute) {
            return Err(GameError::NotOwner {
                attribute,
                role: self.role(),
            });
        }
        if !attribute.accepts(value, self.config.arena) {
            return Err(GameError::InvalidAttributeValue { attribute, value });
        }
        if self.read(attribute) == value && !attribute.is_eventful() {
            return Ok(());
        }
        self.values[attribute as usize] = value;
        self.outbox.push_back((attribute, value));
        Ok(())
    }

    /// Yields the staged writes in the order they were made.
    pub fn drain_outbox(&mut self) -> Drain<'_, (Attribute, i32)> {
        self.outbox.drain(..)
    }

    /// Number of staged writes not yet drained.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.outbox.len()
    }

    /// Restores the SELECT defaults and stages every local value that changed.
    ///
    /// Mirrors are reset too; the peer resets its own side when it observes the phase change.
    pub fn reset_session(&mut self, config: &GameConfig) {
        self.config = *config;
        let defaults = self.defaults();
        for attribute in Attribute::ALL {
            let value = defaults[attribute as usize];
            if self.table.is_local(attribute)
                && !attribute.is_eventful()
                && self.read(attribute) != value
            {
                self.outbox.push_back((attribute, value));
            }
            self.values[attribute as usize] = value;
        }
    }

    /// Restores the SELECT defaults for a fresh link and stages every local value.
    ///
    /// Writes staged for the previous link are discarded.
    pub fn resync(&mut self) {
        self.outbox.clear();
        self.values = self.defaults();
        for attribute in Attribute::ALL {
            if self.table.is_local(attribute) && !attribute.is_eventful() {
                self.outbox.push_back((attribute, self.read(attribute)));
            }
        }
    }

    /// This peer's position.
    #[must_use]
    pub fn local_position(&self) -> Position {
        Position::new(self.read(self.table.local_x), self.read(self.table.local_y))
    }

    /// The mirrored opponent position.
    #[must_use]
    pub fn peer_position(&self) -> Position {
        Position::new(self.read(self.table.peer_x), self.read(self.table.peer_y))
    }

    /// This peer's character.
    #[must_use]
    pub fn local_selection(&self) -> PlayerType {
        PlayerType::from_code(self.read(self.table.local_selection)).unwrap_or_default()
    }

    /// The mirrored opponent character.
    #[must_use]
    pub fn peer_selection(&self) -> PlayerType {
        PlayerType::from_code(self.read(self.table.peer_selection)).unwrap_or_default()
    }

    /// The session phase: local on the host, mirrored on the guest.
    #[must_use]
    pub fn phase(&self) -> GamePhase {
        GamePhase::from_code(self.read(Attribute::GamePhase)).unwrap_or_default()
    }

    /// The last phase the guest asked for.
    #[must_use]
    pub fn phase_request(&self) -> GamePhase {
        GamePhase::from_code(self.read(Attribute::PhaseRequest)).unwrap_or_default()
    }

    /// Why the last round ended, if it has.
    #[must_use]
    pub fn end_cause(&self) -> Option<EndCause> {
        EndCause::from_code(self.read(Attribute::EndCause))
    }

    /// Whether this peer's reveal flag is set.
    #[must_use]
    pub fn local_power_up(&self) -> bool {
        self.read(self.table.local_power_up) == 1
    }

    /// Whether the opponent's reveal flag is set.
    #[must_use]
    pub fn peer_power_up(&self) -> bool {
        self.read(self.table.peer_power_up) == 1
    }

    /// Stages a new local position. Only changed coordinates are queued.
    pub fn set_local_position(&mut self, position: Position) -> Result<(), GameError> {
        self.stage_local(self.table.local_x, position.x)?;
        self.stage_local(self.table.local_y, position.y)
    }

    /// Stages this peer's character.
    pub fn set_local_selection(&mut self, character: PlayerType) -> Result<(), GameError> {
        self.stage_local(self.table.local_selection, character.code())
    }

    /// Stages this peer's reveal flag.
    pub fn set_local_power_up(&mut self, active: bool) -> Result<(), GameError> {
        self.stage_local(self.table.local_power_up, i32::from(active))
    }

    /// Stages the session phase. Host only.
    pub fn set_phase(&mut self, phase: GamePhase) -> Result<(), GameError> {
        self.stage_local(Attribute::GamePhase, phase.code())
    }

    /// Stages the end cause. Host only.
    pub fn set_end_cause(&mut self, cause: Option<EndCause>) -> Result<(), GameError> {
        self.stage_local(Attribute::EndCause, EndCause::code_of(cause))
    }

    /// Stages a phase request. Guest only.
    pub fn request_phase(&mut self, phase: GamePhase) -> Result<(), GameError> {
        self.stage_local(Attribute::PhaseRequest, phase.code())
    }

    /// The configuration supplying spawns and position bounds.
    #[must_use]
    pub const fn config(&self) -> &GameConfig {
        &self.config
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

    fn host() -> SharedState {
        SharedState::new(Role::Host, &GameConfig::default())
    }

    fn guest() -> SharedState {
        SharedState::new(Role::Guest, &GameConfig::default())
    }

    #[test]
    fn starts_in_select_with_spawn_positions() {
        let state = guest();
        assert_eq!(state.phase(), GamePhase::Select);
        assert_eq!(state.local_position(), Position::new(300, 120));
        assert_eq!(state.peer_position(), Position::new(10, 120));
        assert_eq!(state.local_selection(), PlayerType::Unchosen);
        assert_eq!(state.peer_selection(), PlayerType::Unchosen);
        assert_eq!(state.end_cause(), None);
        assert!(!state.local_power_up());
        assert_eq!(state.pending_writes(), 0);
    }

    #[test]
    fn remote_write_to_local_attribute_is_rejected() {
        let mut state = host();
        let err = state.apply_remote(Attribute::HostX, 50).unwrap_err();
        assert_eq!(
            err,
            GameError::NotOwner {
                attribute: Attribute::HostX,
                role: Role::Guest,
            }
        );
        assert_eq!(state.read(Attribute::HostX), 10);
    }

    #[test]
    fn out_of_domain_remote_value_keeps_mirror() {
        let mut state = host();
        state.apply_remote(Attribute::GuestX, 200).unwrap();
        let err = state.apply_remote(Attribute::GuestX, 320).unwrap_err();
        assert_eq!(
            err,
            GameError::InvalidAttributeValue {
                attribute: Attribute::GuestX,
                value: 320,
            }
        );
        assert_eq!(state.peer_position(), Position::new(200, 120));
    }

    #[test]
    fn remote_changes_are_typed() {
        let mut state = guest();
        assert_eq!(
            state.apply_remote(Attribute::HostY, 7).unwrap(),
            Some(RemoteChange::PeerMoved(Position::new(10, 7)))
        );
        assert_eq!(
            state.apply_remote(Attribute::HostSelection, 2).unwrap(),
            Some(RemoteChange::PeerSelected(PlayerType::Dragon))
        );
        assert_eq!(
            state.apply_remote(Attribute::GamePhase, 2).unwrap(),
            Some(RemoteChange::PhaseChanged {
                from: GamePhase::Select,
                to: GamePhase::Tutorial,
            })
        );
        assert_eq!(
            state.apply_remote(Attribute::EndCause, 2).unwrap(),
            Some(RemoteChange::EndCause(Some(EndCause::Caught)))
        );
        assert_eq!(
            state.apply_remote(Attribute::HostPowerUp, 1).unwrap(),
            Some(RemoteChange::PeerPowerUp { active: true })
        );
    }

    #[test]
    fn unchanged_remote_value_is_silent_unless_eventful() {
        let mut state = host();
        assert_eq!(state.apply_remote(Attribute::GuestX, 300).unwrap(), None);
        assert_eq!(
            state.apply_remote(Attribute::PhaseRequest, 1).unwrap(),
            Some(RemoteChange::PhaseRequested(GamePhase::Select))
        );
        assert_eq!(
            state.apply_remote(Attribute::PhaseRequest, 1).unwrap(),
            Some(RemoteChange::PhaseRequested(GamePhase::Select))
        );
    }

    #[test]
    fn stage_local_queues_in_order_and_skips_repeats() {
        let mut state = host();
        state.set_local_position(Position::new(11, 120)).unwrap();
        state.set_local_selection(PlayerType::Princess).unwrap();
        state.set_local_selection(PlayerType::Princess).unwrap();
        let writes: Vec<_> = state.drain_outbox().collect();
        assert_eq!(
            writes,
            vec![(Attribute::HostX, 11), (Attribute::HostSelection, 1)]
        );
        assert_eq!(state.pending_writes(), 0);
    }

    #[test]
    fn guest_cannot_stage_phase() {
        let mut state = guest();
        assert!(matches!(
            state.set_phase(GamePhase::Play),
            Err(GameError::NotOwner {
                attribute: Attribute::GamePhase,
                role: Role::Guest,
            })
        ));
        assert_eq!(state.phase(), GamePhase::Select);
        assert_eq!(state.pending_writes(), 0);
    }

    #[test]
    fn repeated_phase_request_is_staged_twice() {
        let mut state = guest();
        state.request_phase(GamePhase::Play).unwrap();
        state.request_phase(GamePhase::Play).unwrap();
        assert_eq!(state.pending_writes(), 2);
    }

    #[test]
    fn stage_local_rejects_out_of_domain() {
        let mut state = host();
        assert!(state.stage_local(Attribute::HostY, -1).is_err());
        assert!(state.stage_local(Attribute::HostSelection, 0).is_err());
        assert_eq!(state.pending_writes(), 0);
    }

    #[test]
    fn reset_session_stages_only_changed_locals() {
        let mut state = host();
        state.set_local_position(Position::new(50, 60)).unwrap();
        state.set_local_selection(PlayerType::Dragon).unwrap();
        state.set_phase(GamePhase::Play).unwrap();
        state.apply_remote(Attribute::GuestX, 100).unwrap();
        state.drain_outbox().for_each(drop);

        state.reset_session(&GameConfig::default());
        let writes: Vec<_> = state.drain_outbox().collect();
        assert_eq!(
            writes,
            vec![
                (Attribute::HostX, 10),
                (Attribute::HostY, 120),
                (Attribute::HostSelection, 3),
                (Attribute::GamePhase, 1),
            ]
        );
        assert_eq!(state.peer_position(), Position::new(300, 120));
    }

    #[test]
    fn resync_pushes_every_non_eventful_local() {
        let mut state = guest();
        state.request_phase(GamePhase::Tutorial).unwrap();
        state.resync();
        let attributes: Vec<_> = state.drain_outbox().map(|(attr, _)| attr).collect();
        assert_eq!(
            attributes,
            vec![
                Attribute::GuestX,
                Attribute::GuestY,
                Attribute::GuestSelection,
                Attribute::GuestPowerUp,
            ]
        );
    }
}
