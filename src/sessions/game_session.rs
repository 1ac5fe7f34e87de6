//! The per-peer session façade.

use std::collections::VecDeque;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};
use web_time::Instant;

use crate::attributes::Attribute;
use crate::clock::Clock;
use crate::game::{
    GamePhase, GameStateMachine, InputSample, PhaseTrigger, PlayLoop, PlayerType, SessionState,
    TickReport, Transition,
};
use crate::network::protocol::{LinkEvent, LinkProtocol, LinkState};
use crate::rng::Pcg32;
use crate::sessions::event_drain::EventDrain;
use crate::shared_state::RemoteChange;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{
    debug_check_invariants, report_violation_to, Address, GameError, GameEvent, GameRequest,
    NonBlockingSocket, PositionOwner, Role, Screen,
};

/// Presentation requests produced by one frame. Six fit without allocating.
pub type FrameRequests = SmallVec<[GameRequest; 6]>;

/// One peer of a Princess of Fire session.
///
/// Build it with [`SessionBuilder`](crate::SessionBuilder), then call
/// [`advance_frame`](Self::advance_frame) once per display frame. Each frame:
///
/// 1. receives every datagram and hands it to the link;
/// 2. runs the link timers;
/// 3. applies the peer's notifications in order, reacting to phase changes, phase requests
///    and selections as they come;
/// 4. runs the play loop while in PLAY;
/// 5. sends the staged writes and everything else the link queued.
///
/// UI commands ([`choose_character`](Self::choose_character),
/// [`request_start`](Self::request_start), ...) only stage writes; they go out with the next
/// frame or [`poll_remote_clients`](Self::poll_remote_clients).
pub struct GameSession<A: Address> {
    state: SessionState,
    link: LinkProtocol<A>,
    socket: Box<dyn NonBlockingSocket<A>>,
    clock: Arc<dyn Clock>,
    machine: GameStateMachine,
    play_loop: PlayLoop,
    rng: Pcg32,
    event_queue: VecDeque<GameEvent>,
    event_queue_size: usize,
    screen: Option<Screen>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<A: Address> std::fmt::Debug for GameSession<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("state", &self.state)
            .field("link", &self.link)
            .field("screen", &self.screen)
            .field("pending_events", &self.event_queue.len())
            .finish_non_exhaustive()
    }
}

impl<A: Address> GameSession<A> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        state: SessionState,
        link: LinkProtocol<A>,
        socket: Box<dyn NonBlockingSocket<A>>,
        clock: Arc<dyn Clock>,
        rng: Pcg32,
        event_queue_size: usize,
        violation_observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        Self {
            state,
            link,
            socket,
            clock,
            machine: GameStateMachine::new(),
            play_loop: PlayLoop::new(),
            rng,
            event_queue: VecDeque::new(),
            event_queue_size,
            screen: None,
            violation_observer,
        }
    }

    /// This peer's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.state.role()
    }

    /// The current game phase.
    #[must_use]
    pub fn phase(&self) -> GamePhase {
        self.state.phase()
    }

    /// Whether the peer is connected. The game only runs while it is.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// The link state.
    #[must_use]
    pub const fn link_state(&self) -> LinkState {
        self.link.state()
    }

    /// The session state, for inspection.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// The screen shown last.
    #[must_use]
    pub const fn screen(&self) -> Option<Screen> {
        self.screen
    }

    /// The last-known value of an attribute, local or mirrored.
    #[must_use]
    pub fn read_attribute(&self, attribute: Attribute) -> i32 {
        self.state.shared().read(attribute)
    }

    /// Writes a locally owned attribute. The value goes out with the next frame.
    ///
    /// Selections go through [`choose_character`](Self::choose_character). The phase, the
    /// phase request and the end cause change only through the state machine.
    ///
    /// # Errors
    ///
    /// * [`GameError::NotOwner`] if the peer owns `attribute`.
    /// * [`GameError::ManagedAttribute`] for `GamePhase`, `PhaseRequest` and `EndCause`.
    /// * [`GameError::InvalidAttributeValue`] if `value` is outside its domain.
    /// * Any error of [`choose_character`](Self::choose_character) for selections.
    ///
    /// All are reported to the violation observer too. Nothing is sent.
    pub fn write_attribute(&mut self, attribute: Attribute, value: i32) -> Result<(), GameError> {
        let role = self.role();
        let result = match attribute {
            _ if attribute.owner() != role => Err(GameError::NotOwner { attribute, role }),
            Attribute::GamePhase | Attribute::PhaseRequest | Attribute::EndCause => {
                Err(GameError::ManagedAttribute { attribute })
            }
            Attribute::HostSelection | Attribute::GuestSelection => {
                match PlayerType::from_code(value) {
                    Some(character) => self.choose_character(character),
                    None => Err(GameError::InvalidAttributeValue { attribute, value }),
                }
            }
            _ => self.state.shared.stage_local(attribute, value),
        };
        result.inspect_err(|err| {
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::Attribute,
                "Rejected local write {} = {}: {}",
                attribute,
                value,
                err
            );
        })
    }

    /// Drains the events raised since the last call.
    pub fn events(&mut self) -> EventDrain<'_> {
        EventDrain::from_drain(self.event_queue.drain(..))
    }

    /// Runs one frame and returns what to draw.
    ///
    /// # Errors
    ///
    /// Errors from the play loop are propagated; link and protocol problems never are. They
    /// become events and violations.
    pub fn advance_frame(&mut self, input: &InputSample) -> Result<FrameRequests, GameError> {
        let now = self.clock.now();
        self.service_link(now);

        let report = if self.state.is_connected() && self.state.phase() == GamePhase::Play {
            Some(
                self.play_loop
                    .tick(&mut self.state, input, now, &mut self.rng)?,
            )
        } else {
            // keep edges relative to what was held before the round
            self.state.latch.update(input.buttons);
            None
        };
        if let Some(report) = &report {
            self.on_tick(report);
        }

        let mut requests = FrameRequests::new();
        self.present(report.as_ref(), &mut requests);

        self.flush(now);
        debug_check_invariants!(self.state, "after advance_frame");
        Ok(requests)
    }

    /// Services the link without running the game. Safe to call between frames.
    pub fn poll_remote_clients(&mut self) {
        let now = self.clock.now();
        self.service_link(now);
        self.flush(now);
    }

    /// Picks this peer's character in SELECT. `Unchosen` clears the choice.
    ///
    /// # Errors
    ///
    /// * [`GameError::NotConnected`] while the link is down.
    /// * [`GameError::WrongPhase`] outside SELECT.
    /// * [`GameError::CharacterTaken`] if the opponent already holds `character`.
    pub fn choose_character(&mut self, character: PlayerType) -> Result<(), GameError> {
        self.require_connected()?;
        self.machine.select_character(&mut self.state, character)
    }

    /// Asks for the tutorial. Returns the transition on the host; `None` on the guest or when
    /// the request does not apply.
    ///
    /// # Errors
    ///
    /// [`GameError::NotConnected`] while the link is down.
    pub fn request_tutorial(&mut self) -> Result<Option<Transition>, GameError> {
        self.trigger(PhaseTrigger::TutorialRequested)
    }

    /// Leaves the tutorial.
    ///
    /// # Errors
    ///
    /// [`GameError::NotConnected`] while the link is down.
    pub fn exit_tutorial(&mut self) -> Result<Option<Transition>, GameError> {
        self.trigger(PhaseTrigger::TutorialExit)
    }

    /// Starts the round once both characters are chosen. A no-op otherwise.
    ///
    /// # Errors
    ///
    /// [`GameError::NotConnected`] while the link is down.
    pub fn request_start(&mut self) -> Result<Option<Transition>, GameError> {
        self.trigger(PhaseTrigger::StartRequested)
    }

    /// Goes back to character selection after a round.
    ///
    /// # Errors
    ///
    /// [`GameError::NotConnected`] while the link is down.
    pub fn play_again(&mut self) -> Result<Option<Transition>, GameError> {
        self.trigger(PhaseTrigger::PlayAgain)
    }

    /// Tells the peer goodbye and closes the link for good.
    pub fn disconnect(&mut self) {
        let now = self.clock.now();
        self.link.disconnect(now);
        self.link.send_all_messages(self.socket.as_mut());
    }

    fn require_connected(&self) -> Result<(), GameError> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(GameError::NotConnected)
        }
    }

    fn trigger(&mut self, trigger: PhaseTrigger) -> Result<Option<Transition>, GameError> {
        self.require_connected()?;
        let now = self.clock.now();
        let transition = self.machine.request(&mut self.state, trigger, now)?;
        if let Some(transition) = transition {
            self.on_transition(transition);
        }
        Ok(transition)
    }

    /*
     *  LINK
     */

    fn service_link(&mut self, now: Instant) {
        for (from, msg) in self.socket.receive_all_messages() {
            self.link.handle_message(&msg, &from, now);
        }

        let events: SmallVec<[LinkEvent; 8]> = self.link.poll(now).collect();
        for event in events {
            self.on_link_event(event, now);
        }
    }

    fn on_link_event(&mut self, event: LinkEvent, now: Instant) {
        match event {
            LinkEvent::Connected => {
                debug!("{} connected; resetting to SELECT", self.role());
                self.state.connected = true;
                self.state.resync();
                self.push_event(GameEvent::Connected);
            }
            LinkEvent::Disconnected => {
                debug!("{} lost the peer", self.role());
                self.state.connected = false;
                self.push_event(GameEvent::Disconnected);
            }
            LinkEvent::NetworkInterrupted {
                disconnect_timeout_ms,
            } => self.push_event(GameEvent::NetworkInterrupted {
                disconnect_timeout_ms,
            }),
            LinkEvent::NetworkResumed => self.push_event(GameEvent::NetworkResumed),
            LinkEvent::AttributeChanged { attribute, value } => {
                self.on_notification(attribute, value, now);
            }
        }
    }

    fn on_notification(&mut self, attribute: Attribute, value: i32, now: Instant) {
        let change = match self.state.shared.apply_remote(attribute, value) {
            Ok(Some(change)) => change,
            Ok(None) => return,
            Err(err) => {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Warning,
                    ViolationKind::Attribute,
                    "Rejected notification {} = {}: {}",
                    attribute,
                    value,
                    err
                );
                return;
            }
        };

        if let Err(err) = self.on_remote_change(change, now) {
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::InternalError,
                "Failed to apply {:?}: {}",
                change,
                err
            );
        }
    }

    fn on_remote_change(&mut self, change: RemoteChange, now: Instant) -> Result<(), GameError> {
        match change {
            RemoteChange::PeerMoved(position) => trace!("Peer moved to {}", position),
            RemoteChange::PeerSelected(character) => {
                self.push_event(GameEvent::OpponentSelected(character));
                if self.machine.resolve_selection_conflict(&mut self.state)? {
                    self.push_event(GameEvent::SelectionRevoked);
                }
            }
            RemoteChange::PhaseChanged { from, to } => {
                let transition = self.machine.observe_phase(&mut self.state, from, to, now)?;
                if !transition.is_legal() {
                    report_violation_to!(
                        &self.violation_observer,
                        ViolationSeverity::Error,
                        ViolationKind::PhaseTransition,
                        "Host announced illegal transition {} -> {}",
                        from,
                        to
                    );
                }
                self.on_transition(transition);
            }
            RemoteChange::PhaseRequested(requested) => {
                match self
                    .machine
                    .handle_phase_request(&mut self.state, requested, now)
                {
                    Ok(Some(transition)) => self.on_transition(transition),
                    Ok(None) => (),
                    Err(err) => {
                        report_violation_to!(
                            &self.violation_observer,
                            ViolationSeverity::Warning,
                            ViolationKind::PhaseTransition,
                            "Rejected phase request from guest: {}",
                            err
                        );
                    }
                }
            }
            RemoteChange::EndCause(cause) => trace!("Host recorded end cause {:?}", cause),
            RemoteChange::PeerPowerUp { active } => {
                self.push_event(GameEvent::OpponentPowerUp { active });
            }
        }
        Ok(())
    }

    fn on_transition(&mut self, transition: Transition) {
        self.push_event(GameEvent::PhaseChanged {
            from: transition.from,
            to: transition.to,
        });
        if transition.to == GamePhase::Over {
            match self.state.outcome() {
                Some(outcome) => self.push_event(GameEvent::GameOver(outcome)),
                None => {
                    report_violation_to!(
                        &self.violation_observer,
                        ViolationSeverity::Error,
                        ViolationKind::Synchronization,
                        "Round ended without an end cause"
                    );
                }
            }
        }
    }

    fn on_tick(&mut self, report: &TickReport) {
        if let Some(transition) = report.transition {
            self.on_transition(transition);
        }
        if report.power_up_expired {
            self.push_event(GameEvent::PowerUpExpired);
        }
        if let Some(charges_remaining) = report.power_up_activated {
            self.push_event(GameEvent::PowerUpActivated { charges_remaining });
        }
        if let Some(position) = report.warped {
            self.push_event(GameEvent::Warped(position));
        }
        if let Some(acceleration) = report.acceleration_changed {
            self.push_event(GameEvent::AccelerationChanged(acceleration));
        }
    }

    fn flush(&mut self, now: Instant) {
        if self.link.is_connected() {
            for (attribute, value) in self.state.shared.drain_outbox() {
                if let Err(err) = self.link.write(attribute, value, now) {
                    report_violation_to!(
                        &self.violation_observer,
                        ViolationSeverity::Error,
                        ViolationKind::InternalError,
                        "Failed to send {} = {}: {}",
                        attribute,
                        value,
                        err
                    );
                }
            }
        } else if self.state.shared.pending_writes() > 0 {
            // a fresh link resyncs everything anyway
            trace!(
                "Link down; discarding {} staged writes",
                self.state.shared.pending_writes()
            );
            self.state.shared.drain_outbox().for_each(drop);
        }
        self.link.send_all_messages(self.socket.as_mut());
    }

    /*
     *  PRESENTATION
     */

    fn current_screen(&self) -> Screen {
        if !self.state.is_connected() {
            return Screen::WaitingForPeer;
        }
        let shared = self.state.shared();
        match self.state.phase() {
            GamePhase::Select => Screen::CharacterSelect {
                local: shared.local_selection(),
                opponent: shared.peer_selection(),
            },
            GamePhase::Tutorial => Screen::Tutorial,
            GamePhase::Play => Screen::Playing,
            GamePhase::Over => Screen::GameOver(self.state.outcome()),
        }
    }

    fn present(&mut self, report: Option<&TickReport>, requests: &mut FrameRequests) {
        let screen = self.current_screen();
        if self.screen != Some(screen) {
            trace!("Showing {:?}", screen);
            self.screen = Some(screen);
            requests.push(GameRequest::ShowScreen(screen));
        }

        let Some(report) = report else {
            return;
        };
        if screen != Screen::Playing {
            return;
        }
        requests.push(GameRequest::DrawPosition {
            owner: PositionOwner::Local,
            position: report.local_position,
        });
        if let Some(position) = report.reveal {
            requests.push(GameRequest::DrawPosition {
                owner: PositionOwner::Peer,
                position,
            });
        }
        requests.push(GameRequest::DrawTimer {
            remaining_ms: report.remaining_ms,
        });
        requests.push(GameRequest::DrawDistance {
            value: report.distance,
        });
    }

    fn push_event(&mut self, event: GameEvent) {
        if self.event_queue.len() >= self.event_queue_size {
            trace!("Event queue full; dropping {:?}", self.event_queue.front());
            self.event_queue.pop_front();
        }
        self.event_queue.push_back(event);
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
    use crate::clock::ManualClock;
    use crate::network::memory_socket::{MemoryAddr, MemoryNetwork};
    use crate::sessions::builder::SessionBuilder;
    use crate::sessions::config::{GameConfig, LinkConfig};
    use crate::telemetry::CollectingObserver;

    struct Pair {
        clock: ManualClock,
        network: MemoryNetwork,
        host: GameSession<MemoryAddr>,
        guest: GameSession<MemoryAddr>,
        host_observer: Arc<CollectingObserver>,
    }

    impl Pair {
        fn new() -> Self {
            let clock = ManualClock::new();
            let network = MemoryNetwork::new();
            let host_observer = Arc::new(CollectingObserver::new());
            let game = GameConfig {
                rng_seed: Some(5),
                ..GameConfig::default()
            };
            let host = SessionBuilder::new()
                .with_game_config(game)
                .with_link_config(LinkConfig::deterministic(1))
                .with_clock(clock.clone())
                .with_violation_observer(host_observer.clone())
                .start_host_session(network.socket(1))
                .unwrap();
            let guest = SessionBuilder::new()
                .with_game_config(game)
                .with_link_config(LinkConfig::deterministic(2))
                .with_clock(clock.clone())
                .start_guest_session(network.socket(2), MemoryAddr(1))
                .unwrap();
            Self {
                clock,
                network,
                host,
                guest,
                host_observer,
            }
        }

        fn frame(&mut self) -> (FrameRequests, FrameRequests) {
            let guest = self.guest.advance_frame(&InputSample::neutral()).unwrap();
            let host = self.host.advance_frame(&InputSample::neutral()).unwrap();
            self.clock.advance_ms(16);
            (host, guest)
        }

        fn frames(&mut self, n: usize) {
            for _ in 0..n {
                self.frame();
            }
        }
    }

    #[test]
    fn sessions_connect_and_show_selection() {
        let mut pair = Pair::new();
        let (host, guest) = pair.frame();
        assert!(guest.contains(&GameRequest::ShowScreen(Screen::WaitingForPeer)));
        assert!(host.contains(&GameRequest::ShowScreen(Screen::CharacterSelect {
            local: PlayerType::Unchosen,
            opponent: PlayerType::Unchosen,
        })));
        pair.frames(2);
        assert!(pair.host.is_connected());
        assert!(pair.guest.is_connected());
        assert!(pair.guest.events().any(|e| e == GameEvent::Connected));
    }

    #[test]
    fn commands_need_a_peer() {
        let mut pair = Pair::new();
        assert_eq!(
            pair.guest.choose_character(PlayerType::Dragon),
            Err(GameError::NotConnected)
        );
        assert_eq!(pair.host.request_start(), Err(GameError::NotConnected));
    }

    #[test]
    fn writing_a_peer_attribute_is_rejected_and_reported() {
        let mut pair = Pair::new();
        pair.frames(3);
        let before = pair.network.in_flight();
        assert!(matches!(
            pair.host.write_attribute(Attribute::GuestX, 5),
            Err(GameError::NotOwner { .. })
        ));
        assert!(pair.host_observer.has_violation(ViolationKind::Attribute));
        assert_eq!(pair.host.state().shared().pending_writes(), 0);
        assert_eq!(pair.network.in_flight(), before);
    }

    #[test]
    fn phase_attributes_cannot_be_written_directly() {
        let mut pair = Pair::new();
        pair.frames(3);
        for attribute in [Attribute::GamePhase, Attribute::EndCause] {
            assert_eq!(
                pair.host.write_attribute(attribute, 4),
                Err(GameError::ManagedAttribute { attribute })
            );
        }
        assert_eq!(
            pair.guest.write_attribute(Attribute::PhaseRequest, 3),
            Err(GameError::ManagedAttribute {
                attribute: Attribute::PhaseRequest
            })
        );
        pair.frames(3);
        assert_eq!(pair.host.phase(), GamePhase::Select);
        assert_eq!(pair.guest.phase(), GamePhase::Select);
        assert_eq!(pair.host.state().outcome(), None);
        assert!(pair.host_observer.has_violation(ViolationKind::Attribute));
    }

    #[test]
    fn selection_writes_keep_the_taken_guard() {
        let mut pair = Pair::new();
        pair.frames(3);
        pair.guest.choose_character(PlayerType::Dragon).unwrap();
        pair.frames(2);

        assert_eq!(
            pair.host
                .write_attribute(Attribute::HostSelection, PlayerType::Dragon.code()),
            Err(GameError::CharacterTaken {
                character: PlayerType::Dragon
            })
        );
        pair.frames(2);
        assert_eq!(
            pair.host.state().shared().local_selection(),
            PlayerType::Unchosen
        );
        assert_eq!(
            pair.guest.state().shared().local_selection(),
            PlayerType::Dragon
        );

        pair.host
            .write_attribute(Attribute::HostSelection, PlayerType::Princess.code())
            .unwrap();
        pair.frames(2);
        assert_eq!(
            pair.guest.state().shared().peer_selection(),
            PlayerType::Princess
        );
        assert!(matches!(
            pair.host.write_attribute(Attribute::HostSelection, 9),
            Err(GameError::InvalidAttributeValue { .. })
        ));
    }

    #[test]
    fn selection_reaches_the_peer() {
        let mut pair = Pair::new();
        pair.frames(3);
        pair.guest.choose_character(PlayerType::Princess).unwrap();
        pair.frames(2);
        assert_eq!(
            pair.host.state().shared().peer_selection(),
            PlayerType::Princess
        );
        assert!(pair
            .host
            .events()
            .any(|e| e == GameEvent::OpponentSelected(PlayerType::Princess)));
        assert_eq!(
            pair.host.choose_character(PlayerType::Princess),
            Err(GameError::CharacterTaken {
                character: PlayerType::Princess
            })
        );
    }

    #[test]
    fn start_without_selections_is_a_no_op() {
        let mut pair = Pair::new();
        pair.frames(3);
        assert_eq!(pair.host.request_start(), Ok(None));
        assert_eq!(pair.host.phase(), GamePhase::Select);
    }

    #[test]
    fn event_queue_drops_oldest() {
        let mut pair = Pair::new();
        pair.host.event_queue_size = 2;
        pair.host.push_event(GameEvent::NetworkResumed);
        pair.host.push_event(GameEvent::PowerUpExpired);
        pair.host.push_event(GameEvent::SelectionRevoked);
        let events: Vec<_> = pair.host.events().collect();
        assert_eq!(
            events,
            vec![GameEvent::PowerUpExpired, GameEvent::SelectionRevoked]
        );
    }
}
