#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{test_game_config, Pair, FRAME_MS, HOST};
use princess_of_fire::attributes::Attribute;
use princess_of_fire::network::protocol::LinkState;
use princess_of_fire::telemetry::ViolationKind;
use princess_of_fire::{
    GameError, GameEvent, GamePhase, GameRequest, InputSample, LinkConfig, ManualClock,
    MemoryNetwork, PlayerType, Screen, SessionBuilder,
};

#[test]
fn both_peers_meet_in_character_selection() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();

    assert_eq!(pair.host.phase(), GamePhase::Select);
    assert_eq!(pair.guest.phase(), GamePhase::Select);
    assert!(pair.host_events.contains(&GameEvent::Connected));
    assert!(pair.guest_events.contains(&GameEvent::Connected));

    let selecting = Screen::CharacterSelect {
        local: PlayerType::Unchosen,
        opponent: PlayerType::Unchosen,
    };
    assert_eq!(pair.host.screen(), Some(selecting));
    pair.frame();
    assert_eq!(pair.guest.screen(), Some(selecting));

    assert!(pair.host_observer.is_empty());
    assert!(pair.guest_observer.is_empty());
}

#[test]
fn guest_without_host_keeps_waiting() {
    let network = MemoryNetwork::new();
    let clock = ManualClock::new();
    let mut guest = SessionBuilder::new()
        .with_clock(clock.clone())
        .with_link_config(LinkConfig::deterministic(3))
        .start_guest_session(network.socket(2), HOST)
        .unwrap();

    let first = guest.advance_frame(&InputSample::neutral()).unwrap();
    assert_eq!(
        first.as_slice(),
        &[GameRequest::ShowScreen(Screen::WaitingForPeer)]
    );
    for _ in 0..500 {
        clock.advance_ms(FRAME_MS);
        let requests = guest.advance_frame(&InputSample::neutral()).unwrap();
        assert!(requests.is_empty(), "screen should not change: {requests:?}");
    }
    assert!(!guest.is_connected());
    assert_eq!(guest.link_state(), LinkState::Discovering);
    assert_eq!(guest.events().count(), 0);
    assert_eq!(
        guest.choose_character(PlayerType::Dragon),
        Err(GameError::NotConnected)
    );
}

#[test]
fn goodbye_sends_the_host_back_to_waiting() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();
    pair.take_host_events();

    pair.guest.disconnect();
    let (host_requests, _) = pair.frame();

    assert!(!pair.host.is_connected());
    assert!(host_requests.contains(&GameRequest::ShowScreen(Screen::WaitingForPeer)));
    assert!(pair.host_events.contains(&GameEvent::Disconnected));
    assert!(pair.guest_events.contains(&GameEvent::Disconnected));
    assert_eq!(pair.guest.link_state(), LinkState::Disconnected);

    // a closed link stays closed
    pair.frames(400);
    assert!(!pair.guest.is_connected());
    assert!(!pair.host.is_connected());
}

#[test]
fn silence_interrupts_then_drops_the_link() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();
    pair.take_host_events();

    pair.network.set_link_up(false);
    pair.run_until("interruption", |pair| {
        pair.host_events
            .iter()
            .any(|e| matches!(e, GameEvent::NetworkInterrupted { .. }))
    });
    assert!(pair.host.is_connected());

    pair.run_until("disconnect", |pair| !pair.host.is_connected());
    assert!(pair.host_events.contains(&GameEvent::Disconnected));
    assert_eq!(pair.host.screen(), Some(Screen::WaitingForPeer));
}

#[test]
fn short_outage_resumes_without_reset() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();
    pair.host.choose_character(PlayerType::Dragon).unwrap();
    pair.frames(3);
    pair.take_guest_events();

    pair.network.set_link_up(false);
    pair.run_until("interruption", |pair| {
        pair.guest_events
            .iter()
            .any(|e| matches!(e, GameEvent::NetworkInterrupted { .. }))
    });
    pair.network.set_link_up(true);
    pair.run_until("resume", |pair| {
        pair.guest_events.contains(&GameEvent::NetworkResumed)
    });

    assert!(pair.guest.is_connected());
    assert!(!pair.guest_events.contains(&GameEvent::Disconnected));
    assert_eq!(
        pair.guest.state().shared().peer_selection(),
        PlayerType::Dragon
    );
}

#[test]
fn reconnection_starts_over_in_selection() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();
    pair.frames(5);

    pair.network.set_link_up(false);
    pair.run_until("both sides dropping", |pair| {
        !pair.host.is_connected() && !pair.guest.is_connected()
    });
    pair.take_host_events();
    pair.take_guest_events();

    pair.network.set_link_up(true);
    pair.connect();

    assert!(pair.host_events.contains(&GameEvent::Connected));
    assert!(pair.guest_events.contains(&GameEvent::Connected));
    for session in [&pair.host, &pair.guest] {
        assert_eq!(session.phase(), GamePhase::Select);
        assert_eq!(session.state().shared().local_selection(), PlayerType::Unchosen);
        assert_eq!(session.state().shared().peer_selection(), PlayerType::Unchosen);
        assert!(!session.state().timer().is_running());
        assert_eq!(session.state().outcome(), None);
    }
}

#[test]
fn guest_cannot_write_round_state() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();

    let result = pair.guest.write_attribute(Attribute::GamePhase, 3);
    assert!(matches!(result, Err(GameError::NotOwner { .. })));
    assert!(pair.guest_observer.has_violation(ViolationKind::Attribute));

    let result = pair.guest.write_attribute(Attribute::GuestX, 10_000);
    assert!(matches!(
        result,
        Err(GameError::InvalidAttributeValue { .. })
    ));

    pair.frames(5);
    assert_eq!(pair.host.phase(), GamePhase::Select);
    assert_eq!(pair.guest.read_attribute(Attribute::GamePhase), 1);
}

#[test]
fn guest_position_writes_reach_the_host() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();

    pair.guest.write_attribute(Attribute::GuestX, 42).unwrap();
    pair.guest.write_attribute(Attribute::GuestY, 24).unwrap();
    pair.frames(3);

    assert_eq!(pair.host.read_attribute(Attribute::GuestX), 42);
    assert_eq!(pair.host.read_attribute(Attribute::GuestY), 24);
}
