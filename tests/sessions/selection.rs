#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{test_game_config, Pair};
use princess_of_fire::telemetry::ViolationKind;
use princess_of_fire::{GameError, GameEvent, GamePhase, PlayerType, Screen};

#[test]
fn choices_show_up_on_both_screens() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();
    pair.select_characters();
    pair.frame();

    assert_eq!(
        pair.host.screen(),
        Some(Screen::CharacterSelect {
            local: PlayerType::Princess,
            opponent: PlayerType::Dragon,
        })
    );
    assert_eq!(
        pair.guest.screen(),
        Some(Screen::CharacterSelect {
            local: PlayerType::Dragon,
            opponent: PlayerType::Princess,
        })
    );
    assert!(pair
        .host_events
        .contains(&GameEvent::OpponentSelected(PlayerType::Dragon)));
    assert!(pair
        .guest_events
        .contains(&GameEvent::OpponentSelected(PlayerType::Princess)));
}

#[test]
fn a_taken_character_cannot_be_picked() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();
    pair.host.choose_character(PlayerType::Dragon).unwrap();
    pair.frames(3);

    assert_eq!(
        pair.guest.choose_character(PlayerType::Dragon),
        Err(GameError::CharacterTaken {
            character: PlayerType::Dragon
        })
    );
    assert_eq!(
        pair.guest.state().shared().local_selection(),
        PlayerType::Unchosen
    );
    pair.guest.choose_character(PlayerType::Princess).unwrap();
}

#[test]
fn host_wins_a_simultaneous_pick() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();

    // both pick before either write crosses the link
    pair.host.choose_character(PlayerType::Princess).unwrap();
    pair.guest.choose_character(PlayerType::Princess).unwrap();
    pair.run_until("guest yielding", |pair| {
        pair.guest_events.contains(&GameEvent::SelectionRevoked)
    });
    pair.frames(3);

    assert_eq!(
        pair.host.state().shared().local_selection(),
        PlayerType::Princess
    );
    assert_eq!(
        pair.guest.state().shared().local_selection(),
        PlayerType::Unchosen
    );
    assert_eq!(
        pair.host.state().shared().peer_selection(),
        PlayerType::Unchosen
    );
    assert!(pair
        .host_events
        .contains(&GameEvent::OpponentSelected(PlayerType::Unchosen)));
}

#[test]
fn start_needs_two_distinct_characters() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();

    assert_eq!(pair.host.request_start(), Ok(None));
    pair.host.choose_character(PlayerType::Princess).unwrap();
    pair.frames(3);
    assert_eq!(pair.host.request_start(), Ok(None));
    assert_eq!(pair.guest.request_start(), Ok(None));
    pair.frames(3);

    assert_eq!(pair.host.phase(), GamePhase::Select);
    assert_eq!(pair.guest.phase(), GamePhase::Select);
}

#[test]
fn guest_start_request_is_granted_by_the_host() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();
    pair.select_characters();

    assert_eq!(pair.guest.request_start(), Ok(None));
    assert_eq!(pair.guest.phase(), GamePhase::Select);
    pair.run_until("both playing", |pair| {
        pair.host.phase() == GamePhase::Play && pair.guest.phase() == GamePhase::Play
    });
    assert!(pair.host_events.contains(&GameEvent::PhaseChanged {
        from: GamePhase::Select,
        to: GamePhase::Play,
    }));
    assert!(pair.host_observer.is_empty());
}

#[test]
fn tutorial_round_trip() {
    let mut pair = Pair::new(test_game_config());
    pair.connect();

    let transition = pair.host.request_tutorial().unwrap().unwrap();
    assert_eq!(transition.to, GamePhase::Tutorial);
    pair.run_until("guest in tutorial", |pair| {
        pair.guest.phase() == GamePhase::Tutorial
    });
    assert_eq!(pair.guest.screen(), Some(Screen::Tutorial));

    assert_eq!(pair.guest.exit_tutorial(), Ok(None));
    pair.run_until("both back in selection", |pair| {
        pair.host.phase() == GamePhase::Select && pair.guest.phase() == GamePhase::Select
    });
    assert_eq!(
        pair.guest_events
            .iter()
            .filter(|e| matches!(e, GameEvent::PhaseChanged { .. }))
            .count(),
        2
    );
}

#[test]
fn selection_is_locked_outside_select() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();

    assert_eq!(
        pair.guest.choose_character(PlayerType::Princess),
        Err(GameError::WrongPhase {
            expected: GamePhase::Select,
            actual: GamePhase::Play,
        })
    );
    assert!(!pair.guest_observer.has_violation(ViolationKind::Attribute));
}
