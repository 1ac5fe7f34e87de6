#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{left, test_game_config, Pair};
use princess_of_fire::{
    distance, Buttons, EndCause, GameEvent, GamePhase, GameRequest, InputSample, Outcome,
    PlayerType, Position, PositionOwner, Screen,
};

fn press(buttons: Buttons) -> InputSample {
    InputSample::with_buttons(buttons)
}

#[test]
fn both_peers_enter_play_together() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();

    let play = GameEvent::PhaseChanged {
        from: GamePhase::Select,
        to: GamePhase::Play,
    };
    assert_eq!(pair.host_events.iter().filter(|e| **e == play).count(), 1);
    assert_eq!(pair.guest_events.iter().filter(|e| **e == play).count(), 1);
    assert_eq!(pair.host.screen(), Some(Screen::Playing));
    assert_eq!(pair.guest.screen(), Some(Screen::Playing));
    assert!(pair.host.state().timer().is_running());
    assert!(pair.guest.state().timer().is_running());
}

#[test]
fn play_frames_draw_local_marker_timer_and_distance() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();

    let (host, _) = pair.frame();
    assert_eq!(host.len(), 3, "{host:?}");
    assert_eq!(
        host[0],
        GameRequest::DrawPosition {
            owner: PositionOwner::Local,
            position: Position::new(10, 120),
        }
    );
    assert!(matches!(host[1], GameRequest::DrawTimer { remaining_ms } if remaining_ms <= 2_000));
    assert_eq!(host[2], GameRequest::DrawDistance { value: 290 });
}

#[test]
fn princess_catching_the_dragon_ends_the_round() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();

    // the arena wraps: four steps left from x=10 lands on x=310, ten pixels from the dragon
    for _ in 0..4 {
        pair.frame_with(left(), InputSample::neutral());
    }
    assert_eq!(pair.host.phase(), GamePhase::Over);
    pair.run_until("guest game over", |pair| pair.guest.phase() == GamePhase::Over);

    let host_outcome = Outcome {
        cause: EndCause::Caught,
        winner: PlayerType::Princess,
        local_won: true,
    };
    let guest_outcome = Outcome {
        cause: EndCause::Caught,
        winner: PlayerType::Princess,
        local_won: false,
    };
    assert!(pair.host_events.contains(&GameEvent::GameOver(host_outcome)));
    assert!(pair.guest_events.contains(&GameEvent::GameOver(guest_outcome)));
    assert_eq!(pair.guest.screen(), Some(Screen::GameOver(Some(guest_outcome))));
    assert!(!pair.host.state().timer().is_running());
    assert!(pair.guest_observer.is_empty());
}

#[test]
fn dragon_wins_when_the_timer_runs_out() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();

    pair.run_until("timeout", |pair| {
        pair.host.phase() == GamePhase::Over && pair.guest.phase() == GamePhase::Over
    });

    assert_eq!(pair.host.state().outcome().map(|o| o.cause), Some(EndCause::Timeout));
    let guest = pair.guest.state().outcome().unwrap();
    assert_eq!(guest.winner, PlayerType::Dragon);
    assert!(guest.local_won);
}

#[test]
fn play_again_resets_the_round() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();
    for _ in 0..4 {
        pair.frame_with(left(), InputSample::neutral());
    }
    pair.run_until("guest game over", |pair| pair.guest.phase() == GamePhase::Over);

    // the guest asks, the host decides
    assert_eq!(pair.guest.play_again(), Ok(None));
    pair.run_until("back to selection", |pair| {
        pair.host.phase() == GamePhase::Select && pair.guest.phase() == GamePhase::Select
    });
    pair.frames(3);

    for session in [&pair.host, &pair.guest] {
        let shared = session.state().shared();
        assert_eq!(shared.local_selection(), PlayerType::Unchosen);
        assert_eq!(shared.peer_selection(), PlayerType::Unchosen);
        assert_eq!(shared.end_cause(), None);
        assert_eq!(session.state().outcome(), None);
    }
    assert_eq!(pair.host.state().shared().local_position(), Position::new(10, 120));
    assert_eq!(pair.guest.state().shared().peer_position(), Position::new(10, 120));
    assert_eq!(
        pair.guest.screen(),
        Some(Screen::CharacterSelect {
            local: PlayerType::Unchosen,
            opponent: PlayerType::Unchosen,
        })
    );
}

#[test]
fn power_up_reveals_the_opponent_for_a_while() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();
    pair.take_guest_events();

    let (host, _) = pair.frame_with(press(Buttons::SELECT), InputSample::neutral());
    assert!(pair
        .host_events
        .contains(&GameEvent::PowerUpActivated { charges_remaining: 2 }));
    assert!(host.contains(&GameRequest::DrawPosition {
        owner: PositionOwner::Peer,
        position: Position::new(300, 120),
    }));

    pair.run_until("guest noticing", |pair| {
        pair.guest_events
            .contains(&GameEvent::OpponentPowerUp { active: true })
    });

    // holding the button does not spend another charge
    pair.frame_with(press(Buttons::SELECT), InputSample::neutral());
    assert_eq!(pair.host.state().power_up().charges_remaining(), 2);
}

#[test]
fn a_cycles_acceleration_and_start_warps() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();
    pair.take_host_events();

    pair.frame_with(press(Buttons::A), InputSample::neutral());
    assert!(pair.host_events.contains(&GameEvent::AccelerationChanged(1)));
    assert_eq!(pair.host.state().acceleration().get(), 1);

    pair.frame_with(press(Buttons::START), InputSample::neutral());
    let warped = pair.host_events.iter().find_map(|e| match e {
        GameEvent::Warped(position) => Some(*position),
        _ => None,
    });
    let warped = warped.expect("START should warp");
    assert_eq!(pair.host.state().shared().local_position(), warped);
}

#[test]
fn guest_mirror_follows_host_moves() {
    let mut pair = Pair::new(test_game_config());
    pair.enter_play();

    pair.frame_with(left(), InputSample::neutral());
    pair.frame_with(left(), InputSample::neutral());
    pair.frames(2);

    let host_position = pair.host.state().shared().local_position();
    assert_eq!(host_position, Position::new(0, 120));
    assert_eq!(pair.guest.state().shared().peer_position(), host_position);
    assert_eq!(
        distance(host_position, pair.guest.state().shared().local_position()),
        300
    );
}
