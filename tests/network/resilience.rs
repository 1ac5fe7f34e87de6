//! Session resilience under injected link faults.
//!
//! Every fault decision is seeded, so each scenario replays identically.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{left, right, test_game_config, Pair};
use princess_of_fire::telemetry::ViolationKind;
use princess_of_fire::{
    ChaosConfig, EndCause, GameConfig, GameEvent, GamePhase, InputSample, PlayerType,
};
use web_time::Duration;

fn seeded(config: ChaosConfig, seed: u64) -> ChaosConfig {
    ChaosConfig {
        seed: Some(seed),
        ..config
    }
}

fn long_round() -> GameConfig {
    GameConfig {
        round_duration: Duration::from_millis(20_000),
        ..test_game_config()
    }
}

fn count(events: &[GameEvent], wanted: GameEvent) -> usize {
    events.iter().filter(|e| **e == wanted).count()
}

#[test]
fn lossy_link_still_plays_a_full_round() {
    let mut pair = Pair::with_chaos(
        long_round(),
        seeded(ChaosConfig::lossy(0.2), 1),
        seeded(ChaosConfig::lossy(0.2), 2),
    );
    pair.enter_play();

    for _ in 0..4 {
        pair.frame_with(left(), InputSample::neutral());
    }
    assert_eq!(pair.host.phase(), GamePhase::Over);
    pair.run_until("guest game over", |pair| pair.guest.phase() == GamePhase::Over);

    let outcome = pair.guest.state().outcome().expect("end cause precedes the phase");
    assert_eq!(outcome.cause, EndCause::Caught);
    assert!(!outcome.local_won);
    assert_eq!(
        count(
            &pair.guest_events,
            GameEvent::PhaseChanged {
                from: GamePhase::Select,
                to: GamePhase::Play,
            }
        ),
        1
    );
    assert!(!pair.guest_observer.has_violation(ViolationKind::Synchronization));
}

#[test]
fn duplicated_datagrams_are_applied_once() {
    let chaos = ChaosConfig::builder().duplication_rate(0.5).build();
    let mut pair = Pair::with_chaos(long_round(), seeded(chaos, 3), seeded(chaos, 4));
    pair.enter_play();
    pair.frames(10);

    assert_eq!(
        count(
            &pair.guest_events,
            GameEvent::OpponentSelected(PlayerType::Princess)
        ),
        1
    );
    assert_eq!(
        count(
            &pair.host_events,
            GameEvent::OpponentSelected(PlayerType::Dragon)
        ),
        1
    );
    assert_eq!(
        count(
            &pair.host_events,
            GameEvent::PhaseChanged {
                from: GamePhase::Select,
                to: GamePhase::Play,
            }
        ),
        1
    );
}

#[test]
fn positions_converge_over_a_noisy_radio() {
    let mut pair = Pair::with_chaos(
        long_round(),
        seeded(ChaosConfig::noisy_radio(), 5),
        seeded(ChaosConfig::noisy_radio(), 6),
    );
    pair.enter_play();

    for _ in 0..10 {
        pair.frame_with(right(), left());
    }
    let host_position = pair.host.state().shared().local_position();
    let guest_position = pair.guest.state().shared().local_position();
    assert_eq!(host_position.x, 60);
    assert_eq!(guest_position.x, 250);

    pair.run_until("mirrors catching up", |pair| {
        pair.host.state().shared().peer_position() == guest_position
            && pair.guest.state().shared().peer_position() == host_position
    });
    assert_eq!(pair.host.phase(), GamePhase::Play);
    assert!(!pair.host_observer.has_violation(ViolationKind::Attribute));
    assert!(!pair.guest_observer.has_violation(ViolationKind::Attribute));
}
