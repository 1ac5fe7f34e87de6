//! Property-based tests for whole sessions.
//!
//! # Properties Tested
//!
//! - Mirrors converge: once both peers stop moving, each holds the other's position.
//! - Session state invariants hold after any input sequence.
//! - Positions stay inside the arena.
//! - The last write to an attribute always reaches the peer over a lossy link.
//! - Arbitrary datagrams never panic the decoder.
//! - Distance is zero to itself and symmetric everywhere in the arena.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

#[path = "common/mod.rs"]
mod common;

use common::{test_game_config, Pair};
use princess_of_fire::attributes::Attribute;
use princess_of_fire::network::codec;
use princess_of_fire::telemetry::InvariantChecker;
use princess_of_fire::{
    distance, Buttons, ChaosConfig, GamePhase, InputSample, Message, Position,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn axis_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![Just(0u16), Just(InputSample::CENTER), Just(1023u16), 0u16..1024]
}

fn arena_position() -> impl Strategy<Value = Position> {
    (0i32..320, 0i32..240).prop_map(|(x, y)| Position::new(x, y))
}

fn buttons_strategy() -> impl Strategy<Value = Buttons> {
    prop_oneof![
        6 => Just(Buttons::NONE),
        1 => Just(Buttons::SELECT),
        1 => Just(Buttons::A),
        1 => Just(Buttons::START),
    ]
}

fn input_strategy() -> impl Strategy<Value = InputSample> {
    (axis_strategy(), axis_strategy(), buttons_strategy()).prop_map(|(axis_x, axis_y, buttons)| {
        InputSample {
            axis_x,
            axis_y,
            buttons,
        }
    })
}

fn inputs_strategy() -> impl Strategy<Value = Vec<(InputSample, InputSample)>> {
    prop::collection::vec((input_strategy(), input_strategy()), 1..40)
}

// ============================================================================
// Session Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Random play never breaks invariants, and the mirrors settle on the truth.
    #[test]
    fn prop_mirrors_converge_after_random_play(inputs in inputs_strategy()) {
        let mut pair = Pair::new(test_game_config());
        pair.enter_play();

        for (host_input, guest_input) in inputs {
            pair.frame_with(host_input, guest_input);
            for session in [&pair.host, &pair.guest] {
                let result = session.state().check_invariants();
                prop_assert!(result.is_ok(), "invariant broken: {:?}", result.err());
                let position = session.state().shared().local_position();
                prop_assert!((0..320).contains(&position.x), "x out of arena: {}", position.x);
                prop_assert!((0..240).contains(&position.y), "y out of arena: {}", position.y);
            }
        }

        pair.frames(5);
        let host_position = pair.host.state().shared().local_position();
        let guest_position = pair.guest.state().shared().local_position();
        prop_assert_eq!(pair.host.state().shared().peer_position(), guest_position);
        prop_assert_eq!(pair.guest.state().shared().peer_position(), host_position);
        prop_assert_eq!(pair.host.phase(), pair.guest.phase());
        if pair.host.phase() == GamePhase::Over {
            prop_assert_eq!(
                pair.host.state().shared().end_cause(),
                pair.guest.state().shared().end_cause()
            );
        }
    }

    /// The latest of a burst of writes always lands, whatever the link drops.
    #[test]
    fn prop_last_write_wins_over_lossy_link(
        values in prop::collection::vec(0i32..320, 1..30),
        loss in 0.0f64..0.1,
        seed in any::<u64>(),
    ) {
        let host_chaos = ChaosConfig { seed: Some(seed), ..ChaosConfig::lossy(loss) };
        let guest_chaos = ChaosConfig {
            seed: Some(seed.wrapping_add(1)),
            ..ChaosConfig::lossy(loss)
        };
        let mut pair = Pair::with_chaos(test_game_config(), host_chaos, guest_chaos);
        pair.connect();

        for value in &values {
            pair.guest.write_attribute(Attribute::GuestX, *value).unwrap();
            pair.frame();
        }
        let last = *values.last().unwrap();
        pair.run_until("last write", |pair| {
            pair.host.read_attribute(Attribute::GuestX) == last
        });
        prop_assert!(pair.host.is_connected());
    }
}

// ============================================================================
// Decoder Robustness
// ============================================================================

proptest! {
    /// Garbage from the radio is rejected, never a panic.
    #[test]
    fn prop_decode_arbitrary_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = codec::decode::<Message>(&bytes);
        let _ = codec::decode_attribute_value(&bytes);
    }

    /// Every four-byte value round-trips; any other length is an error.
    #[test]
    fn prop_attribute_values_need_exactly_four_bytes(bytes in prop::collection::vec(any::<u8>(), 0..8)) {
        let decoded = codec::decode_attribute_value(&bytes);
        if bytes.len() == 4 {
            let value = decoded.unwrap();
            let encoded = codec::encode_attribute_value(value);
            prop_assert_eq!(encoded.as_slice(), bytes.as_slice());
        } else {
            prop_assert!(decoded.is_err());
        }
    }
}

// ============================================================================
// Distance
// ============================================================================

proptest! {
    #[test]
    fn prop_distance_to_self_is_zero(p in arena_position()) {
        prop_assert_eq!(distance(p, p), 0);
    }

    #[test]
    fn prop_distance_is_symmetric(a in arena_position(), b in arena_position()) {
        prop_assert_eq!(distance(a, b), distance(b, a));
    }

    /// Truncation never drops below the longer leg or exceeds the two legs together.
    #[test]
    fn prop_distance_between_legs(a in arena_position(), b in arena_position()) {
        let dx = u64::from(a.x.abs_diff(b.x));
        let dy = u64::from(a.y.abs_diff(b.y));
        let d = distance(a, b);
        prop_assert!(d >= dx.max(dy));
        prop_assert!(d <= dx + dy);
    }
}
