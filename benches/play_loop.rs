//! Benchmarks for the per-frame session work
//!
//! Run with: cargo bench --bench play_loop
//!
//! A session runs `advance_frame` once per display frame, so a frame has to stay far below
//! 16ms even on a handheld.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use princess_of_fire::{
    distance, Buttons, GameConfig, GamePhase, GameSession, InputSample, LinkConfig, ManualClock,
    MemoryAddr, MemoryNetwork, PlayerType, Position, SessionBuilder,
};
use std::hint::black_box;
use web_time::Duration;

struct Pair {
    clock: ManualClock,
    host: GameSession<MemoryAddr>,
    guest: GameSession<MemoryAddr>,
}

impl Pair {
    fn frame(&mut self, host: &InputSample, guest: &InputSample) {
        black_box(self.guest.advance_frame(guest).unwrap());
        black_box(self.host.advance_frame(host).unwrap());
        self.guest.events().for_each(drop);
        self.host.events().for_each(drop);
        self.clock.advance_ms(16);
    }
}

/// A pair that is playing a round long enough to outlast the benchmark.
fn playing_pair() -> Pair {
    let network = MemoryNetwork::new();
    let clock = ManualClock::new();
    let game = GameConfig {
        round_duration: Duration::from_secs(3_600),
        rng_seed: Some(1),
        ..GameConfig::default()
    };
    let host = SessionBuilder::new()
        .with_game_config(game)
        .with_link_config(LinkConfig::deterministic(1))
        .with_clock(clock.clone())
        .start_host_session(network.socket(1))
        .unwrap();
    let guest = SessionBuilder::new()
        .with_game_config(game)
        .with_link_config(LinkConfig::deterministic(2))
        .with_clock(clock.clone())
        .start_guest_session(network.socket(2), MemoryAddr(1))
        .unwrap();
    let mut pair = Pair { clock, host, guest };

    let neutral = InputSample::neutral();
    for _ in 0..3 {
        pair.frame(&neutral, &neutral);
    }
    pair.host.choose_character(PlayerType::Dragon).unwrap();
    pair.guest.choose_character(PlayerType::Princess).unwrap();
    for _ in 0..3 {
        pair.frame(&neutral, &neutral);
    }
    pair.host.request_start().unwrap();
    while pair.guest.phase() != GamePhase::Play {
        pair.frame(&neutral, &neutral);
    }
    pair
}

/// Both peers idle: the link only trades keepalives.
fn bench_idle_frame(c: &mut Criterion) {
    let mut pair = playing_pair();
    let neutral = InputSample::neutral();
    c.bench_function("advance_frame/idle", |b| {
        b.iter(|| pair.frame(&neutral, &neutral));
    });
}

/// Both peers moving every frame: two position writes and their acks each way.
fn bench_moving_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("advance_frame/moving");
    // vertical moves keep the players apart; x never changes
    for (name, axis_y) in [("down", 1023u16), ("up", 0u16)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &axis_y, |b, &axis_y| {
            let mut pair = playing_pair();
            let input = InputSample {
                axis_x: InputSample::CENTER,
                axis_y,
                buttons: Buttons::NONE,
            };
            b.iter(|| pair.frame(&input, &input));
        });
    }
    group.finish();
}

fn bench_distance(c: &mut Criterion) {
    let a = Position::new(3, 7);
    let b = Position::new(319, 239);
    c.bench_function("distance", |bench| {
        bench.iter(|| distance(black_box(a), black_box(b)));
    });
}

criterion_group!(benches, bench_idle_frame, bench_moving_frame, bench_distance);
criterion_main!(benches);
