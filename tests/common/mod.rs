//! Common test infrastructure shared across integration tests.
//!
//! Sessions run over an in-process [`MemoryNetwork`] and share one [`ManualClock`], so every
//! scenario is deterministic and needs no sleeping.
//!
//! ```ignore
//! mod common;
//! use common::{Pair, FRAME_MS};
//!
//! let mut pair = Pair::new(common::test_game_config());
//! pair.connect();
//! pair.enter_play();
//! ```

#![allow(dead_code)]
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

pub mod test_utils;

use princess_of_fire::telemetry::CollectingObserver;
use princess_of_fire::{
    ChaosConfig, ChaosSocket, FrameRequests, GameConfig, GameEvent, GamePhase, GameSession,
    InputSample, LinkConfig, ManualClock, MemoryAddr, MemoryNetwork, NonBlockingSocket,
    PlayerType, SessionBuilder,
};
use std::sync::Arc;
use web_time::Duration;

#[allow(unused_imports)]
pub use test_utils::{left, right, PortAllocator};

/// Simulated time between frames.
pub const FRAME_MS: u64 = 16;

/// Upper bound for loops that wait on the other peer.
pub const MAX_FRAMES: usize = 2_000;

pub const HOST: MemoryAddr = MemoryAddr(1);
pub const GUEST: MemoryAddr = MemoryAddr(2);

/// Short rounds with a fixed warp seed.
pub fn test_game_config() -> GameConfig {
    GameConfig {
        round_duration: Duration::from_millis(2_000),
        rng_seed: Some(7),
        ..GameConfig::default()
    }
}

/// A host and a guest on one in-process network, driven by one manual clock.
pub struct Pair {
    pub clock: ManualClock,
    pub network: MemoryNetwork,
    pub host: GameSession<MemoryAddr>,
    pub guest: GameSession<MemoryAddr>,
    pub host_observer: Arc<CollectingObserver>,
    pub guest_observer: Arc<CollectingObserver>,
    pub host_events: Vec<GameEvent>,
    pub guest_events: Vec<GameEvent>,
}

impl Pair {
    /// Both peers on plain memory sockets.
    pub fn new(game: GameConfig) -> Self {
        let network = MemoryNetwork::new();
        let host_socket = network.socket(HOST.0);
        let guest_socket = network.socket(GUEST.0);
        Self::build(network, game, host_socket, guest_socket)
    }

    /// Both peers behind a [`ChaosSocket`].
    pub fn with_chaos(game: GameConfig, host_chaos: ChaosConfig, guest_chaos: ChaosConfig) -> Self {
        let network = MemoryNetwork::new();
        let host_socket = ChaosSocket::new(network.socket(HOST.0), host_chaos);
        let guest_socket = ChaosSocket::new(network.socket(GUEST.0), guest_chaos);
        Self::build(network, game, host_socket, guest_socket)
    }

    fn build(
        network: MemoryNetwork,
        game: GameConfig,
        host_socket: impl NonBlockingSocket<MemoryAddr> + 'static,
        guest_socket: impl NonBlockingSocket<MemoryAddr> + 'static,
    ) -> Self {
        let clock = ManualClock::new();
        let host_observer = Arc::new(CollectingObserver::new());
        let guest_observer = Arc::new(CollectingObserver::new());
        let host = SessionBuilder::new()
            .with_game_config(game)
            .with_link_config(LinkConfig::deterministic(11))
            .with_clock(clock.clone())
            .with_violation_observer(host_observer.clone())
            .start_host_session(host_socket)
            .expect("host session should start");
        let guest = SessionBuilder::new()
            .with_game_config(game)
            .with_link_config(LinkConfig::deterministic(22))
            .with_clock(clock.clone())
            .with_violation_observer(guest_observer.clone())
            .start_guest_session(guest_socket, HOST)
            .expect("guest session should start");
        Self {
            clock,
            network,
            host,
            guest,
            host_observer,
            guest_observer,
            host_events: Vec::new(),
            guest_events: Vec::new(),
        }
    }

    /// Runs one frame on each peer, guest first, then advances the clock.
    pub fn frame_with(
        &mut self,
        host_input: InputSample,
        guest_input: InputSample,
    ) -> (FrameRequests, FrameRequests) {
        let guest = self.guest.advance_frame(&guest_input).unwrap();
        let host = self.host.advance_frame(&host_input).unwrap();
        self.guest_events.extend(self.guest.events());
        self.host_events.extend(self.host.events());
        self.clock.advance_ms(FRAME_MS);
        (host, guest)
    }

    pub fn frame(&mut self) -> (FrameRequests, FrameRequests) {
        self.frame_with(InputSample::neutral(), InputSample::neutral())
    }

    pub fn frames(&mut self, n: usize) {
        for _ in 0..n {
            self.frame();
        }
    }

    /// Runs neutral frames until `done` holds. Panics after [`MAX_FRAMES`].
    pub fn run_until(&mut self, what: &str, mut done: impl FnMut(&Self) -> bool) {
        for _ in 0..MAX_FRAMES {
            if done(self) {
                return;
            }
            self.frame();
        }
        panic!("gave up waiting for {what}");
    }

    pub fn connect(&mut self) {
        self.run_until("connection", |pair| {
            pair.host.is_connected() && pair.guest.is_connected()
        });
    }

    /// Host plays the princess, guest the dragon.
    pub fn select_characters(&mut self) {
        self.host.choose_character(PlayerType::Princess).unwrap();
        self.guest.choose_character(PlayerType::Dragon).unwrap();
        self.run_until("selections", |pair| {
            pair.host.state().shared().peer_selection() == PlayerType::Dragon
                && pair.guest.state().shared().peer_selection() == PlayerType::Princess
        });
    }

    /// Connects, selects and starts a round on both peers.
    pub fn enter_play(&mut self) {
        self.connect();
        self.select_characters();
        let transition = self.host.request_start().unwrap();
        assert!(transition.is_some(), "host should start the round");
        self.run_until("guest entering play", |pair| {
            pair.guest.phase() == GamePhase::Play
        });
    }

    pub fn take_host_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.host_events)
    }

    pub fn take_guest_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.guest_events)
    }
}
