//! # Princess of Fire
//!
//! Session synchronization core for a two-player proximity chase game. Each player runs one
//! [`GameSession`] on their own device; the two sessions share a small table of integer
//! attributes over an unreliable datagram link and agree on the round's phase, the players'
//! characters and their positions.
//!
//! One device is the **host**. It owns the round: the phase, the timer and the end cause. The
//! other is the **guest**, which mirrors the host's phase and asks it for changes. Each peer owns
//! its own position, selection and power-up flag. Writes to attributes the peer owns are
//! rejected with [`GameError::NotOwner`].
//!
//! The session is request-driven. Call [`GameSession::advance_frame`] once per display frame
//! with the sampled input; it returns the [`GameRequest`]s to draw, and
//! [`GameSession::events`] yields the [`GameEvent`]s raised along the way.
//!
//! ```
//! use princess_of_fire::{
//!     GameConfig, GameEvent, InputSample, LinkConfig, ManualClock, MemoryAddr, MemoryNetwork,
//!     SessionBuilder,
//! };
//!
//! let network = MemoryNetwork::new();
//! let clock = ManualClock::new();
//! let mut host = SessionBuilder::<MemoryAddr>::new()
//!     .with_clock(clock.clone())
//!     .with_link_config(LinkConfig::deterministic(1))
//!     .start_host_session(network.socket(1))?;
//! let mut guest = SessionBuilder::new()
//!     .with_clock(clock.clone())
//!     .with_link_config(LinkConfig::deterministic(2))
//!     .start_guest_session(network.socket(2), MemoryAddr(1))?;
//!
//! for _ in 0..3 {
//!     guest.advance_frame(&InputSample::neutral())?;
//!     host.advance_frame(&InputSample::neutral())?;
//!     clock.advance_ms(16);
//! }
//! assert!(host.is_connected() && guest.is_connected());
//! assert!(guest.events().any(|event| event == GameEvent::Connected));
//! # Ok::<(), princess_of_fire::GameError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
use std::{fmt, fmt::Debug, hash::Hash};

use serde::{Deserialize, Serialize};

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::GameError;
pub use game::{
    distance, Acceleration, Buttons, EdgePolicy, EndCause, GamePhase, GameStateMachine,
    InputSample, Outcome, PlayLoop, PlayerType, Position, RoundTimer, SessionState,
};
pub use network::chaos_socket::{ChaosConfig, ChaosConfigBuilder, ChaosSocket, ChaosStats};
pub use network::memory_socket::{MemoryAddr, MemoryNetwork, MemorySocket};
pub use network::messages::Message;
pub use network::udp_socket::UdpNonBlockingSocket;
pub use sessions::builder::SessionBuilder;
pub use sessions::config::{GameConfig, LinkConfig};
pub use sessions::event_drain::EventDrain;
pub use sessions::game_session::{FrameRequests, GameSession};

/// The shared attribute table: identifiers, ownership and value domains.
pub mod attributes;
pub mod clock;
#[doc(hidden)]
pub mod error;
pub mod game;
/// Internal random number generator module based on PCG32.
///
/// Drives warp targets and the fault injection of [`ChaosSocket`].
pub mod rng;
pub mod shared_state;
pub mod telemetry;
pub mod sessions {
    //! Building and running a session.
    pub mod builder;
    pub mod config;
    pub mod event_drain;
    pub mod game_session;
}
pub mod network {
    //! The datagram link between the two devices.
    pub mod chaos_socket;
    /// Binary codec for datagrams and attribute values.
    ///
    /// Datagrams go through bincode; attribute values through a fixed 4-byte little-endian form.
    pub mod codec;
    pub mod memory_socket;
    #[doc(hidden)]
    pub mod messages;
    pub mod protocol;
    #[doc(hidden)]
    pub mod udp_socket;
}

// #############
// #   ROLE    #
// #############

/// Which side of the session a peer plays.
///
/// The host accepts the connection and owns the round. The guest connects to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Advertises the service and owns the round state.
    Host,
    /// Connects to the host and mirrors its round state.
    Guest,
}

impl Role {
    /// The other side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Guest => write!(f, "guest"),
        }
    }
}

// #############
// #  EVENTS   #
// #############

/// Notifications raised by a [`GameSession`]. Handling them is up to the user.
///
/// This enum is marked `#[non_exhaustive]`. Always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum GameEvent {
    /// The link to the peer is up. Both sides start over in character selection.
    Connected,
    /// The peer left or went silent past the disconnect timeout.
    Disconnected,
    /// Nothing has arrived from the peer for a while. The link drops in `disconnect_timeout_ms`.
    NetworkInterrupted {
        /// Milliseconds until the link is dropped.
        disconnect_timeout_ms: u128,
    },
    /// Sent only after [`GameEvent::NetworkInterrupted`], once the peer is heard from again.
    NetworkResumed,
    /// The game phase changed.
    PhaseChanged {
        /// Phase before the change.
        from: GamePhase,
        /// Phase after the change.
        to: GamePhase,
    },
    /// The opponent picked (or cleared, with [`PlayerType::Unchosen`]) a character.
    OpponentSelected(PlayerType),
    /// The host took the character this guest had picked. The guest's choice was cleared.
    SelectionRevoked,
    /// The round ended.
    GameOver(Outcome),
    /// A power-up was activated.
    PowerUpActivated {
        /// Charges left for the rest of the round.
        charges_remaining: u8,
    },
    /// The active power-up ran out.
    PowerUpExpired,
    /// The opponent's power-up started or stopped.
    OpponentPowerUp {
        /// Whether it is active now.
        active: bool,
    },
    /// The local player warped to a random position.
    Warped(Position),
    /// The local acceleration level changed.
    AccelerationChanged(u8),
}

// #############
// # REQUESTS  #
// #############

/// Whose marker a [`GameRequest::DrawPosition`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionOwner {
    /// This device's player.
    Local,
    /// The opponent. Only drawn while revealed.
    Peer,
}

/// A screen the presentation layer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// No peer yet, or the link was lost.
    WaitingForPeer,
    /// Character selection with both current choices.
    CharacterSelect {
        /// This device's choice.
        local: PlayerType,
        /// The opponent's choice.
        opponent: PlayerType,
    },
    /// The tutorial.
    Tutorial,
    /// The round in progress.
    Playing,
    /// The result screen. `None` only if the end cause never arrived.
    GameOver(Option<Outcome>),
}

/// Presentation requests returned by [`GameSession::advance_frame`], in the order they should
/// be fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum GameRequest {
    /// Draw a player's marker.
    DrawPosition {
        /// Whose marker.
        owner: PositionOwner,
        /// Where to draw it.
        position: Position,
    },
    /// Draw the round timer.
    DrawTimer {
        /// Milliseconds left in the round.
        remaining_ms: u64,
    },
    /// Draw the distance readout.
    DrawDistance {
        /// Distance between the players, in whole pixels.
        value: u64,
    },
    /// Switch to a screen. Only sent when the screen changes.
    ShowScreen(Screen),
}

// #############
// #  TRAITS   #
// #############

/// Identifies the remote peer on a [`NonBlockingSocket`].
///
/// Implemented for every type with the listed bounds, so `std::net::SocketAddr` and
/// [`MemoryAddr`] both qualify.
#[cfg(feature = "sync-send")]
pub trait Address: Clone + PartialEq + Eq + Hash + Debug + Send + Sync + 'static {}

#[cfg(feature = "sync-send")]
impl<T> Address for T where T: Clone + PartialEq + Eq + Hash + Debug + Send + Sync + 'static {}

/// This [`NonBlockingSocket`] trait is used when you want to use Princess of Fire with your own
/// transport. Messages should be sent in a UDP-like fashion, unordered and unreliable. The link
/// protocol on top makes sure attribute writes arrive in order.
#[cfg(feature = "sync-send")]
pub trait NonBlockingSocket<A: Address>: Send + Sync {
    /// Takes a [`Message`] and sends it to the given address.
    fn send_to(&mut self, msg: &Message, addr: &A);

    /// Returns all messages received since the last call, with the address each came from.
    fn receive_all_messages(&mut self) -> Vec<(A, Message)>;
}

/// Identifies the remote peer on a [`NonBlockingSocket`].
///
/// Implemented for every type with the listed bounds, so `std::net::SocketAddr` and
/// [`MemoryAddr`] both qualify.
#[cfg(not(feature = "sync-send"))]
pub trait Address: Clone + PartialEq + Eq + Hash + Debug + 'static {}

#[cfg(not(feature = "sync-send"))]
impl<T> Address for T where T: Clone + PartialEq + Eq + Hash + Debug + 'static {}

/// This [`NonBlockingSocket`] trait is used when you want to use Princess of Fire with your own
/// transport. Messages should be sent in a UDP-like fashion, unordered and unreliable. The link
/// protocol on top makes sure attribute writes arrive in order.
#[cfg(not(feature = "sync-send"))]
pub trait NonBlockingSocket<A: Address> {
    /// Takes a [`Message`] and sends it to the given address.
    fn send_to(&mut self, msg: &Message, addr: &A);

    /// Returns all messages received since the last call, with the address each came from.
    fn receive_all_messages(&mut self) -> Vec<(A, Message)>;
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn role_opponent_is_an_involution() {
        assert_eq!(Role::Host.opponent(), Role::Guest);
        assert_eq!(Role::Guest.opponent(), Role::Host);
        assert_eq!(Role::Host.opponent().opponent(), Role::Host);
    }

    #[test]
    fn role_display_is_lowercase() {
        assert_eq!(Role::Host.to_string(), "host");
        assert_eq!(Role::Guest.to_string(), "guest");
    }

    #[test]
    fn role_serializes_as_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Guest).unwrap(), "\"guest\"");
        let role: Role = serde_json::from_str("\"host\"").unwrap();
        assert_eq!(role, Role::Host);
    }

    #[test]
    fn socket_addr_and_memory_addr_are_addresses() {
        fn assert_address<A: Address>() {}
        assert_address::<std::net::SocketAddr>();
        assert_address::<MemoryAddr>();
    }

    #[test]
    fn game_over_screen_carries_outcome() {
        let outcome = Outcome::resolve(EndCause::Caught, PlayerType::Princess);
        let screen = Screen::GameOver(Some(outcome));
        assert_ne!(screen, Screen::GameOver(None));
        assert_ne!(screen, Screen::Playing);
    }
}
