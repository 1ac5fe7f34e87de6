//! Link state machine.
//!
//! # State Machine Diagram
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Link State Machine                             │
//! │                                                                         │
//! │   ┌──────────────┐        start()        ┌─────────────┐                │
//! │   │ Initializing │ ─────────────────────►│ Discovering │◄─────────┐     │
//! │   └──────────────┘                       └──────┬──────┘          │     │
//! │                                                 │                 │     │
//! │                                    handshake ok │                 │     │
//! │                                                 ▼                 │     │
//! │                                          ┌─────────────┐          │     │
//! │                                          │  Connected  │◄──┐      │     │
//! │                                          └──────┬──────┘   │      │     │
//! │                                                 │          │      │     │
//! │                              disconnect_timeout │   resume │      │     │
//! │                              or Disconnect msg  │   ┌──────┴────┐ │     │
//! │                                                 │   │  Network  │ │     │
//! │                                                 │   │Interrupted│ │     │
//! │                                                 │   └───────────┘ │     │
//! │                                                 ▼                 │     │
//! │                                         ┌──────────────┐          │     │
//! │                                         │ Disconnected │──────────┘     │
//! │                                         └──────────────┘ retry delay    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## State Transitions
//!
//! | From          | To            | Trigger                                       |
//! |---------------|---------------|-----------------------------------------------|
//! | Initializing  | Discovering   | `start()` called                              |
//! | Discovering   | Connected     | Host: valid `ConnectRequest`; guest: reply    |
//! | Connected     | Disconnected  | Disconnect timeout, `Disconnect` message      |
//! | Disconnected  | Discovering   | `connect_retry_interval` elapsed              |
//!
//! ## Events Emitted
//!
//! - **Connected**: Handshake complete
//! - **NetworkInterrupted**: No packets received for `disconnect_notify_start`
//! - **NetworkResumed**: Packets received after interruption
//! - **Disconnected**: Link lost, entering Disconnected state
//! - **AttributeChanged**: An in-order write from the peer was accepted

/// State of a [`LinkProtocol`](super::LinkProtocol).
///
/// ```text
/// Initializing ──► Discovering ──► Connected ──► Disconnected ──┐
///                      ▲                                        │
///                      └────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Created but not started. Nothing is sent or processed.
    ///
    /// **Transition**: `start()` → `Discovering`
    Initializing,

    /// Looking for the peer.
    ///
    /// The host waits for a `ConnectRequest` carrying the session service UUID. The guest
    /// sends one every `connect_retry_interval` until the host replies.
    ///
    /// **Transition**: handshake complete → `Connected`
    Discovering,

    /// Exchanging attribute writes.
    ///
    /// Unacknowledged writes are resent, keep-alives fill send silence and receive silence is
    /// watched for interruption and timeout.
    ///
    /// **Events emitted**:
    /// - `NetworkInterrupted { disconnect_timeout_ms }`
    /// - `NetworkResumed`
    /// - `AttributeChanged { attribute, value }`
    ///
    /// **Transition**: timeout or `Disconnect` message → `Disconnected`
    Connected,

    /// The link dropped. Nothing is exchanged until the retry delay elapses.
    ///
    /// **Transition**: `connect_retry_interval` elapsed → `Discovering`
    Disconnected,
}

impl LinkState {
    /// Returns `true` while attribute writes flow.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Discovering => write!(f, "Discovering"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
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

    #[test]
    fn only_connected_is_connected() {
        assert!(LinkState::Connected.is_connected());
        for state in [
            LinkState::Initializing,
            LinkState::Discovering,
            LinkState::Disconnected,
        ] {
            assert!(!state.is_connected(), "{state}");
        }
    }

    #[test]
    fn display_names() {
        assert_eq!(LinkState::Discovering.to_string(), "Discovering");
        assert_eq!(format!("{:?}", LinkState::Disconnected), "Disconnected");
    }
}
