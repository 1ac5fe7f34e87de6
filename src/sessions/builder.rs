//! Configures and starts a [`GameSession`](crate::GameSession).

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::{
    clock::{Clock, SystemClock},
    game::SessionState,
    network::protocol::LinkProtocol,
    rng::{Pcg32, SeedableRng},
    sessions::config::{GameConfig, LinkConfig},
    telemetry::ViolationObserver,
    Address, GameError, GameSession, NonBlockingSocket, Role,
};

/// Default maximum number of undrained events per session.
const DEFAULT_EVENT_QUEUE_SIZE: usize = 100;
const MIN_EVENT_QUEUE_SIZE: usize = 10;

/// Builds a [`GameSession`] for either role.
///
/// ```
/// use princess_of_fire::{GameConfig, MemoryAddr, MemoryNetwork, Role, SessionBuilder};
///
/// let network = MemoryNetwork::new();
/// let host = SessionBuilder::<MemoryAddr>::new()
///     .with_game_config(GameConfig::quick_round())
///     .start_host_session(network.socket(1))?;
/// assert_eq!(host.role(), Role::Host);
/// # Ok::<(), princess_of_fire::GameError>(())
/// ```
#[must_use = "SessionBuilder must be consumed by calling a start_*_session method"]
pub struct SessionBuilder<A: Address> {
    game_config: GameConfig,
    link_config: LinkConfig,
    clock: Arc<dyn Clock>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    event_queue_size: usize,
    address: PhantomData<A>,
}

impl<A: Address> std::fmt::Debug for SessionBuilder<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure so a new field cannot be forgotten here.
        let Self {
            game_config,
            link_config,
            clock: _,
            violation_observer,
            event_queue_size,
            address: _,
        } = self;

        f.debug_struct("SessionBuilder")
            .field("game_config", game_config)
            .field("link_config", link_config)
            .field("has_violation_observer", &violation_observer.is_some())
            .field("event_queue_size", event_queue_size)
            .finish_non_exhaustive()
    }
}

impl<A: Address> Default for SessionBuilder<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Address> SessionBuilder<A> {
    /// Starts with default game and link settings and the system clock.
    pub fn new() -> Self {
        Self {
            game_config: GameConfig::default(),
            link_config: LinkConfig::default(),
            clock: Arc::new(SystemClock),
            violation_observer: None,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            address: PhantomData,
        }
    }

    /// Sets the game rules. Validated when the session starts.
    pub fn with_game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    /// Sets the link timing. Validated when the session starts.
    pub fn with_link_config(mut self, config: LinkConfig) -> Self {
        self.link_config = config;
        self
    }

    /// Replaces the time source. Pass a [`ManualClock`](crate::ManualClock) clone to drive
    /// a session from a test.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets the maximum number of events to queue before the oldest are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidRequest`] if `size` is less than 10.
    ///
    /// ```
    /// use princess_of_fire::{GameError, MemoryAddr, SessionBuilder};
    ///
    /// let builder = SessionBuilder::<MemoryAddr>::new().with_event_queue_size(200)?;
    /// assert!(SessionBuilder::<MemoryAddr>::new().with_event_queue_size(3).is_err());
    /// # drop(builder);
    /// # Ok::<(), GameError>(())
    /// ```
    pub fn with_event_queue_size(mut self, size: usize) -> Result<Self, GameError> {
        if size < MIN_EVENT_QUEUE_SIZE {
            return Err(GameError::InvalidRequest {
                info: format!(
                    "event queue size {size} is below the minimum of {MIN_EVENT_QUEUE_SIZE}"
                ),
            });
        }
        self.event_queue_size = size;
        Ok(self)
    }

    /// Routes protocol and state violations to `observer` instead of only logging them.
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Starts a host session, advertising the game service on `socket`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if either configuration is out of range.
    pub fn start_host_session(
        self,
        socket: impl NonBlockingSocket<A> + 'static,
    ) -> Result<GameSession<A>, GameError> {
        self.validate()?;
        let link = LinkProtocol::host(self.link_config, self.violation_observer.clone());
        self.start(Role::Host, link, Box::new(socket))
    }

    /// Starts a guest session that connects to the host at `host_addr`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if either configuration is out of range.
    pub fn start_guest_session(
        self,
        socket: impl NonBlockingSocket<A> + 'static,
        host_addr: A,
    ) -> Result<GameSession<A>, GameError> {
        self.validate()?;
        let link = LinkProtocol::guest(
            host_addr,
            self.link_config,
            self.violation_observer.clone(),
        );
        self.start(Role::Guest, link, Box::new(socket))
    }

    fn validate(&self) -> Result<(), GameError> {
        self.game_config.validate()?;
        self.link_config.validate()
    }

    fn start(
        self,
        role: Role,
        mut link: LinkProtocol<A>,
        socket: Box<dyn NonBlockingSocket<A>>,
    ) -> Result<GameSession<A>, GameError> {
        link.start(self.clock.now())?;
        let rng = self
            .game_config
            .rng_seed
            .map_or_else(Pcg32::from_entropy, Pcg32::seed_from_u64);
        debug!("Starting {} session", role);
        Ok(GameSession::new(
            SessionState::new(role, self.game_config),
            link,
            socket,
            self.clock,
            rng,
            self.event_queue_size,
            self.violation_observer,
        ))
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
    use crate::network::memory_socket::{MemoryAddr, MemoryNetwork};
    use crate::network::protocol::LinkState;
    use web_time::Duration;

    #[test]
    fn default_event_queue_size() {
        let builder = SessionBuilder::<MemoryAddr>::new();
        assert_eq!(builder.event_queue_size, 100);
    }

    #[test]
    fn event_queue_size_minimum_is_ten() {
        assert!(SessionBuilder::<MemoryAddr>::new()
            .with_event_queue_size(9)
            .is_err());
        let builder = SessionBuilder::<MemoryAddr>::new()
            .with_event_queue_size(10)
            .expect("10 is the minimum");
        assert_eq!(builder.event_queue_size, 10);
    }

    #[test]
    fn invalid_game_config_is_rejected_at_start() {
        let network = MemoryNetwork::new();
        let config = GameConfig {
            round_duration: Duration::ZERO,
            ..GameConfig::default()
        };
        let result = SessionBuilder::new()
            .with_game_config(config)
            .start_host_session(network.socket(1));
        assert!(matches!(
            result,
            Err(GameError::InvalidConfig {
                field: "round_duration",
                ..
            })
        ));
    }

    #[test]
    fn invalid_link_config_is_rejected_at_start() {
        let network = MemoryNetwork::new();
        let config = LinkConfig {
            disconnect_timeout: Duration::ZERO,
            ..LinkConfig::default()
        };
        let result = SessionBuilder::new()
            .with_link_config(config)
            .start_guest_session(network.socket(2), MemoryAddr(1));
        assert!(matches!(result, Err(GameError::InvalidConfig { .. })));
    }

    #[test]
    fn started_sessions_are_discovering() {
        let network = MemoryNetwork::new();
        let host = SessionBuilder::new()
            .start_host_session(network.socket(1))
            .unwrap();
        let guest = SessionBuilder::new()
            .start_guest_session(network.socket(2), MemoryAddr(1))
            .unwrap();
        assert_eq!(host.role(), Role::Host);
        assert_eq!(guest.role(), Role::Guest);
        assert_eq!(host.link_state(), LinkState::Discovering);
        assert_eq!(guest.link_state(), LinkState::Discovering);
        assert!(!host.is_connected());
    }

    #[test]
    fn debug_lists_settings() {
        let builder = SessionBuilder::<MemoryAddr>::new();
        let text = format!("{builder:?}");
        assert!(text.contains("SessionBuilder"));
        assert!(text.contains("event_queue_size: 100"));
    }
}
