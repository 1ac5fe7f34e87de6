//! Configuration types for game sessions.
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `GameConfig` | Arena, round length, power-ups, joystick | `classic()`, `quick_round()` |
//! | `LinkConfig` | Connection, keep-alive and delivery timing | `lan()`, `lossy()`, `deterministic()` |
//!
//! Both are plain `Copy` structs with public fields. Build them with struct update syntax
//! from a preset, hand them to the [`SessionBuilder`](crate::SessionBuilder), and they are
//! validated when the session starts.
//!
//! # Example
//!
//! ```
//! use princess_of_fire::{GameConfig, LinkConfig, SessionBuilder};
//! use std::net::SocketAddr;
//! use web_time::Duration;
//!
//! let builder = SessionBuilder::<SocketAddr>::new()
//!     .with_game_config(GameConfig {
//!         round_duration: Duration::from_secs(60),
//!         ..GameConfig::classic()
//!     })
//!     .with_link_config(LinkConfig::lan());
//! ```

use web_time::Duration;

use crate::game::{Arena, EdgePolicy, JoystickConfig, Position};
use crate::{GameError, Role};

fn check_duration(
    field: &'static str,
    value: Duration,
    min: Duration,
    max: Duration,
) -> Result<(), GameError> {
    if value < min || value > max {
        return Err(GameError::InvalidConfig {
            field,
            reason: format!(
                "{}ms is outside {}ms..={}ms",
                value.as_millis(),
                min.as_millis(),
                max.as_millis()
            ),
        });
    }
    Ok(())
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), GameError> {
    if value < min || value > max {
        return Err(GameError::InvalidConfig {
            field,
            reason: format!("{} is outside {}..={}", value, min, max),
        });
    }
    Ok(())
}

/// Rules and geometry of a round.
///
/// # Example
///
/// ```
/// use princess_of_fire::{EdgePolicy, GameConfig};
///
/// // The early devices stopped players at the screen edge
/// let config = GameConfig {
///     edge_policy: EdgePolicy::Clamp,
///     ..GameConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "GameConfig has no effect unless passed to SessionBuilder::with_game_config()"]
pub struct GameConfig {
    /// Playfield size. Positions outside it are protocol violations.
    ///
    /// Default: 320×240
    pub arena: Arena,

    /// Where the host starts every round.
    ///
    /// Default: (10, 120)
    pub host_spawn: Position,

    /// Where the guest starts every round.
    ///
    /// Default: (300, 120)
    pub guest_spawn: Position,

    /// What happens at the screen edge.
    ///
    /// Default: [`EdgePolicy::Wrap`]
    pub edge_policy: EdgePolicy,

    /// Length of a round.
    ///
    /// Default: 120000ms
    pub round_duration: Duration,

    /// Distance at or below which the princess catches the dragon.
    ///
    /// Default: 10
    pub catch_radius: u64,

    /// Power-up activations per player per round.
    ///
    /// Default: 3
    pub power_up_charges: u8,

    /// How long one activation reveals the opponent.
    ///
    /// Default: 5000ms
    pub power_up_window: Duration,

    /// Joystick dead zones.
    pub joystick: JoystickConfig,

    /// Seed for warp destinations. `None` draws from entropy.
    ///
    /// Default: `None`
    pub rng_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            arena: Arena::SCREEN,
            host_spawn: Position::new(10, 120),
            guest_spawn: Position::new(300, 120),
            edge_policy: EdgePolicy::Wrap,
            round_duration: Duration::from_millis(120_000),
            catch_radius: 10,
            power_up_charges: 3,
            power_up_window: Duration::from_millis(5_000),
            joystick: JoystickConfig::new(),
            rng_seed: None,
        }
    }
}

impl GameConfig {
    /// Creates a new `GameConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// The two-minute round the handhelds ship with.
    pub fn classic() -> Self {
        Self::default()
    }

    /// A 30-second round with a single, shorter reveal. Useful for demos.
    pub fn quick_round() -> Self {
        Self {
            round_duration: Duration::from_millis(30_000),
            power_up_charges: 1,
            power_up_window: Duration::from_millis(3_000),
            ..Self::default()
        }
    }

    /// The spawn point of `role`.
    #[must_use]
    pub const fn spawn(&self, role: Role) -> Position {
        match role {
            Role::Host => self.host_spawn,
            Role::Guest => self.guest_spawn,
        }
    }

    /// Validates the game configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] naming the first field out of range.
    pub fn validate(&self) -> Result<(), GameError> {
        // Validate arena: 1 to 4096 per side (negative extents wrap to huge values and fail too)
        check_range("arena.width", self.arena.width as u64, 1, 4096)?;
        check_range("arena.height", self.arena.height as u64, 1, 4096)?;
        for (field, spawn) in [
            ("host_spawn", self.host_spawn),
            ("guest_spawn", self.guest_spawn),
        ] {
            if !self.arena.contains(spawn) {
                return Err(GameError::InvalidConfig {
                    field,
                    reason: format!(
                        "{} lies outside the {}x{} arena",
                        spawn, self.arena.width, self.arena.height
                    ),
                });
            }
        }
        check_duration(
            "round_duration",
            self.round_duration,
            Duration::from_secs(1),
            Duration::from_secs(3600),
        )?;
        check_range("catch_radius", self.catch_radius, 0, 4096)?;
        check_range("power_up_charges", u64::from(self.power_up_charges), 0, 10)?;
        check_duration(
            "power_up_window",
            self.power_up_window,
            Duration::from_millis(1),
            Duration::from_secs(60),
        )?;
        self.joystick.validate()
    }
}

/// Timing and sizing of the link between the two devices.
///
/// # Example
///
/// ```
/// use princess_of_fire::LinkConfig;
/// use web_time::Duration;
///
/// // Tolerate long radio dropouts before calling the link lost
/// let patient = LinkConfig {
///     disconnect_timeout: Duration::from_millis(8000),
///     ..LinkConfig::default()
/// };
/// assert!(patient.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "LinkConfig has no effect unless passed to SessionBuilder::with_link_config()"]
pub struct LinkConfig {
    /// Delay between connection attempts, and before retrying after a drop.
    ///
    /// Default: 3000ms
    pub connect_retry_interval: Duration,

    /// Send silence after which a keep-alive goes out.
    ///
    /// Default: 200ms
    pub keepalive_interval: Duration,

    /// How often unacknowledged attribute writes are sent again.
    ///
    /// Default: 200ms
    pub resend_interval: Duration,

    /// Receive silence after which the link is considered lost.
    ///
    /// Default: 2000ms
    pub disconnect_timeout: Duration,

    /// Receive silence after which a `NetworkInterrupted` event is raised.
    ///
    /// Must be shorter than `disconnect_timeout`.
    ///
    /// Default: 500ms
    pub disconnect_notify_start: Duration,

    /// Capacity of the change notification queue.
    ///
    /// Default: 64
    pub notification_queue_limit: usize,

    /// Unacknowledged writes above which a warning is reported.
    ///
    /// Default: 128
    pub pending_write_limit: usize,

    /// Seed for the link magic and handshake nonces. `None` draws from entropy.
    ///
    /// Default: `None`
    pub rng_seed: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_retry_interval: Duration::from_millis(3000),
            keepalive_interval: Duration::from_millis(200),
            resend_interval: Duration::from_millis(200),
            disconnect_timeout: Duration::from_millis(2000),
            disconnect_notify_start: Duration::from_millis(500),
            notification_queue_limit: 64,
            pending_write_limit: 128,
            rng_seed: None,
        }
    }
}

impl LinkConfig {
    /// Creates a new `LinkConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for a wired or otherwise reliable local link.
    ///
    /// Retries and detects drops faster.
    pub fn lan() -> Self {
        Self {
            connect_retry_interval: Duration::from_millis(1000),
            keepalive_interval: Duration::from_millis(100),
            resend_interval: Duration::from_millis(100),
            disconnect_timeout: Duration::from_millis(1000),
            disconnect_notify_start: Duration::from_millis(300),
            ..Self::default()
        }
    }

    /// Preset for noisy radio environments.
    ///
    /// Resends eagerly but waits longer before declaring the link lost.
    pub fn lossy() -> Self {
        Self {
            resend_interval: Duration::from_millis(100),
            disconnect_timeout: Duration::from_millis(5000),
            disconnect_notify_start: Duration::from_millis(1000),
            pending_write_limit: 256,
            ..Self::default()
        }
    }

    /// Default timing with a fixed RNG seed, for reproducible sessions.
    ///
    /// ```
    /// use princess_of_fire::LinkConfig;
    ///
    /// assert_eq!(LinkConfig::deterministic(42).rng_seed, Some(42));
    /// ```
    pub fn deterministic(seed: u64) -> Self {
        Self {
            rng_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Validates the link configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] naming the first field out of range.
    pub fn validate(&self) -> Result<(), GameError> {
        let min = Duration::from_millis(1);
        let max = Duration::from_secs(60);
        check_duration("connect_retry_interval", self.connect_retry_interval, min, max)?;
        check_duration("keepalive_interval", self.keepalive_interval, min, max)?;
        check_duration("resend_interval", self.resend_interval, min, max)?;
        check_duration("disconnect_timeout", self.disconnect_timeout, min, max)?;
        check_duration(
            "disconnect_notify_start",
            self.disconnect_notify_start,
            min,
            max,
        )?;
        if self.disconnect_notify_start >= self.disconnect_timeout {
            return Err(GameError::InvalidConfig {
                field: "disconnect_notify_start",
                reason: format!(
                    "{}ms must be shorter than disconnect_timeout ({}ms)",
                    self.disconnect_notify_start.as_millis(),
                    self.disconnect_timeout.as_millis()
                ),
            });
        }
        check_range(
            "notification_queue_limit",
            self.notification_queue_limit as u64,
            1,
            4096,
        )?;
        check_range(
            "pending_write_limit",
            self.pending_write_limit as u64,
            1,
            4096,
        )?;
        Ok(())
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

    fn invalid_field(result: Result<(), GameError>) -> &'static str {
        match result {
            Err(GameError::InvalidConfig { field, .. }) => field,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn presets_are_valid() {
        GameConfig::classic().validate().unwrap();
        GameConfig::quick_round().validate().unwrap();
        LinkConfig::default().validate().unwrap();
        LinkConfig::lan().validate().unwrap();
        LinkConfig::lossy().validate().unwrap();
        LinkConfig::deterministic(7).validate().unwrap();
    }

    #[test]
    fn classic_matches_handheld_defaults() {
        let config = GameConfig::classic();
        assert_eq!(config.arena, Arena::new(320, 240));
        assert_eq!(config.round_duration, Duration::from_millis(120_000));
        assert_eq!(config.catch_radius, 10);
        assert_eq!(config.power_up_charges, 3);
        assert_eq!(config.power_up_window, Duration::from_millis(5_000));
        assert_eq!(config.spawn(Role::Host), Position::new(10, 120));
        assert_eq!(config.spawn(Role::Guest), Position::new(300, 120));
        assert_eq!(config.edge_policy, EdgePolicy::Wrap);
    }

    #[test]
    fn spawn_outside_arena_is_rejected() {
        let config = GameConfig {
            guest_spawn: Position::new(320, 120),
            ..GameConfig::default()
        };
        assert_eq!(invalid_field(config.validate()), "guest_spawn");
    }

    #[test]
    fn zero_sized_arena_is_rejected() {
        let config = GameConfig {
            arena: Arena::new(0, 240),
            ..GameConfig::default()
        };
        assert_eq!(invalid_field(config.validate()), "arena.width");
    }

    #[test]
    fn round_duration_bounds() {
        let config = GameConfig {
            round_duration: Duration::from_millis(500),
            ..GameConfig::default()
        };
        assert_eq!(invalid_field(config.validate()), "round_duration");
    }

    #[test]
    fn notify_must_precede_timeout() {
        let config = LinkConfig {
            disconnect_notify_start: Duration::from_millis(2000),
            ..LinkConfig::default()
        };
        assert_eq!(invalid_field(config.validate()), "disconnect_notify_start");
    }

    #[test]
    fn empty_notification_queue_is_rejected() {
        let config = LinkConfig {
            notification_queue_limit: 0,
            ..LinkConfig::default()
        };
        assert_eq!(invalid_field(config.validate()), "notification_queue_limit");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = LinkConfig {
            keepalive_interval: Duration::ZERO,
            ..LinkConfig::default()
        };
        assert_eq!(invalid_field(config.validate()), "keepalive_interval");
    }
}
