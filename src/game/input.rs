//! Joystick and button input.
//!
//! The caller samples its hardware once per tick and hands an [`InputSample`] to the session.
//! Axes are expected already oriented (larger is right/down). Buttons use pressed = 1; an
//! adapter for active-low hardware inverts its mask before building the sample.

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr};

use crate::error::GameError;
use crate::game::movement::Direction;

/// A set of pressed buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Buttons(u32);

impl Buttons {
    /// No button pressed.
    pub const NONE: Self = Self(0);
    /// SELECT: power-up activation.
    pub const SELECT: Self = Self(1 << 0);
    /// A: cycles the acceleration.
    pub const A: Self = Self(1 << 5);
    /// START: warp to a random position.
    pub const START: Self = Self(1 << 16);

    /// Wraps a raw pressed-is-one mask.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw mask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every button in `other` is pressed.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Buttons pressed in `self` but not in `previous`.
    #[must_use]
    pub const fn pressed_since(self, previous: Self) -> Self {
        Self(self.0 & !previous.0)
    }
}

impl BitOr for Buttons {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for Buttons {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// One tick of controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSample {
    /// Horizontal axis, `0..=1023` on the reference hardware.
    pub axis_x: u16,
    /// Vertical axis, `0..=1023` on the reference hardware.
    pub axis_y: u16,
    /// Pressed buttons.
    pub buttons: Buttons,
}

impl InputSample {
    /// Axis value of a centered stick.
    pub const CENTER: u16 = 512;

    /// A centered stick with no buttons pressed.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            axis_x: Self::CENTER,
            axis_y: Self::CENTER,
            buttons: Buttons::NONE,
        }
    }

    /// A centered stick with `buttons` pressed.
    #[must_use]
    pub const fn with_buttons(buttons: Buttons) -> Self {
        Self {
            axis_x: Self::CENTER,
            axis_y: Self::CENTER,
            buttons,
        }
    }
}

impl Default for InputSample {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Dead zone for one axis. Values strictly above `high` push positive, strictly below `low`
/// push negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisThresholds {
    /// Upper bound of the negative zone.
    pub low: u16,
    /// Lower bound of the positive zone.
    pub high: u16,
}

impl AxisThresholds {
    /// Maps a raw axis value to `-1`, `0` or `1`.
    #[must_use]
    pub const fn direction(self, value: u16) -> i8 {
        if value > self.high {
            1
        } else if value < self.low {
            -1
        } else {
            0
        }
    }
}

/// Joystick dead zones.
///
/// The defaults are the reference controller's calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use = "JoystickConfig has no effect unless stored in a GameConfig"]
pub struct JoystickConfig {
    /// Horizontal dead zone.
    ///
    /// Default: low 500, high 600
    pub x: AxisThresholds,
    /// Vertical dead zone.
    ///
    /// Default: low 480, high 560
    pub y: AxisThresholds,
}

impl JoystickConfig {
    /// Creates the default calibration.
    pub const fn new() -> Self {
        Self {
            x: AxisThresholds {
                low: 500,
                high: 600,
            },
            y: AxisThresholds {
                low: 480,
                high: 560,
            },
        }
    }

    /// Maps a sample to a per-axis direction. Both axes are evaluated independently.
    #[must_use]
    pub const fn direction(&self, sample: &InputSample) -> Direction {
        Direction {
            dx: self.x.direction(sample.axis_x),
            dy: self.y.direction(sample.axis_y),
        }
    }

    /// Checks that each dead zone is non-empty.
    pub fn validate(&self) -> Result<(), GameError> {
        if self.x.low > self.x.high {
            return Err(GameError::InvalidConfig {
                field: "joystick.x",
                reason: format!("low {} exceeds high {}", self.x.low, self.x.high),
            });
        }
        if self.y.low > self.y.high {
            return Err(GameError::InvalidConfig {
                field: "joystick.y",
                reason: format!("low {} exceeds high {}", self.y.low, self.y.high),
            });
        }
        Ok(())
    }
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tick step multiplier, always in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acceleration(u8);

impl Acceleration {
    /// Slowest setting.
    pub const MIN: u8 = 1;
    /// Fastest setting, also the starting value.
    pub const MAX: u8 = 5;

    /// Creates an acceleration, or `None` outside `1..=5`.
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value >= Self::MIN && value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// The step multiplier.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Advances to the next setting: 5 wraps to 1, anything else goes up by one.
    pub fn cycle(&mut self) -> u8 {
        self.0 = if self.0 >= Self::MAX { Self::MIN } else { self.0 + 1 };
        self.0
    }
}

impl Default for Acceleration {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

/// Rising-edge detection across ticks.
///
/// Holding a button down fires once, on the tick where it goes from released to pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonLatch {
    previous: Buttons,
}

impl ButtonLatch {
    /// Records `current` and returns the buttons that were just pressed.
    pub fn update(&mut self, current: Buttons) -> Buttons {
        let pressed = current.pressed_since(self.previous);
        self.previous = current;
        pressed
    }

    /// Forgets the previous state, so a held button fires again on the next tick.
    pub fn reset(&mut self) {
        self.previous = Buttons::NONE;
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
    fn axis_dead_zone_boundaries() {
        let x = JoystickConfig::default().x;
        assert_eq!(x.direction(601), 1);
        assert_eq!(x.direction(600), 0);
        assert_eq!(x.direction(500), 0);
        assert_eq!(x.direction(499), -1);
        assert_eq!(x.direction(1023), 1);
        assert_eq!(x.direction(0), -1);
    }

    #[test]
    fn axes_are_independent() {
        let config = JoystickConfig::default();
        let sample = InputSample {
            axis_x: 700,
            axis_y: 100,
            buttons: Buttons::NONE,
        };
        assert_eq!(config.direction(&sample), Direction { dx: 1, dy: -1 });
        assert!(config.direction(&InputSample::neutral()).is_neutral());
    }

    #[test]
    fn vertical_thresholds_differ_from_horizontal() {
        let config = JoystickConfig::default();
        let sample = InputSample {
            axis_x: 570,
            axis_y: 570,
            buttons: Buttons::NONE,
        };
        assert_eq!(config.direction(&sample), Direction { dx: 0, dy: 1 });
    }

    #[test]
    fn inverted_dead_zone_is_rejected() {
        let mut config = JoystickConfig::default();
        config.y.low = 700;
        assert!(matches!(
            config.validate(),
            Err(GameError::InvalidConfig {
                field: "joystick.y",
                ..
            })
        ));
    }

    #[test]
    fn acceleration_cycles_five_to_one() {
        let mut accel = Acceleration::default();
        assert_eq!(accel.get(), 5);
        let seen: Vec<u8> = (0..6).map(|_| accel.cycle()).collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 1]);
        assert!(Acceleration::new(0).is_none());
        assert!(Acceleration::new(6).is_none());
    }

    #[test]
    fn latch_fires_on_rising_edge_only() {
        let mut latch = ButtonLatch::default();
        assert_eq!(latch.update(Buttons::SELECT), Buttons::SELECT);
        assert_eq!(latch.update(Buttons::SELECT), Buttons::NONE);
        assert_eq!(
            latch.update(Buttons::SELECT | Buttons::START),
            Buttons::START
        );
        assert_eq!(latch.update(Buttons::NONE), Buttons::NONE);
        assert_eq!(latch.update(Buttons::SELECT), Buttons::SELECT);
        latch.reset();
        assert_eq!(latch.update(Buttons::SELECT), Buttons::SELECT);
    }

    #[test]
    fn button_bits_match_controller_layout() {
        assert_eq!(Buttons::SELECT.bits(), 0x0000_0001);
        assert_eq!(Buttons::A.bits(), 0x0000_0020);
        assert_eq!(Buttons::START.bits(), 0x0001_0000);
        let both = Buttons::from_bits(0x0001_0001);
        assert!(both.contains(Buttons::START));
        assert!(both.contains(Buttons::SELECT));
        assert!(!both.contains(Buttons::A));
    }
}
