//! Positions, the arena, edge handling and distance.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rng::Rng;

/// A point on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate, `0` at the left edge.
    pub x: i32,
    /// Vertical coordinate, `0` at the top edge.
    pub y: i32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The playfield. Valid positions lie in `[0, width) × [0, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arena {
    /// Width in screen units.
    pub width: i32,
    /// Height in screen units.
    pub height: i32,
}

impl Arena {
    /// The handheld's 320×240 screen.
    pub const SCREEN: Self = Self {
        width: 320,
        height: 240,
    };

    /// Creates an arena.
    #[must_use]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if `position` lies inside the arena.
    #[must_use]
    pub const fn contains(&self, position: Position) -> bool {
        position.x >= 0 && position.x < self.width && position.y >= 0 && position.y < self.height
    }

    /// Picks a uniformly random in-bounds position.
    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        Position {
            x: rng.gen_range(0..self.width.max(1) as u32) as i32,
            y: rng.gen_range(0..self.height.max(1) as u32) as i32,
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::SCREEN
    }
}

/// What happens when a step would leave the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EdgePolicy {
    /// Leave one edge, come back in on the opposite one.
    #[default]
    Wrap,
    /// Stop at the edge.
    Clamp,
}

impl EdgePolicy {
    /// Applies the policy to one coordinate of extent `extent`.
    #[must_use]
    pub fn apply(self, value: i32, delta: i32, extent: i32) -> i32 {
        let extent = extent.max(1);
        let moved = value.saturating_add(delta);
        match self {
            Self::Wrap => moved.rem_euclid(extent),
            Self::Clamp => moved.clamp(0, extent - 1),
        }
    }
}

/// Per-axis direction, each component in `-1..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Direction {
    /// Horizontal direction.
    pub dx: i8,
    /// Vertical direction.
    pub dy: i8,
}

impl Direction {
    /// No movement.
    pub const NONE: Self = Self { dx: 0, dy: 0 };

    /// Returns `true` if neither axis moves.
    #[must_use]
    pub const fn is_neutral(self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Moves `position` by `direction * speed` under `policy`.
#[must_use]
pub fn step(
    position: Position,
    direction: Direction,
    speed: u8,
    arena: Arena,
    policy: EdgePolicy,
) -> Position {
    let speed = i32::from(speed);
    Position {
        x: policy.apply(position.x, i32::from(direction.dx) * speed, arena.width),
        y: policy.apply(position.y, i32::from(direction.dy) * speed, arena.height),
    }
}

/// Euclidean distance, truncated to an integer.
///
/// ```
/// use princess_of_fire::{distance, Position};
///
/// assert_eq!(distance(Position::new(100, 100), Position::new(105, 100)), 5);
/// assert_eq!(distance(Position::new(0, 0), Position::new(3, 5)), 5); // sqrt(34) = 5.83
/// ```
#[must_use]
pub fn distance(a: Position, b: Position) -> u64 {
    let dx = u128::from((i64::from(a.x) - i64::from(b.x)).unsigned_abs());
    let dy = u128::from((i64::from(a.y) - i64::from(b.y)).unsigned_abs());
    (dx * dx + dy * dy).isqrt() as u64
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
    use crate::rng::{Pcg32, SeedableRng};

    const RIGHT: Direction = Direction { dx: 1, dy: 0 };
    const UP_LEFT: Direction = Direction { dx: -1, dy: -1 };

    #[test]
    fn wrap_crosses_right_edge() {
        let moved = step(
            Position::new(318, 10),
            RIGHT,
            5,
            Arena::SCREEN,
            EdgePolicy::Wrap,
        );
        assert_eq!(moved, Position::new(3, 10));
    }

    #[test]
    fn wrap_crosses_top_left_corner() {
        let moved = step(
            Position::new(1, 2),
            UP_LEFT,
            3,
            Arena::SCREEN,
            EdgePolicy::Wrap,
        );
        assert_eq!(moved, Position::new(318, 239));
    }

    #[test]
    fn clamp_saturates() {
        let arena = Arena::SCREEN;
        assert_eq!(
            step(Position::new(318, 10), RIGHT, 5, arena, EdgePolicy::Clamp),
            Position::new(319, 10)
        );
        assert_eq!(
            step(Position::new(1, 2), UP_LEFT, 3, arena, EdgePolicy::Clamp),
            Position::new(0, 0)
        );
    }

    #[test]
    fn neutral_direction_is_identity() {
        let p = Position::new(42, 17);
        assert_eq!(
            step(p, Direction::NONE, 5, Arena::SCREEN, EdgePolicy::Wrap),
            p
        );
        assert!(Direction::NONE.is_neutral());
    }

    #[test]
    fn distance_truncates() {
        assert_eq!(distance(Position::new(100, 100), Position::new(105, 100)), 5);
        assert_eq!(distance(Position::new(0, 0), Position::new(319, 239)), 398);
        assert_eq!(distance(Position::new(7, 7), Position::new(7, 7)), 0);
        // sqrt(200) = 14.14
        assert_eq!(distance(Position::new(0, 0), Position::new(10, 10)), 14);
    }

    #[test]
    fn distance_handles_extreme_coordinates() {
        let a = Position::new(i32::MIN, i32::MIN);
        let b = Position::new(i32::MAX, i32::MAX);
        assert_eq!(distance(a, b), distance(b, a));
        assert!(distance(a, b) > u64::from(u32::MAX));
    }

    #[test]
    fn random_positions_are_in_bounds() {
        let mut rng = Pcg32::seed_from_u64(99);
        let arena = Arena::SCREEN;
        for _ in 0..1_000 {
            assert!(arena.contains(arena.random_position(&mut rng)));
        }
    }

    #[test]
    fn contains_is_half_open() {
        let arena = Arena::SCREEN;
        assert!(arena.contains(Position::new(0, 0)));
        assert!(arena.contains(Position::new(319, 239)));
        assert!(!arena.contains(Position::new(320, 0)));
        assert!(!arena.contains(Position::new(0, -1)));
    }
}
