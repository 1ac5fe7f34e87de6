//! Characters, phases, end causes and the winner rule.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The character a player controls.
///
/// The wire codes are `Princess = 1`, `Dragon = 2`, `Unchosen = 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerType {
    /// Chases the dragon. Wins by getting within the catch radius.
    Princess,
    /// Runs from the princess. Wins when the timer runs out.
    Dragon,
    /// No character picked yet.
    #[default]
    Unchosen,
}

impl PlayerType {
    /// Every character, in wire-code order.
    pub const ALL: [Self; 3] = [Self::Princess, Self::Dragon, Self::Unchosen];

    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Princess => 1,
            Self::Dragon => 2,
            Self::Unchosen => 3,
        }
    }

    /// Decodes a wire code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Princess),
            2 => Some(Self::Dragon),
            3 => Some(Self::Unchosen),
            _ => None,
        }
    }

    /// Returns `true` for `Princess` and `Dragon`.
    #[must_use]
    pub const fn is_chosen(self) -> bool {
        !matches!(self, Self::Unchosen)
    }

    /// Returns a lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Princess => "princess",
            Self::Dragon => "dragon",
            Self::Unchosen => "unchosen",
        }
    }
}

impl fmt::Display for PlayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The session phase.
///
/// ```text
///  ┌──────────┐  tutorial   ┌──────────┐
///  │  Select  │────────────►│ Tutorial │
///  │          │◄────────────│          │
///  └──┬────▲──┘    exit     └──────────┘
///     │    │
/// start    │ play again
///     ▼    │
///  ┌──────┐│ caught/timeout ┌──────┐
///  │ Play │└────────────────│ Over │
///  │      │────────────────►│      │
///  └──────┘                 └──────┘
/// ```
///
/// | From | To | Trigger |
/// |------|----|---------|
/// | Select | Tutorial | tutorial requested |
/// | Tutorial | Select | tutorial exit |
/// | Select | Play | start, both players chosen |
/// | Play | Over | caught or timer expired |
/// | Over | Select | play again |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Character selection. Sessions start here.
    #[default]
    Select,
    /// Instructions screen.
    Tutorial,
    /// The chase is running.
    Play,
    /// The round ended.
    Over,
}

impl GamePhase {
    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Select => 1,
            Self::Tutorial => 2,
            Self::Play => 3,
            Self::Over => 4,
        }
    }

    /// Decodes a wire code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Select),
            2 => Some(Self::Tutorial),
            3 => Some(Self::Play),
            4 => Some(Self::Over),
            _ => None,
        }
    }

    /// Returns `true` if `self -> next` is in the legal transition table.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Select, Self::Tutorial)
                | (Self::Tutorial, Self::Select)
                | (Self::Select, Self::Play)
                | (Self::Play, Self::Over)
                | (Self::Over, Self::Select)
        )
    }

    /// Returns a lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Tutorial => "tutorial",
            Self::Play => "play",
            Self::Over => "over",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a round ended. Wire code `0` means no cause yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCause {
    /// The round timer reached zero.
    Timeout,
    /// The players came within the catch radius.
    Caught,
}

impl EndCause {
    /// Wire code for "no cause recorded".
    pub const NONE_CODE: i32 = 0;

    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Timeout => 1,
            Self::Caught => 2,
        }
    }

    /// Decodes a wire code. `0` and unknown codes give `None`.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Timeout),
            2 => Some(Self::Caught),
            _ => None,
        }
    }

    /// Encodes an optional cause, using `0` for `None`.
    #[must_use]
    pub const fn code_of(cause: Option<Self>) -> i32 {
        match cause {
            Some(cause) => cause.code(),
            None => Self::NONE_CODE,
        }
    }

    /// The character that wins a round ending this way.
    ///
    /// A timeout means the princess never caught the dragon; a catch means she did.
    #[must_use]
    pub const fn winner(self) -> PlayerType {
        match self {
            Self::Timeout => PlayerType::Dragon,
            Self::Caught => PlayerType::Princess,
        }
    }

    /// Returns a lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Caught => "caught",
        }
    }
}

impl fmt::Display for EndCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of a finished round, seen from one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outcome {
    /// Why the round ended.
    pub cause: EndCause,
    /// The winning character.
    pub winner: PlayerType,
    /// Whether this peer played the winning character.
    pub local_won: bool,
}

impl Outcome {
    /// Applies the winner rule for a peer that played `local`.
    #[must_use]
    pub fn resolve(cause: EndCause, local: PlayerType) -> Self {
        let winner = cause.winner();
        Self {
            cause,
            winner,
            local_won: local == winner,
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

    const PHASES: [GamePhase; 4] = [
        GamePhase::Select,
        GamePhase::Tutorial,
        GamePhase::Play,
        GamePhase::Over,
    ];

    #[test]
    fn legal_transitions_are_exactly_five() {
        let legal: Vec<_> = PHASES
            .iter()
            .flat_map(|from| PHASES.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            legal,
            vec![
                (GamePhase::Select, GamePhase::Tutorial),
                (GamePhase::Select, GamePhase::Play),
                (GamePhase::Tutorial, GamePhase::Select),
                (GamePhase::Play, GamePhase::Over),
                (GamePhase::Over, GamePhase::Select),
            ]
        );
    }

    #[test]
    fn select_cannot_jump_to_over() {
        assert!(!GamePhase::Select.can_transition_to(GamePhase::Over));
        assert!(!GamePhase::Tutorial.can_transition_to(GamePhase::Play));
        assert!(!GamePhase::Play.can_transition_to(GamePhase::Select));
    }

    #[test]
    fn wire_codes() {
        assert_eq!(PlayerType::Princess.code(), 1);
        assert_eq!(PlayerType::Dragon.code(), 2);
        assert_eq!(PlayerType::Unchosen.code(), 3);
        assert_eq!(GamePhase::Over.code(), 4);
        assert_eq!(GamePhase::from_code(0), None);
        assert_eq!(GamePhase::from_code(5), None);
        assert_eq!(PlayerType::from_code(4), None);
        assert_eq!(EndCause::from_code(0), None);
        assert_eq!(EndCause::code_of(None), 0);
        assert_eq!(EndCause::code_of(Some(EndCause::Caught)), 2);
    }

    #[test]
    fn winner_rule() {
        assert_eq!(EndCause::Timeout.winner(), PlayerType::Dragon);
        assert_eq!(EndCause::Caught.winner(), PlayerType::Princess);
    }

    #[test]
    fn outcome_from_each_side() {
        let dragon_view = Outcome::resolve(EndCause::Timeout, PlayerType::Dragon);
        assert!(dragon_view.local_won);
        let princess_view = Outcome::resolve(EndCause::Timeout, PlayerType::Princess);
        assert!(!princess_view.local_won);
        assert_eq!(princess_view.winner, PlayerType::Dragon);

        let caught = Outcome::resolve(EndCause::Caught, PlayerType::Princess);
        assert!(caught.local_won);
        assert!(!Outcome::resolve(EndCause::Caught, PlayerType::Unchosen).local_won);
    }
}
