use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::attributes::{format_uuid, Attribute};
use crate::game::{GamePhase, PlayerType};
use crate::network::codec::CodecError;
use crate::Role;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), GameError>`].
///
/// [`Result<(), GameError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GameError {
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// A configuration value is out of its accepted range.
    InvalidConfig {
        /// The name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// The operation needs a connected peer, but the link is down.
    NotConnected,
    /// A write targeted an attribute that this peer does not own.
    NotOwner {
        /// The attribute that was written.
        attribute: Attribute,
        /// The role of the peer that attempted the write.
        role: Role,
    },
    /// A value is outside the domain of the attribute it was written to.
    InvalidAttributeValue {
        /// The attribute that was written.
        attribute: Attribute,
        /// The rejected value.
        value: i32,
    },
    /// An attribute UUID that is not part of the session service.
    UnknownAttribute {
        /// The unrecognized UUID.
        uuid: u128,
    },
    /// The attribute follows the game state machine and cannot be written directly.
    ManagedAttribute {
        /// The attribute that was written.
        attribute: Attribute,
    },
    /// The requested phase change is not in the legal transition table.
    IllegalTransition {
        /// The current phase.
        from: GamePhase,
        /// The requested phase.
        to: GamePhase,
    },
    /// The character is already held by the opponent.
    CharacterTaken {
        /// The character that was requested.
        character: PlayerType,
    },
    /// The operation is only valid in another phase.
    WrongPhase {
        /// The phase the operation needs.
        expected: GamePhase,
        /// The phase the session is in.
        actual: GamePhase,
    },
    /// Serialization or deserialization of data failed.
    SerializationError {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
    /// A network socket operation failed.
    SocketError {
        /// A description of the socket error.
        context: String,
    },
}

impl Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            }
            GameError::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration for `{}`: {}", field, reason)
            }
            GameError::NotConnected => {
                write!(f, "The session is not connected to a peer.")
            }
            GameError::NotOwner { attribute, role } => {
                write!(
                    f,
                    "Attribute {} is owned by the {}, not the {}",
                    attribute,
                    attribute.owner(),
                    role
                )
            }
            GameError::InvalidAttributeValue { attribute, value } => {
                write!(f, "Value {} is outside the domain of {}", value, attribute)
            }
            GameError::UnknownAttribute { uuid } => {
                write!(f, "Unknown attribute {}", format_uuid(*uuid))
            }
            GameError::ManagedAttribute { attribute } => {
                write!(
                    f,
                    "{} changes only through the game state machine",
                    attribute
                )
            }
            GameError::IllegalTransition { from, to } => {
                write!(f, "Illegal phase transition {} -> {}", from, to)
            }
            GameError::CharacterTaken { character } => {
                write!(f, "{} is already taken by the opponent", character)
            }
            GameError::WrongPhase { expected, actual } => {
                write!(
                    f,
                    "Operation requires phase {}, but the session is in {}",
                    expected, actual
                )
            }
            GameError::SerializationError { context } => {
                write!(f, "Serialization error: {}", context)
            }
            GameError::SocketError { context } => {
                write!(f, "Socket error: {}", context)
            }
        }
    }
}

impl Error for GameError {}

impl From<CodecError> for GameError {
    fn from(err: CodecError) -> Self {
        GameError::SerializationError {
            context: err.to_string(),
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
    use crate::network::codec::CodecOperation;

    #[test]
    fn not_owner_names_both_roles() {
        let err = GameError::NotOwner {
            attribute: Attribute::HostX,
            role: Role::Guest,
        };
        let msg = err.to_string();
        assert!(msg.contains("HostX"));
        assert!(msg.contains("host"));
        assert!(msg.contains("guest"));
    }

    #[test]
    fn unknown_attribute_prints_canonical_uuid() {
        let err = GameError::UnknownAttribute { uuid: 0x1234 };
        assert!(err
            .to_string()
            .contains("00000000-0000-0000-0000-000000001234"));
    }

    #[test]
    fn managed_attribute_display() {
        let err = GameError::ManagedAttribute {
            attribute: Attribute::GamePhase,
        };
        assert_eq!(
            err.to_string(),
            "GamePhase changes only through the game state machine"
        );
    }

    #[test]
    fn illegal_transition_display() {
        let err = GameError::IllegalTransition {
            from: GamePhase::Tutorial,
            to: GamePhase::Play,
        };
        assert_eq!(err.to_string(), "Illegal phase transition tutorial -> play");
    }

    #[test]
    fn codec_errors_become_serialization_errors() {
        let err: GameError = CodecError::bincode(CodecOperation::Decode, "bad tag").into();
        match err {
            GameError::SerializationError { context } => assert!(context.contains("bad tag")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn errors_are_comparable() {
        assert_eq!(GameError::NotConnected, GameError::NotConnected);
        assert_ne!(
            GameError::CharacterTaken {
                character: PlayerType::Princess
            },
            GameError::CharacterTaken {
                character: PlayerType::Dragon
            }
        );
    }
}
