//! The shared attributes of a session and who owns them.
//!
//! Every attribute is a signed 32-bit slot identified on the wire by a 128-bit UUID. Exactly
//! one [`Role`] writes each attribute; the other peer only observes it through notifications.
//!
//! | Attribute | Owner | Domain |
//! |-----------|-------|--------|
//! | `HostX`, `GuestX` | own role | `[0, width)` |
//! | `HostY`, `GuestY` | own role | `[0, height)` |
//! | `HostSelection`, `GuestSelection` | own role | `{1, 2, 3}` |
//! | `GamePhase` | host | `{1, 2, 3, 4}` |
//! | `PhaseRequest` | guest | `{1, 2, 3}` |
//! | `EndCause` | host | `{0, 1, 2}` |
//! | `HostPowerUp`, `GuestPowerUp` | own role | `{0, 1}` |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::game::{Arena, EndCause, GamePhase, PlayerType};
use crate::Role;

/// UUID of the session service. Peers only talk to links advertising this identifier.
pub const SERVICE_UUID: u128 = 0x7d7a7768_a9d0_4fb8_bf2b_fc994c662eb6;

/// Name the host advertises.
pub const DEVICE_NAME: &str = "Princess of Fire";

/// One shared slot of session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Attribute {
    /// Host horizontal position.
    HostX,
    /// Host vertical position.
    HostY,
    /// Guest horizontal position.
    GuestX,
    /// Guest vertical position.
    GuestY,
    /// The host player's character.
    HostSelection,
    /// The guest player's character.
    GuestSelection,
    /// The authoritative session phase.
    GamePhase,
    /// The phase the guest asks the host to move to.
    PhaseRequest,
    /// Why the last round ended.
    EndCause,
    /// Whether the host's reveal window is open.
    HostPowerUp,
    /// Whether the guest's reveal window is open.
    GuestPowerUp,
}

impl Attribute {
    /// Every attribute, in a fixed order.
    pub const ALL: [Self; 11] = [
        Self::HostX,
        Self::HostY,
        Self::GuestX,
        Self::GuestY,
        Self::HostSelection,
        Self::GuestSelection,
        Self::GamePhase,
        Self::PhaseRequest,
        Self::EndCause,
        Self::HostPowerUp,
        Self::GuestPowerUp,
    ];

    /// The attribute's wire identifier.
    #[must_use]
    pub const fn uuid(self) -> u128 {
        match self {
            Self::HostX => 0x563c64b2_9634_4f7a_9f4f_d9e3231faa56,
            Self::HostY => 0xaa88ac15_3e2b_4735_92ff_4c712173e9f3,
            Self::GuestX => 0x1da468d6_993d_4387_9e71_1c826b10fff9,
            Self::GuestY => 0xcf7b4787_d412_4e69_8b61_e2cfba89ff19,
            Self::HostSelection => 0xecaaac5c_5057_49dc_83ab_e0e2322f2703,
            Self::GuestSelection => 0xcad4571b_2ca1_47c9_ae9d_75bbce0d814f,
            Self::GamePhase => 0x07471f02_b963_449e_a39c_9a44ae312b78,
            Self::PhaseRequest => 0x07471f02_b963_449e_a39c_9a44ae312b79,
            Self::EndCause => 0x07471f02_b963_449e_a39c_9a44ae312b7a,
            Self::HostPowerUp => 0x7d7a7768_a9d0_4fb8_bf2b_fc994c662eb7,
            Self::GuestPowerUp => 0x7d7a7768_a9d0_4fb8_bf2b_fc994c662eb8,
        }
    }

    /// Looks up an attribute by its wire identifier.
    #[must_use]
    pub fn from_uuid(uuid: u128) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.uuid() == uuid)
    }

    /// The role that writes this attribute.
    #[must_use]
    pub const fn owner(self) -> Role {
        match self {
            Self::HostX
            | Self::HostY
            | Self::HostSelection
            | Self::GamePhase
            | Self::EndCause
            | Self::HostPowerUp => Role::Host,
            Self::GuestX
            | Self::GuestY
            | Self::GuestSelection
            | Self::PhaseRequest
            | Self::GuestPowerUp => Role::Guest,
        }
    }

    /// Attributes whose writes carry meaning even when the value repeats.
    ///
    /// A guest asking twice for the same phase still wants an answer.
    #[must_use]
    pub const fn is_eventful(self) -> bool {
        matches!(self, Self::PhaseRequest)
    }

    /// Attributes where only the newest pending value matters to the receiver.
    ///
    /// Phases, phase requests, end causes and selections drive transitions, so every value
    /// is delivered.
    #[must_use]
    pub const fn is_mergeable(self) -> bool {
        matches!(
            self,
            Self::HostX
                | Self::HostY
                | Self::GuestX
                | Self::GuestY
                | Self::HostPowerUp
                | Self::GuestPowerUp
        )
    }

    /// Returns `true` if `value` lies in the attribute's domain.
    #[must_use]
    pub fn accepts(self, value: i32, arena: Arena) -> bool {
        match self {
            Self::HostX | Self::GuestX => (0..arena.width).contains(&value),
            Self::HostY | Self::GuestY => (0..arena.height).contains(&value),
            Self::HostSelection | Self::GuestSelection => PlayerType::from_code(value).is_some(),
            Self::GamePhase => GamePhase::from_code(value).is_some(),
            Self::PhaseRequest => {
                matches!(
                    GamePhase::from_code(value),
                    Some(GamePhase::Select | GamePhase::Tutorial | GamePhase::Play)
                )
            }
            Self::EndCause => value == EndCause::NONE_CODE || EndCause::from_code(value).is_some(),
            Self::HostPowerUp | Self::GuestPowerUp => value == 0 || value == 1,
        }
    }

    /// The attribute's name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HostX => "HostX",
            Self::HostY => "HostY",
            Self::GuestX => "GuestX",
            Self::GuestY => "GuestY",
            Self::HostSelection => "HostSelection",
            Self::GuestSelection => "GuestSelection",
            Self::GamePhase => "GamePhase",
            Self::PhaseRequest => "PhaseRequest",
            Self::EndCause => "EndCause",
            Self::HostPowerUp => "HostPowerUp",
            Self::GuestPowerUp => "GuestPowerUp",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats a UUID in the canonical lowercase `8-4-4-4-12` form.
///
/// ```
/// use princess_of_fire::attributes::{format_uuid, SERVICE_UUID};
///
/// assert_eq!(format_uuid(SERVICE_UUID), "7d7a7768-a9d0-4fb8-bf2b-fc994c662eb6");
/// ```
#[must_use]
pub fn format_uuid(uuid: u128) -> String {
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        (uuid >> 96) as u32,
        (uuid >> 80) as u16,
        (uuid >> 64) as u16,
        (uuid >> 48) as u16,
        uuid & 0xffff_ffff_ffff
    )
}

/// Maps the role-relative names ("local x", "peer selection", ...) to concrete attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnershipTable {
    /// The role this table was built for.
    pub role: Role,
    /// This peer's horizontal position.
    pub local_x: Attribute,
    /// This peer's vertical position.
    pub local_y: Attribute,
    /// The opponent's horizontal position.
    pub peer_x: Attribute,
    /// The opponent's vertical position.
    pub peer_y: Attribute,
    /// This peer's character.
    pub local_selection: Attribute,
    /// The opponent's character.
    pub peer_selection: Attribute,
    /// This peer's power-up flag.
    pub local_power_up: Attribute,
    /// The opponent's power-up flag.
    pub peer_power_up: Attribute,
}

impl OwnershipTable {
    /// Builds the table for `role`.
    ///
    /// ```
    /// use princess_of_fire::attributes::{Attribute, OwnershipTable};
    /// use princess_of_fire::Role;
    ///
    /// let guest = OwnershipTable::for_role(Role::Guest);
    /// assert_eq!(guest.local_x, Attribute::GuestX);
    /// assert_eq!(guest.peer_x, Attribute::HostX);
    /// ```
    #[must_use]
    pub const fn for_role(role: Role) -> Self {
        match role {
            Role::Host => Self {
                role,
                local_x: Attribute::HostX,
                local_y: Attribute::HostY,
                peer_x: Attribute::GuestX,
                peer_y: Attribute::GuestY,
                local_selection: Attribute::HostSelection,
                peer_selection: Attribute::GuestSelection,
                local_power_up: Attribute::HostPowerUp,
                peer_power_up: Attribute::GuestPowerUp,
            },
            Role::Guest => Self {
                role,
                local_x: Attribute::GuestX,
                local_y: Attribute::GuestY,
                peer_x: Attribute::HostX,
                peer_y: Attribute::HostY,
                local_selection: Attribute::GuestSelection,
                peer_selection: Attribute::HostSelection,
                local_power_up: Attribute::GuestPowerUp,
                peer_power_up: Attribute::HostPowerUp,
            },
        }
    }

    /// Returns `true` if this peer writes `attribute`.
    #[must_use]
    pub fn is_local(&self, attribute: Attribute) -> bool {
        attribute.owner() == self.role
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
    use std::collections::BTreeSet;

    #[test]
    fn uuids_are_unique_and_resolvable() {
        let uuids: BTreeSet<u128> = Attribute::ALL.iter().map(|a| a.uuid()).collect();
        assert_eq!(uuids.len(), Attribute::ALL.len());
        assert!(!uuids.contains(&SERVICE_UUID));
        for attr in Attribute::ALL {
            assert_eq!(Attribute::from_uuid(attr.uuid()), Some(attr));
        }
        assert_eq!(Attribute::from_uuid(0), None);
    }

    #[test]
    fn uuid_formatting_matches_published_identifiers() {
        assert_eq!(
            format_uuid(Attribute::HostX.uuid()),
            "563c64b2-9634-4f7a-9f4f-d9e3231faa56"
        );
        assert_eq!(
            format_uuid(Attribute::GamePhase.uuid()),
            "07471f02-b963-449e-a39c-9a44ae312b78"
        );
        assert_eq!(
            format_uuid(Attribute::GuestPowerUp.uuid()),
            "7d7a7768-a9d0-4fb8-bf2b-fc994c662eb8"
        );
    }

    #[test]
    fn each_role_owns_half_the_positions() {
        let host = OwnershipTable::for_role(Role::Host);
        let guest = OwnershipTable::for_role(Role::Guest);
        for attr in Attribute::ALL {
            assert_ne!(host.is_local(attr), guest.is_local(attr), "{attr}");
        }
        assert!(host.is_local(Attribute::GamePhase));
        assert!(host.is_local(Attribute::EndCause));
        assert!(guest.is_local(Attribute::PhaseRequest));
        assert_eq!(host.peer_selection, guest.local_selection);
        assert_eq!(host.local_power_up, guest.peer_power_up);
    }

    #[test]
    fn position_domain_follows_arena() {
        let arena = Arena::SCREEN;
        assert!(Attribute::HostX.accepts(0, arena));
        assert!(Attribute::HostX.accepts(319, arena));
        assert!(!Attribute::HostX.accepts(320, arena));
        assert!(!Attribute::GuestY.accepts(240, arena));
        assert!(!Attribute::GuestY.accepts(-1, arena));
        assert!(Attribute::GuestX.accepts(400, Arena::new(640, 480)));
    }

    #[test]
    fn enumerated_domains() {
        let arena = Arena::SCREEN;
        assert!(Attribute::HostSelection.accepts(3, arena));
        assert!(!Attribute::HostSelection.accepts(0, arena));
        assert!(Attribute::GamePhase.accepts(4, arena));
        assert!(!Attribute::GamePhase.accepts(5, arena));
        assert!(!Attribute::PhaseRequest.accepts(4, arena));
        assert!(Attribute::PhaseRequest.accepts(2, arena));
        assert!(Attribute::EndCause.accepts(0, arena));
        assert!(!Attribute::EndCause.accepts(3, arena));
        assert!(!Attribute::HostPowerUp.accepts(2, arena));
    }

    #[test]
    fn only_positions_and_power_ups_merge() {
        let mergeable: Vec<_> = Attribute::ALL
            .into_iter()
            .filter(|a| a.is_mergeable())
            .collect();
        assert_eq!(
            mergeable,
            vec![
                Attribute::HostX,
                Attribute::HostY,
                Attribute::GuestX,
                Attribute::GuestY,
                Attribute::HostPowerUp,
                Attribute::GuestPowerUp,
            ]
        );
        assert!(Attribute::ALL
            .into_iter()
            .all(|a| !(a.is_mergeable() && a.is_eventful())));
    }

    #[test]
    fn only_phase_request_is_eventful() {
        let eventful: Vec<_> = Attribute::ALL
            .into_iter()
            .filter(|a| a.is_eventful())
            .collect();
        assert_eq!(eventful, vec![Attribute::PhaseRequest]);
    }
}
