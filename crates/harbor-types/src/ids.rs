//! Node addresses.
//!
//! Every participant on the radio (the crane and each ship) is identified
//! by a 16-bit address. The crane also answers system queries, so the
//! crane address doubles as the system address.

use serde::{Deserialize, Serialize};

/// A 16-bit radio node address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u16);

/// The address of the crane and of the system query service.
pub const CRANE_ADDRESS: Address = Address(13);

impl Address {
    /// Return the raw 16-bit value.
    pub const fn into_inner(self) -> u16 {
        self.0
    }

    /// Whether this is the crane/system address.
    pub const fn is_crane(self) -> bool {
        self.0 == CRANE_ADDRESS.0
    }
}

/// Where a frame is delivered on the air.
///
/// Kept next to the payload by the transport, never inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Every node listening on the channel.
    Broadcast,
    /// A single node.
    Unicast(Address),
}

impl Destination {
    /// Whether a node with address `me` should accept this frame.
    pub fn accepts(self, me: Address) -> bool {
        match self {
            Self::Broadcast => true,
            Self::Unicast(addr) => addr == me,
        }
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Address {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Address> for u16 {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crane_address_is_thirteen() {
        assert_eq!(CRANE_ADDRESS.into_inner(), 13);
        assert!(CRANE_ADDRESS.is_crane());
        assert!(!Address(14).is_crane());
    }

    #[test]
    fn unicast_only_reaches_its_target() {
        assert!(Destination::Broadcast.accepts(Address(3)));
        assert!(Destination::Unicast(Address(3)).accepts(Address(3)));
        assert!(!Destination::Unicast(Address(3)).accepts(Address(4)));
    }

    #[test]
    fn address_serializes_as_plain_number() {
        let json = serde_json::to_string(&Address(42)).unwrap_or_default();
        assert_eq!(json, "42");
    }
}
