//! Device-supplied intent codes classifying routing-resource nodes.

use serde::{Deserialize, Serialize};

/// The device's type tag for a routing-resource node.
///
/// Intent codes drive base-cost selection, wirelength accounting, and the
/// long-wire extra-delay rule in the router.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum IntentCode {
    /// A single-tile-span wire.
    Single,
    /// A two-tile-span wire.
    Double,
    /// A four-tile-span vertical wire.
    VQuad,
    /// A four-tile-span horizontal wire.
    HQuad,
    /// A long vertical wire.
    VLong,
    /// A long horizontal wire.
    HLong,
    /// An intra-tile local wire.
    Local,
    /// A bounce node that can re-enter the same interconnect tile.
    Pinbounce,
    /// A node feeding a site pin (input mux or output stub).
    Pinfeed,
    /// Anything the device does not classify further.
    Generic,
}

impl IntentCode {
    /// Returns `true` for long vertical or horizontal wires.
    ///
    /// Long-to-long hops carry an extra delay penalty in the cost model.
    pub fn is_long(self) -> bool {
        matches!(self, IntentCode::VLong | IntentCode::HLong)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_codes() {
        assert!(IntentCode::VLong.is_long());
        assert!(IntentCode::HLong.is_long());
        assert!(!IntentCode::Single.is_long());
        assert!(!IntentCode::Pinbounce.is_long());
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&IntentCode::Pinfeed).unwrap();
        let back: IntentCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, IntentCode::Pinfeed);
    }
}
