//! Opaque ID newtypes for design entities.
//!
//! Thin `u32` wrappers used as arena indices into the logical netlist and
//! the physical design. They are `Copy`, `Hash`, and
//! `Serialize`/`Deserialize`.

use crate::arena::ArenaId;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a logical cell instance.
    CellId
);

define_id!(
    /// Opaque, copyable ID for a port on a logical cell.
    ///
    /// Ports are scoped to their cell; a hierarchical pin is the pair
    /// `(CellId, PortId)`.
    PortId
);

define_id!(
    /// Opaque, copyable ID for a logical net.
    ///
    /// Nets are scoped to the cell that owns them; a hierarchical net is
    /// the pair `(CellId, NetId)`.
    NetId
);

define_id!(
    /// Opaque, copyable ID for a physical net.
    PhysNetId
);

define_id!(
    /// Opaque, copyable ID for a site instance.
    SiteInstId
);

define_id!(
    /// Opaque, copyable ID for a site pin instance.
    SitePinId
);

define_id!(
    /// Opaque, copyable ID for a physical (placed) cell.
    PhysCellId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn roundtrip() {
        assert_eq!(CellId::from_raw(42).as_raw(), 42);
        assert_eq!(PhysNetId::from_raw(7).as_raw(), 7);
    }

    #[test]
    fn equality_and_hash() {
        let a = SitePinId::from_raw(3);
        let b = SitePinId::from_raw(3);
        let c = SitePinId::from_raw(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn serde_roundtrip() {
        let id = NetId::from_raw(55);
        let json = serde_json::to_string(&id).unwrap();
        let restored: NetId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }
}
