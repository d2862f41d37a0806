//! Router-owned routing-resource nodes.
//!
//! An [`Rnode`] is the router's mutable view of one device node: its
//! projected type, coordinates and delay, the congestion state negotiated
//! across iterations, and the transient search state. Rnodes are interned:
//! for every device node there is at most one rnode, created lazily on
//! first contact and never destroyed.

use fabric_design::SitePinId;
use fabric_device::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID of an rnode in the router's pool.
    RnodeId
);

define_id!(
    /// Opaque, copyable ID of a connection.
    ConnectionId
);

define_id!(
    /// Opaque, copyable ID of a net wrapper.
    NetWrapId
);

/// Every node a route can pass through is one of these.
///
/// A tagged variant rather than a trait hierarchy: the router switches on
/// the tag in exactly one place, the expansion loop.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum RnodeType {
    /// An interconnect wire.
    Wire,
    /// A sink: the input-mux node a sink site pin projects onto.
    PinfeedI,
    /// A source: the output-stub node a source site pin projects onto.
    PinfeedO,
    /// A bounce node usable only right next to the sink.
    Pinbounce,
}

/// The router's per-node state. The node capacity is 1: any second
/// distinct user is overuse.
#[derive(Clone, Debug)]
pub struct Rnode {
    /// The underlying device node.
    pub node: NodeId,
    /// The projected node type.
    pub rtype: RnodeType,
    /// INT-tile x coordinate of the node's base tile.
    pub x: i16,
    /// INT-tile y coordinate of the node's base tile.
    pub y: i16,
    /// Wire span in INT tiles.
    pub length: u16,
    /// Node delay in picoseconds; values above 10 000 mask the node.
    pub delay: i16,
    /// Congestion-independent cost of using this node.
    pub base_cost: f32,

    /// Distinct sources using this rnode, with per-source use counts.
    /// The source site pin is the net identity for sharing.
    pub users: HashMap<SitePinId, u32>,
    /// Driver rnodes within routed connections, with use counts; more
    /// than one distinct driver is a multi-driver violation.
    pub parents: HashMap<RnodeId, u32>,
    /// Present-congestion cost, >= 1.
    pub present_cost: f32,
    /// Historical-congestion cost, >= 1 and non-decreasing.
    pub historical_cost: f32,

    /// Marks the sink of the connection currently being routed.
    pub is_target: bool,
    /// Lazily expanded children (downhill rnodes).
    pub children: Option<Vec<RnodeId>>,

    /// Back-pointer populated during path search.
    pub prev: Option<RnodeId>,
    /// Whether the current search has touched this rnode.
    pub visited: bool,
    /// Cost from the source up to this rnode.
    pub upstream_cost: f32,
    /// Lower bound on the total path cost through this rnode.
    pub lower_bound_cost: f32,
}

impl Rnode {
    /// Creates a fresh rnode with neutral congestion state.
    pub fn new(node: NodeId, rtype: RnodeType, x: i16, y: i16, length: u16) -> Self {
        Self {
            node,
            rtype,
            x,
            y,
            length,
            delay: 0,
            base_cost: base_cost_of(rtype, length),
            users: HashMap::new(),
            parents: HashMap::new(),
            present_cost: 1.0,
            historical_cost: 1.0,
            is_target: false,
            children: None,
            prev: None,
            visited: false,
            upstream_cost: 0.0,
            lower_bound_cost: 0.0,
        }
    }

    /// Number of distinct sources using this rnode.
    pub fn occupancy(&self) -> u32 {
        self.users.len() as u32
    }

    /// Units of demand beyond the capacity of 1.
    pub fn overuse(&self) -> i32 {
        self.occupancy() as i32 - 1
    }

    /// Returns `true` if more nets use this rnode than it can carry.
    pub fn is_overused(&self) -> bool {
        self.overuse() > 0
    }

    /// How many connections of the given source currently use this rnode.
    pub fn count_source_uses(&self, source: SitePinId) -> u32 {
        self.users.get(&source).copied().unwrap_or(0)
    }

    /// Registers one use by a connection of `source`.
    pub fn add_user(&mut self, source: SitePinId) {
        *self.users.entry(source).or_insert(0) += 1;
    }

    /// Releases one use by a connection of `source`.
    pub fn remove_user(&mut self, source: SitePinId) {
        if let Some(count) = self.users.get_mut(&source) {
            *count -= 1;
            if *count == 0 {
                self.users.remove(&source);
            }
        }
    }

    /// Registers a driver of this rnode within a routed connection.
    pub fn add_parent(&mut self, parent: RnodeId) {
        *self.parents.entry(parent).or_insert(0) += 1;
    }

    /// Releases a driver registration.
    pub fn remove_parent(&mut self, parent: RnodeId) {
        if let Some(count) = self.parents.get_mut(&parent) {
            *count -= 1;
            if *count == 0 {
                self.parents.remove(&parent);
            }
        }
    }

    /// Returns `true` if routed connections drive this rnode from more
    /// than one distinct parent.
    pub fn has_multiple_drivers(&self) -> bool {
        self.parents.len() > 1
    }

    /// Recomputes the present-congestion cost from the current occupancy.
    pub fn update_present_cost(&mut self, present_factor: f32) {
        let overuse = self.overuse();
        if overuse < 0 {
            self.present_cost = 1.0;
        } else if overuse == 0 {
            self.present_cost = 1.0 + present_factor;
        } else {
            self.present_cost = 1.0 + (overuse as f32 + 1.0) * present_factor;
        }
    }

    /// Clears the per-search state.
    pub fn reset_search_state(&mut self) {
        self.prev = None;
        self.visited = false;
        self.upstream_cost = 0.0;
        self.lower_bound_cost = 0.0;
    }
}

/// The congestion-independent cost of a node by type and span.
///
/// Sources are expensive to leave, pin feeds cheap, and wires scale
/// sublinearly with span so that long wires win on long connections.
fn base_cost_of(rtype: RnodeType, length: u16) -> f32 {
    match rtype {
        RnodeType::PinfeedO => 1.0,
        RnodeType::PinfeedI | RnodeType::Pinbounce => 0.4,
        RnodeType::Wire => {
            if length <= 1 {
                0.4
            } else {
                0.4 + 0.2 * (length as f32 - 1.0)
            }
        }
    }
}
