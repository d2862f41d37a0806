//! The read-only device-graph interface consumed by the router.

use crate::ids::NodeId;
use crate::site::SiteTypeDef;
use serde::{Deserialize, Serialize};

/// A programmable interconnect point between two routing-resource nodes.
///
/// Activating a PIP electrically connects `start` to `end`. Routed nets are
/// persisted as PIP sets; the router guarantees each PIP is used by at most
/// one net.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Pip {
    /// The driving node.
    pub start: NodeId,
    /// The driven node.
    pub end: NodeId,
}

impl Pip {
    /// Creates a PIP from driver to load.
    pub fn new(start: NodeId, end: NodeId) -> Self {
        Self { start, end }
    }
}

/// Read-only access to the device's routing-resource graph and site types.
///
/// The graph is implicit and cyclic: adjacency is produced on demand by
/// `uphill_nodes`/`downhill_nodes` and the router memoises what it touches.
/// Implementations must be deterministic: repeated calls with the same node
/// return the same neighbor ordering.
pub trait DeviceGraph {
    /// Returns the number of nodes in the device.
    fn node_count(&self) -> usize;

    /// Returns the nodes that can drive `n` through a PIP.
    fn uphill_nodes(&self, n: NodeId) -> Vec<NodeId>;

    /// Returns the nodes that `n` can drive through a PIP.
    fn downhill_nodes(&self, n: NodeId) -> Vec<NodeId>;

    /// Returns the PIP connecting `a` to `b` in either direction, if any.
    fn pip_between(&self, a: NodeId, b: NodeId) -> Option<Pip>;

    /// Returns the device's intent code for `n`.
    fn intent_code(&self, n: NodeId) -> crate::IntentCode;

    /// Returns the wire span of `n` in INT tiles.
    fn length_of(&self, n: NodeId) -> u16;

    /// Returns the INT-tile grid coordinates of `n`'s base tile.
    fn tile_xy(&self, n: NodeId) -> (i16, i16);

    /// Returns `true` if `n`'s base tile is an interconnect tile.
    fn is_int_tile(&self, n: NodeId) -> bool;

    /// Returns `true` if the `a -> b` hop is only realizable as a
    /// route-through (through a site), which the router must not use.
    fn is_route_thru(&self, a: NodeId, b: NodeId) -> bool;

    /// Returns the Super Logic Region index of `n`'s tile.
    fn slr_of(&self, n: NodeId) -> u8 {
        let _ = n;
        0
    }

    /// Returns `true` if `n` crosses a clock-region boundary row and is a
    /// candidate for delay masking.
    fn crosses_rclk(&self, n: NodeId) -> bool {
        let _ = n;
        false
    }

    /// Returns the display name of `n` (for diagnostics only).
    fn node_name(&self, n: NodeId) -> String;

    /// Returns the site-type definition with the given name.
    fn site_type(&self, name: &str) -> Option<&SiteTypeDef>;

    /// Returns `true` if the site pin drives a BEL pin with a programmable
    /// inverter, allowing a GND sink to be serviced from VCC.
    fn is_invertible_pin(&self, site_type: &str, site_pin: &str) -> bool {
        let _ = (site_type, site_pin);
        false
    }

    /// Returns the routing-resource node wired to a site pin of a placed
    /// site, if the pin exists.
    fn site_pin_node(&self, site: &str, pin: &str) -> Option<NodeId>;
}
