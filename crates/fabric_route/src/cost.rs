//! The congestion-negotiation cost model.
//!
//! Every node's cost combines a congestion-independent base cost, the
//! present-congestion cost renegotiated each iteration, the historical
//! cost that only ever grows, a sharing discount for fan-out reuse within
//! the same net, and a bias pulling routes toward the net's centre of
//! gravity.

use crate::graph::RoutingGraph;
use crate::netwrap::NetWrapper;
use crate::rnode::{Rnode, RnodeId};
use fabric_design::SitePinId;

/// Precomputed per-connection weights for one path search.
#[derive(Clone, Copy, Debug)]
pub struct SearchWeights {
    /// The connection's criticality.
    pub criticality: f32,
    /// `1 - criticality`.
    pub one_minus_crit: f32,
    /// `(1 - criticality) ^ share_exponent`.
    pub share_weight: f32,
    /// Wirelength weight of the expected-cost term.
    pub wl_weight: f32,
    /// `1 - wl_weight`.
    pub one_minus_wl: f32,
    /// Timing weight of the expected-cost term.
    pub timing_weight: f32,
    /// `1 - timing_weight`.
    pub one_minus_timing: f32,
    /// The present-congestion factor of this iteration.
    pub present_factor: f32,
    /// Gate expansion by the connection bounding box.
    pub use_bbox: bool,
    /// Whether delay terms participate at all.
    pub timing_driven: bool,
}

impl SearchWeights {
    /// Builds the weights for one connection.
    pub fn for_connection(
        criticality: f32,
        share_exponent: f32,
        wl_weight: f32,
        timing_weight: f32,
        present_factor: f32,
        use_bbox: bool,
        timing_driven: bool,
    ) -> Self {
        Self {
            criticality,
            one_minus_crit: 1.0 - criticality,
            share_weight: (1.0 - criticality).powf(share_exponent),
            wl_weight,
            one_minus_wl: 1.0 - wl_weight,
            timing_weight,
            one_minus_timing: 1.0 - timing_weight,
            present_factor,
            use_bbox,
            timing_driven,
        }
    }
}

/// The congestion and bias cost of taking `rnode` for a connection of
/// `source`.
///
/// A connection sees a discounted present cost on rnodes already carrying
/// other connections of its own net, making fan-out reuse cheap; the bias
/// term nudges the route toward the net's centre, scaled down for
/// high-fanout and physically large nets.
pub fn node_cost(
    rnode: &Rnode,
    count_source_uses: u32,
    sharing_factor: f32,
    present_factor: f32,
    net: &NetWrapper,
) -> f32 {
    let present = if count_source_uses != 0 {
        1.0 + rnode.overuse().max(0) as f32 * present_factor
    } else {
        rnode.present_cost
    };

    let mut bias = 0.0;
    if !rnode.is_target {
        let conn_count = net.connections.len() as f32;
        let dist =
            (rnode.x as f32 - net.x_center).abs() + (rnode.y as f32 - net.y_center).abs();
        if net.hpwl > 0.0 {
            bias = 0.5 * rnode.base_cost / conn_count * dist / net.hpwl;
        }
    }

    rnode.base_cost * rnode.historical_cost * present / sharing_factor + bias
}

/// Walks every rnode after an iteration: renegotiates present costs and
/// accumulates historical costs on overused rnodes. Returns the overused
/// rnode IDs.
pub fn update_costs(
    graph: &mut RoutingGraph,
    present_factor: f32,
    historical_factor: f32,
) -> Vec<RnodeId> {
    let mut overused = Vec::new();
    for id in graph.ids().collect::<Vec<_>>() {
        let rnode = graph.get_mut(id);
        let overuse = rnode.overuse();
        if overuse == 0 {
            rnode.present_cost = 1.0 + present_factor;
        } else if overuse > 0 {
            rnode.present_cost = 1.0 + (overuse as f32 + 1.0) * present_factor;
            rnode.historical_cost += overuse as f32 * historical_factor;
            overused.push(id);
        }
    }
    overused
}
