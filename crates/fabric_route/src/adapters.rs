//! Interfaces to the router's external collaborators.
//!
//! The delay model, static-timing graph, clock router, and static-net
//! router are separate subsystems; the core consumes them through the
//! traits here and works (in wirelength-driven mode) without any of them.

use fabric_design::{Design, PhysNetId, SitePinId};
use fabric_device::{DeviceGraph, NodeId};
use std::collections::{BTreeMap, HashSet};

/// A scalar per-node delay model.
pub trait DelayEstimator {
    /// Returns the delay in picoseconds of a node, sampled at its exit.
    fn delay_of(&self, device: &dyn DeviceGraph, exit_node: NodeId) -> i16;

    /// Returns `true` for long wires.
    fn is_long(&self, device: &dyn DeviceGraph, node: NodeId) -> bool {
        device.intent_code(node).is_long()
    }

    /// Extra delay of a long-to-long hop.
    fn extra_delay(&self, device: &dyn DeviceGraph, child: NodeId, parent_is_long: bool) -> i16 {
        if parent_is_long && device.intent_code(child).is_long() {
            45
        } else {
            0
        }
    }
}

/// The static-timing graph, keyed by connection sink pins.
///
/// The router feeds route delays in and reads per-connection criticality
/// back; how arrival/required times are computed is the timing graph's
/// business.
pub trait TimingModel {
    /// Records the routed delay of the connection ending at `sink`.
    fn set_route_delay(&mut self, sink: SitePinId, delay_ps: f32);

    /// Recomputes arrival and required times; returns the maximum delay in
    /// picoseconds and the name of the critical vertex.
    fn arrival_require_times(&mut self) -> (f32, String);

    /// Returns the criticality of the connection ending at `sink`, already
    /// clamped to `max_criticality` and shaped by `exponent`.
    fn criticality(
        &mut self,
        sink: SitePinId,
        max_criticality: f32,
        exponent: f32,
        max_delay_ps: f32,
    ) -> f32;

    /// Re-reads the delays of connections whose routes were rewritten by
    /// legalization.
    fn patch_up_delays(&mut self, sinks: &[SitePinId]) {
        let _ = sinks;
    }
}

/// The dedicated clock router.
pub trait ClockRouter {
    /// Routes one clock net and returns the nodes it used, which the
    /// signal router must preserve.
    fn route_clk(
        &mut self,
        design: &mut Design,
        device: &dyn DeviceGraph,
        net: PhysNetId,
        symmetric: bool,
    ) -> Vec<NodeId>;
}

/// The VCC/GND distribution router.
pub trait StaticNetRouter {
    /// Routes one static net around `unavailable` nodes and returns, per
    /// sink pin, the nodes of its route; all of them become preserved.
    fn route_static(
        &mut self,
        design: &mut Design,
        device: &dyn DeviceGraph,
        net: PhysNetId,
        unavailable: &HashSet<NodeId>,
    ) -> BTreeMap<SitePinId, Vec<NodeId>>;
}

/// The external collaborators handed to the router. Any of them may be
/// absent; missing timing collaborators downgrade a timing-driven run to
/// wirelength-driven.
#[derive(Default)]
pub struct RouterAdapters<'a> {
    /// The delay model.
    pub estimator: Option<&'a dyn DelayEstimator>,
    /// The static-timing graph.
    pub timing: Option<&'a mut dyn TimingModel>,
    /// The clock router.
    pub clock: Option<&'a mut dyn ClockRouter>,
    /// The static-net router.
    pub statics: Option<&'a mut dyn StaticNetRouter>,
}

impl<'a> RouterAdapters<'a> {
    /// No collaborators: pure wirelength-driven signal routing.
    pub fn none() -> Self {
        Self::default()
    }
}

/// A delay model charging a flat cost per wire type, usable wherever the
/// real table-driven estimator is unavailable.
#[derive(Debug, Default)]
pub struct UniformDelay;

impl DelayEstimator for UniformDelay {
    fn delay_of(&self, device: &dyn DeviceGraph, exit_node: NodeId) -> i16 {
        use fabric_device::IntentCode::*;
        match device.intent_code(exit_node) {
            Single => 90,
            Double => 120,
            VQuad | HQuad => 160,
            VLong | HLong => 300,
            Local => 60,
            Pinbounce => 60,
            Pinfeed => 45,
            Generic => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_device::MeshDevice;

    #[test]
    fn uniform_delay_by_intent() {
        let mesh = MeshDevice::new(8, 8);
        let est = UniformDelay;
        let single = mesh.find_node("INT_X1Y1/NN1").unwrap();
        let long = mesh.find_node("INT_X0Y0/NN6").unwrap();
        assert_eq!(est.delay_of(&mesh, single), 90);
        assert_eq!(est.delay_of(&mesh, long), 300);
        assert!(est.is_long(&mesh, long));
        assert!(!est.is_long(&mesh, single));
    }

    #[test]
    fn extra_delay_long_to_long() {
        let mesh = MeshDevice::new(8, 8);
        let est = UniformDelay;
        let long = mesh.find_node("INT_X0Y0/NN6").unwrap();
        let single = mesh.find_node("INT_X1Y1/NN1").unwrap();
        assert_eq!(est.extra_delay(&mesh, long, true), 45);
        assert_eq!(est.extra_delay(&mesh, long, false), 0);
        assert_eq!(est.extra_delay(&mesh, single, true), 0);
    }
}
