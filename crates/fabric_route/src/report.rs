//! Routing reports: per-iteration statistics and the final summary.

use fabric_device::IntentCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What one routing iteration did.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IterationReport {
    /// The iteration number, starting at 1.
    pub iteration: u16,
    /// Connections routed in this iteration.
    pub connections_routed: usize,
    /// Total rnodes created so far.
    pub rnodes_created: usize,
    /// Overused rnodes after this iteration.
    pub overused: usize,
    /// Worst-case delay in picoseconds (0 when not timing-driven).
    pub max_delay_ps: i16,
}

/// How the routing loop ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RouteOutcome {
    /// Every connection routed, no overused rnodes.
    Converged,
    /// The loop ran out of iterations with sinks still unrouted.
    UnroutableRemaining(usize),
    /// The loop ran out of iterations with rnodes still overused.
    ConflictsRemaining(usize),
}

/// The net classification produced while determining routing targets.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct RouteTargets {
    /// Signal nets handed to the iterative router.
    pub wire_nets: usize,
    /// Source-to-sink connections across those nets.
    pub connections: usize,
    /// Connections routed over dedicated resources.
    pub direct_connections: usize,
    /// Clock nets routed by the clock router.
    pub clock_nets: usize,
    /// Static (VCC/GND) nets routed by the static-net router.
    pub static_nets: usize,
    /// Nets preserved untouched (already routed or pinless).
    pub preserved_nets: usize,
    /// Nets needing no routing at all (driverless or loadless).
    pub not_needing_routing: usize,
}

/// Per-intent-code usage of interconnect nodes.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct NodeTypeUsage {
    /// Number of used nodes with this intent code.
    pub nodes: u64,
    /// Total wire span of those nodes in INT tiles.
    pub length: u64,
}

/// The final routing summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteReport {
    /// How the loop ended.
    pub outcome: RouteOutcome,
    /// One entry per iteration, in order.
    pub iterations: Vec<IterationReport>,
    /// Net classification counts.
    pub targets: RouteTargets,
    /// Total routed wirelength over INT nodes.
    pub total_wirelength: u64,
    /// Total INT nodes used.
    pub total_int_nodes: u64,
    /// Usage broken down by intent code.
    pub node_usage: BTreeMap<IntentCode, NodeTypeUsage>,
    /// Rnodes created over the whole run.
    pub rnodes_created: usize,
    /// Average child count over expanded rnodes.
    pub average_children: f32,
    /// Nodes pushed into the search queue.
    pub nodes_pushed: u64,
    /// Nodes popped from the search queue.
    pub nodes_popped: u64,
    /// Nodes cost-evaluated.
    pub nodes_evaluated: u64,
    /// Connection routing attempts over the whole run.
    pub connections_routed: u64,
    /// PIPs claimed by more than one net after assignment (0 on a legal
    /// result).
    pub pip_conflicts: usize,
}

impl RouteReport {
    /// Returns `true` when the run converged with no PIP conflicts.
    pub fn is_clean(&self) -> bool {
        self.outcome == RouteOutcome::Converged && self.pip_conflicts == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_report() {
        let report = RouteReport {
            outcome: RouteOutcome::Converged,
            iterations: vec![IterationReport {
                iteration: 1,
                connections_routed: 10,
                rnodes_created: 100,
                overused: 0,
                max_delay_ps: 0,
            }],
            targets: RouteTargets::default(),
            total_wirelength: 42,
            total_int_nodes: 17,
            node_usage: BTreeMap::new(),
            rnodes_created: 100,
            average_children: 3.5,
            nodes_pushed: 1,
            nodes_popped: 1,
            nodes_evaluated: 1,
            connections_routed: 10,
            pip_conflicts: 0,
        };
        assert!(report.is_clean());

        let dirty = RouteReport {
            pip_conflicts: 2,
            ..report.clone()
        };
        assert!(!dirty.is_clean());

        let unconverged = RouteReport {
            outcome: RouteOutcome::UnroutableRemaining(3),
            ..report
        };
        assert!(!unconverged.is_clean());
    }

    #[test]
    fn serde_roundtrip() {
        let report = IterationReport {
            iteration: 2,
            connections_routed: 5,
            rnodes_created: 50,
            overused: 1,
            max_delay_ps: 1234,
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: IterationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.iteration, 2);
        assert_eq!(back.max_delay_ps, 1234);
    }
}
