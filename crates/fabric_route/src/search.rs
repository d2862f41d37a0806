//! Priority-queue path search from a connection's source to its marked
//! sink over the routing graph.

use crate::adapters::DelayEstimator;
use crate::cost::{node_cost, SearchWeights};
use crate::graph::RoutingGraph;
use crate::netwrap::{Connection, NetWrapper};
use crate::rnode::{RnodeId, RnodeType};
use fabric_device::DeviceGraph;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Delays above this sentinel mark masked nodes (U-turn shapes near the
/// boundary and nodes crossing RCLK rows).
const MASKED_DELAY: i16 = 10_000;

/// One queue entry. Ties on cost break by insertion order so that runs
/// are deterministic.
#[derive(Debug, Clone, Copy)]
struct QueueItem {
    cost: f32,
    seq: u64,
    rnode: RnodeId,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueueItem {}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap on cost; earlier insertion wins ties.
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The reusable search state: the priority queue and the set of rnodes
/// whose per-search slots must be reset afterwards.
pub struct PathSearch {
    queue: BinaryHeap<QueueItem>,
    seq: u64,
    visited: Vec<RnodeId>,
    /// Nodes pushed into the queue over the search's lifetime.
    pub pushed: u64,
    /// Nodes popped from the queue over the search's lifetime.
    pub popped: u64,
    /// Nodes cost-evaluated over the search's lifetime.
    pub evaluated: u64,
}

impl PathSearch {
    /// Creates an idle search.
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            seq: 0,
            visited: Vec::new(),
            pushed: 0,
            popped: 0,
            evaluated: 0,
        }
    }

    /// Runs one source-to-sink search. The sink rnode must already carry
    /// `is_target`. Returns `true` when the target was popped; the
    /// back-pointer chain from the sink then encodes the path.
    ///
    /// Per-rnode search state stays dirty until
    /// [`reset_expansion`](Self::reset_expansion) runs; the caller resets
    /// after reading the route (or after a failure).
    pub fn run(
        &mut self,
        graph: &mut RoutingGraph,
        device: &dyn DeviceGraph,
        estimator: Option<&dyn DelayEstimator>,
        conn: &Connection,
        net: &NetWrapper,
        weights: &SearchWeights,
    ) -> bool {
        let source = conn.source_rnode.expect("indirect connection has a source rnode");
        let sink = conn.sink_rnode.expect("indirect connection has a sink rnode");
        let (sink_x, sink_y) = {
            let s = graph.get(sink);
            (s.x, s.y)
        };

        self.queue.clear();
        self.push(graph, source, None, 0.0, 0.0);

        while let Some(item) = self.queue.pop() {
            self.popped += 1;
            let rid = item.rnode;
            if graph.get(rid).is_target {
                return true;
            }
            self.expand(
                graph, device, estimator, conn, net, weights, rid, sink_x, sink_y,
            );
        }
        false
    }

    /// Expands one popped rnode: evaluates and possibly pushes each child.
    #[allow(clippy::too_many_arguments)]
    fn expand(
        &mut self,
        graph: &mut RoutingGraph,
        device: &dyn DeviceGraph,
        estimator: Option<&dyn DelayEstimator>,
        conn: &Connection,
        net: &NetWrapper,
        weights: &SearchWeights,
        rid: RnodeId,
        sink_x: i16,
        sink_y: i16,
    ) -> bool {
        let parent_node = graph.get(rid).node;
        let parent_long = device.intent_code(parent_node).is_long();
        let parent_upstream = graph.get(rid).upstream_cost;
        let mut reached_target = false;

        for child_id in graph.children(device, rid, Some(net.net)) {
            let child = graph.get(child_id);
            if child.is_target {
                self.evaluate_and_push(
                    graph,
                    device,
                    estimator,
                    conn,
                    net,
                    weights,
                    rid,
                    parent_long,
                    parent_upstream,
                    child_id,
                    sink_x,
                    sink_y,
                );
                reached_target = true;
                continue;
            }
            match child.rtype {
                RnodeType::Wire => {
                    if child.delay > MASKED_DELAY {
                        continue;
                    }
                    if !self.accessible(conn, weights, child.x, child.y) {
                        continue;
                    }
                }
                RnodeType::Pinbounce => {
                    if !self.accessible(conn, weights, child.x, child.y) {
                        continue;
                    }
                    if !(child.x == sink_x && (child.y - sink_y).abs() <= 1) {
                        continue;
                    }
                }
                RnodeType::PinfeedI => {
                    if !conn.cross_slr {
                        continue;
                    }
                }
                RnodeType::PinfeedO => continue,
            }
            self.evaluate_and_push(
                graph,
                device,
                estimator,
                conn,
                net,
                weights,
                rid,
                parent_long,
                parent_upstream,
                child_id,
                sink_x,
                sink_y,
            );
        }
        reached_target
    }

    fn accessible(&self, conn: &Connection, weights: &SearchWeights, x: i16, y: i16) -> bool {
        if !weights.use_bbox {
            return true;
        }
        match &conn.bbox {
            Some(bbox) => bbox.contains(x, y),
            None => true,
        }
    }

    /// Relaxes one child: computes its upstream and lower-bound total
    /// costs and pushes it unless a cheaper bound is already recorded.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_and_push(
        &mut self,
        graph: &mut RoutingGraph,
        device: &dyn DeviceGraph,
        estimator: Option<&dyn DelayEstimator>,
        conn: &Connection,
        net: &NetWrapper,
        weights: &SearchWeights,
        parent: RnodeId,
        parent_long: bool,
        parent_upstream: f32,
        child_id: RnodeId,
        sink_x: i16,
        sink_y: i16,
    ) {
        self.evaluated += 1;
        let child = graph.get(child_id);
        let count = child.count_source_uses(conn.source);
        let sharing_factor = 1.0 + weights.share_weight * count as f32;

        let congestion = node_cost(child, count, sharing_factor, weights.present_factor, net);

        let mut delay_term = 0.0;
        if weights.timing_driven {
            let extra = estimator
                .map(|e| e.extra_delay(device, child.node, parent_long))
                .unwrap_or(0);
            delay_term = weights.criticality
                * weights.one_minus_timing
                * (child.delay as f32 + extra as f32)
                / 100.0;
        }
        let upstream = parent_upstream
            + weights.one_minus_crit * congestion
            + weights.one_minus_crit * weights.one_minus_wl * child.length as f32 / sharing_factor
            + delay_term;

        let total = if child.is_target {
            upstream
        } else {
            let dx = (child.x - sink_x).abs() as f32;
            let dy = (child.y - sink_y).abs() as f32;
            upstream
                + weights.one_minus_crit * weights.wl_weight * (dx + dy) / sharing_factor
                + weights.criticality * weights.timing_weight * (dx * 0.32 + dy * 0.16)
        };

        if !child.visited || total < child.lower_bound_cost {
            self.push(graph, child_id, Some(parent), upstream, total);
        }
    }

    /// Records costs and back-pointer on an rnode and enqueues it.
    fn push(
        &mut self,
        graph: &mut RoutingGraph,
        rnode: RnodeId,
        prev: Option<RnodeId>,
        upstream: f32,
        total: f32,
    ) {
        let r = graph.get_mut(rnode);
        r.lower_bound_cost = total;
        r.upstream_cost = upstream;
        r.prev = prev;
        if !r.visited {
            r.visited = true;
            self.visited.push(rnode);
        }
        self.seq += 1;
        self.queue.push(QueueItem {
            cost: total,
            seq: self.seq,
            rnode,
        });
        self.pushed += 1;
    }

    /// Clears the per-search state of every rnode touched by the last
    /// search.
    pub fn reset_expansion(&mut self, graph: &mut RoutingGraph) {
        for rnode in self.visited.drain(..) {
            graph.get_mut(rnode).reset_search_state();
        }
        self.queue.clear();
    }
}

impl Default for PathSearch {
    fn default() -> Self {
        Self::new()
    }
}
