//! Route legalization: removing cycles and multi-driver nodes from the
//! union of a net's routes.
//!
//! The union of all connection paths of one net must form a DAG with a
//! single driver per node. When negotiation leaves a net with a node
//! driven from two sides (or a cycle), the net is rebuilt as a
//! delay-weighted shortest-path tree over the very nodes its connections
//! already use, so no new routing resources are claimed.

use crate::adapters::DelayEstimator;
use fabric_device::{DeviceGraph, NodeId};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

struct FixVertex {
    node: NodeId,
    delay: f32,
    children: Vec<usize>,
    cost: f32,
    prev: Option<usize>,
    visited: bool,
}

#[derive(PartialEq)]
struct FixItem {
    cost: f32,
    seq: u64,
    vertex: usize,
}

impl Eq for FixItem {}

impl Ord for FixItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FixItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Rebuilds one net's routes as a single-driver DAG.
pub struct RouteLegalizer {
    vertices: Vec<FixVertex>,
    node_map: HashMap<NodeId, usize>,
    source: Option<usize>,
}

impl RouteLegalizer {
    /// Builds the union graph of a net's connection routes.
    ///
    /// Each route is ordered sink to source; edges run source to sink.
    /// `delay_of` supplies the node delays (0 for nodes the router never
    /// costed).
    pub fn new(routes: &[Vec<NodeId>], delay_of: &dyn Fn(NodeId) -> f32) -> Self {
        let mut legalizer = Self {
            vertices: Vec::new(),
            node_map: HashMap::new(),
            source: None,
        };
        for route in routes {
            for i in (1..route.len()).rev() {
                let cur = route[i];
                let next = route[i - 1];
                let cur_v = legalizer.vertex(cur, delay_of);
                let next_v = legalizer.vertex(next, delay_of);
                if i == route.len() - 1 {
                    legalizer.source = Some(cur_v);
                }
                if !legalizer.vertices[cur_v].children.contains(&next_v) {
                    legalizer.vertices[cur_v].children.push(next_v);
                }
            }
        }
        legalizer
    }

    fn vertex(&mut self, node: NodeId, delay_of: &dyn Fn(NodeId) -> f32) -> usize {
        if let Some(&v) = self.node_map.get(&node) {
            return v;
        }
        let v = self.vertices.len();
        self.vertices.push(FixVertex {
            node,
            delay: delay_of(node),
            children: Vec::new(),
            cost: f32::MAX,
            prev: None,
            visited: false,
        });
        self.node_map.insert(node, v);
        v
    }

    /// Regenerates each route by walking the shortest-path tree from its
    /// sink back to the source. Routes stay ordered sink to source.
    pub fn finalize_routes(
        &mut self,
        device: &dyn DeviceGraph,
        estimator: Option<&dyn DelayEstimator>,
        routes: &mut [Vec<NodeId>],
    ) {
        self.shortest_paths(device, estimator);
        for route in routes.iter_mut() {
            let Some(&sink_v) = route.first().and_then(|n| self.node_map.get(n)) else {
                continue;
            };
            route.clear();
            route.push(self.vertices[sink_v].node);
            let mut prev = self.vertices[sink_v].prev;
            while let Some(v) = prev {
                route.push(self.vertices[v].node);
                prev = self.vertices[v].prev;
            }
        }
    }

    fn shortest_paths(&mut self, device: &dyn DeviceGraph, estimator: Option<&dyn DelayEstimator>) {
        let Some(source) = self.source else {
            return;
        };
        let mut queue = BinaryHeap::new();
        let mut seq = 0u64;
        self.vertices[source].cost = self.vertices[source].delay;
        self.vertices[source].prev = None;
        self.vertices[source].visited = true;
        queue.push(FixItem {
            cost: self.vertices[source].cost,
            seq,
            vertex: source,
        });

        while let Some(item) = queue.pop() {
            let cur = item.vertex;
            let cur_long = device.intent_code(self.vertices[cur].node).is_long();
            let cur_cost = self.vertices[cur].cost;
            for next in self.vertices[cur].children.clone() {
                let extra = estimator
                    .map(|e| e.extra_delay(device, self.vertices[next].node, cur_long) as f32)
                    .unwrap_or(0.0);
                let new_cost = cur_cost + self.vertices[next].delay + extra;
                if !self.vertices[next].visited || new_cost < self.vertices[next].cost {
                    self.vertices[next].cost = new_cost;
                    self.vertices[next].prev = Some(cur);
                    self.vertices[next].visited = true;
                    seq += 1;
                    queue.push(FixItem {
                        cost: new_cost,
                        seq,
                        vertex: next,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_device::MeshDevice;
    use std::collections::HashMap as Map;

    /// A net whose two connections enter the same IMUX-feeding wire from
    /// two different directions, creating a multi-driver node.
    #[test]
    fn multi_driver_resolved_to_single_parent() {
        let mesh = MeshDevice::new(4, 4);
        let src = mesh.find_node("INT_X1Y1/LOGIC_OUTS_AQ").unwrap();
        let nn1 = mesh.find_node("INT_X1Y1/NN1").unwrap();
        let up_imux = mesh.find_node("INT_X1Y2/IMUX_A1").unwrap();
        let up_nn1 = mesh.find_node("INT_X1Y2/NN1").unwrap();

        // Connection A enters the sink IMUX straight off the single;
        // connection B takes one bounce-like extra hop and enters the
        // same IMUX from a second parent.
        let route_a = vec![up_imux, nn1, src];
        let route_b = vec![up_imux, up_nn1, nn1, src];
        let delays: Map<fabric_device::NodeId, f32> = Map::new();
        let delay_of = move |n: fabric_device::NodeId| delays.get(&n).copied().unwrap_or(1.0);
        let mut routes = vec![route_a, route_b];
        let mut legalizer = RouteLegalizer::new(&routes, &delay_of);
        legalizer.finalize_routes(&mesh, None, &mut routes);

        // Both routes end at the same sink and start at the source.
        for route in &routes {
            assert_eq!(route[0], up_imux);
            assert_eq!(*route.last().unwrap(), src);
        }
        // And the sink now has exactly one driver across all routes.
        let mut drivers = std::collections::HashSet::new();
        for route in &routes {
            if route.len() >= 2 {
                drivers.insert(route[1]);
            }
        }
        assert_eq!(drivers.len(), 1, "sink keeps a single parent");
    }

    #[test]
    fn shortest_variant_wins() {
        let mesh = MeshDevice::new(4, 4);
        let src = mesh.find_node("INT_X1Y1/LOGIC_OUTS_AQ").unwrap();
        let nn1 = mesh.find_node("INT_X1Y1/NN1").unwrap();
        let nn2 = mesh.find_node("INT_X1Y1/NN2").unwrap();
        let far_imux = mesh.find_node("INT_X1Y3/IMUX_A1").unwrap();
        let mid_nn1 = mesh.find_node("INT_X1Y2/NN1").unwrap();

        // Two variants reach the sink: a two-hop chain of singles and a
        // direct double. The double is cheaper with these delays.
        let route_slow = vec![far_imux, mid_nn1, nn1, src];
        let route_fast = vec![far_imux, nn2, src];
        let delay_of = |n: fabric_device::NodeId| {
            if n == nn2 {
                1.5
            } else {
                1.0
            }
        };
        let mut routes = vec![route_slow, route_fast];
        let mut legalizer = RouteLegalizer::new(&routes, &delay_of);
        legalizer.finalize_routes(&mesh, None, &mut routes);

        // Both connections now take the cheaper double-wire path.
        assert_eq!(routes[0], vec![far_imux, nn2, src]);
        assert_eq!(routes[1], vec![far_imux, nn2, src]);
    }

    #[test]
    fn empty_routes_untouched() {
        let delay_of = |_n: fabric_device::NodeId| 0.0;
        let routes: Vec<Vec<fabric_device::NodeId>> = vec![Vec::new()];
        let mut legalizer = RouteLegalizer::new(&routes, &delay_of);
        let mesh = MeshDevice::new(2, 2);
        let mut routes = routes;
        legalizer.finalize_routes(&mesh, None, &mut routes);
        assert!(routes[0].is_empty());
    }
}
