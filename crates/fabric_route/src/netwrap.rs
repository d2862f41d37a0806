//! Per-net and per-connection routing state.

use crate::graph::RoutingGraph;
use crate::rnode::{ConnectionId, NetWrapId, RnodeId};
use fabric_design::{PhysNetId, SitePinId};
use fabric_device::NodeId;
use serde::{Deserialize, Serialize};

/// An axis-aligned INT-tile rectangle gating a connection's search.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BBox {
    /// Leftmost column, inclusive.
    pub x_min: i16,
    /// Rightmost column, inclusive.
    pub x_max: i16,
    /// Bottom row, inclusive.
    pub y_min: i16,
    /// Top row, inclusive.
    pub y_max: i16,
}

impl BBox {
    /// The box spanning two points plus a margin on every side.
    pub fn around(a: (i16, i16), b: (i16, i16), margin: i16) -> Self {
        Self {
            x_min: a.0.min(b.0) - margin,
            x_max: a.0.max(b.0) + margin,
            y_min: a.1.min(b.1) - margin,
            y_max: a.1.max(b.1) + margin,
        }
    }

    /// Whether a tile lies inside the box.
    pub fn contains(&self, x: i16, y: i16) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// Grows the box by the given horizontal and vertical margins.
    pub fn enlarge(&mut self, h: i16, v: i16) {
        self.x_min -= h;
        self.x_max += h;
        self.y_min -= v;
        self.y_max += v;
    }
}

/// One source-to-sink routing target.
#[derive(Clone, Debug)]
pub struct Connection {
    /// This connection's ID.
    pub id: ConnectionId,
    /// The owning net wrapper.
    pub net: NetWrapId,
    /// The source site pin (the net identity for sharing).
    pub source: SitePinId,
    /// The sink site pin.
    pub sink: SitePinId,
    /// The source's projected rnode (`PinfeedO`).
    pub source_rnode: Option<RnodeId>,
    /// The sink's projected rnode (`PinfeedI`).
    pub sink_rnode: Option<RnodeId>,
    /// The current route, ordered sink to source.
    pub rnodes: Vec<RnodeId>,
    /// The finalized node list, ordered sink to source.
    pub nodes: Vec<NodeId>,
    /// Routed over dedicated resources, outside the iterative loop.
    pub direct: bool,
    /// Timing criticality in `[0, MAX_CRITICALITY]`.
    pub criticality: f32,
    /// Half-perimeter wirelength between the projected endpoints.
    pub hpwl: u16,
    /// The search-gating box, when bounding boxes are enabled.
    pub bbox: Option<BBox>,
    /// Whether source and sink live in different SLRs.
    pub cross_slr: bool,
}

impl Connection {
    /// Creates an unrouted connection.
    pub fn new(id: ConnectionId, net: NetWrapId, source: SitePinId, sink: SitePinId) -> Self {
        Self {
            id,
            net,
            source,
            sink,
            source_rnode: None,
            sink_rnode: None,
            rnodes: Vec::new(),
            nodes: Vec::new(),
            direct: false,
            criticality: 0.0,
            hpwl: 0,
            bbox: None,
            cross_slr: false,
        }
    }

    /// Clears the current route.
    pub fn reset_route(&mut self) {
        self.rnodes.clear();
    }

    /// Whether any rnode on the current route is overused.
    pub fn congested(&self, graph: &RoutingGraph) -> bool {
        self.rnodes.iter().any(|&r| graph.get(r).is_overused())
    }

    /// Whether any rnode on the current route has multiple drivers within
    /// routed connections.
    pub fn uses_multi_driver_rnodes(&self, graph: &RoutingGraph) -> bool {
        self.rnodes
            .iter()
            .any(|&r| graph.get(r).has_multiple_drivers())
    }

    /// Grows the bounding box after congestion.
    pub fn enlarge_bbox(&mut self, h: i16, v: i16) {
        if let Some(bbox) = &mut self.bbox {
            bbox.enlarge(h, v);
        }
    }
}

/// A net under routing: its connections and geometric summary.
#[derive(Clone, Debug)]
pub struct NetWrapper {
    /// This wrapper's ID.
    pub id: NetWrapId,
    /// The physical net being routed.
    pub net: PhysNetId,
    /// All connections of the net.
    pub connections: Vec<ConnectionId>,
    /// Geometric x centre over the projected endpoints.
    pub x_center: f32,
    /// Geometric y centre over the projected endpoints.
    pub y_center: f32,
    /// Double half-perimeter wirelength of the net's endpoints.
    pub hpwl: f32,
    /// Set after an output-pin swap.
    pub source_changed: bool,
    /// The source pin before the swap.
    pub old_source: Option<SitePinId>,
}

impl NetWrapper {
    /// Creates a wrapper with no connections yet.
    pub fn new(id: NetWrapId, net: PhysNetId) -> Self {
        Self {
            id,
            net,
            connections: Vec::new(),
            x_center: 0.0,
            y_center: 0.0,
            hpwl: 0.0,
            source_changed: false,
            old_source: None,
        }
    }

    /// Recomputes the centre coordinates and HPWL from the projected
    /// endpoints of the indirect connections: the shared source once,
    /// plus every sink.
    pub fn compute_center_and_hpwl(&mut self, graph: &RoutingGraph, connections: &[Connection]) {
        let mut xs: Vec<i16> = Vec::new();
        let mut ys: Vec<i16> = Vec::new();
        let mut source_added = false;
        for &cid in &self.connections {
            let conn = &connections[cid.as_raw() as usize];
            if conn.direct {
                continue;
            }
            if !source_added {
                if let Some(src) = conn.source_rnode {
                    let r = graph.get(src);
                    xs.push(r.x);
                    ys.push(r.y);
                    source_added = true;
                }
            }
            if let Some(snk) = conn.sink_rnode {
                let r = graph.get(snk);
                xs.push(r.x);
                ys.push(r.y);
            }
        }
        if xs.is_empty() {
            return;
        }
        let x_min = *xs.iter().min().unwrap();
        let x_max = *xs.iter().max().unwrap();
        let y_min = *ys.iter().min().unwrap();
        let y_max = *ys.iter().max().unwrap();
        self.hpwl = ((x_max - x_min + 1) + (y_max - y_min + 1)) as f32 * 2.0;
        self.x_center = xs.iter().map(|&x| x as f32).sum::<f32>() / xs.len() as f32;
        self.y_center = ys.iter().map(|&y| y as f32).sum::<f32>() / ys.len() as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_contains_and_enlarge() {
        let mut bbox = BBox::around((2, 3), (5, 1), 1);
        assert!(bbox.contains(2, 3));
        assert!(bbox.contains(1, 0));
        assert!(!bbox.contains(7, 2));
        bbox.enlarge(2, 0);
        assert!(bbox.contains(7, 2));
        assert!(!bbox.contains(7, 5));
    }

    #[test]
    fn connection_reset_route() {
        let mut conn = Connection::new(
            ConnectionId::from_raw(0),
            NetWrapId::from_raw(0),
            SitePinId::from_raw(0),
            SitePinId::from_raw(1),
        );
        conn.rnodes.push(RnodeId::from_raw(0));
        conn.reset_route();
        assert!(conn.rnodes.is_empty());
    }

    #[test]
    fn enlarge_without_bbox_is_noop() {
        let mut conn = Connection::new(
            ConnectionId::from_raw(0),
            NetWrapId::from_raw(0),
            SitePinId::from_raw(0),
            SitePinId::from_raw(1),
        );
        conn.enlarge_bbox(4, 4);
        assert!(conn.bbox.is_none());
        conn.bbox = Some(BBox::around((0, 0), (1, 1), 0));
        conn.enlarge_bbox(4, 4);
        assert!(conn.bbox.unwrap().contains(-4, -4));
    }
}
