//! The routing graph: an interned rnode pool over the device, with
//! preservation and lazily expanded children.

use crate::rnode::{Rnode, RnodeId, RnodeType};
use fabric_design::PhysNetId;
use fabric_device::{DeviceGraph, IntentCode, NodeId};
use std::collections::HashMap;

/// The router's projection of the device into routable nodes.
///
/// Rnodes are created on demand, from connection endpoints and from child
/// expansion, and interned so each device node has at most one rnode.
/// Children are computed once per rnode and memoised; preserved nodes are
/// invisible as children unless the net being routed owns them.
pub struct RoutingGraph {
    rnodes: Vec<Rnode>,
    node_to_rnode: HashMap<NodeId, RnodeId>,
    preserved: HashMap<NodeId, PhysNetId>,
}

impl RoutingGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            rnodes: Vec::new(),
            node_to_rnode: HashMap::new(),
            preserved: HashMap::new(),
        }
    }

    /// Number of rnodes created so far.
    pub fn len(&self) -> usize {
        self.rnodes.len()
    }

    /// Returns `true` if no rnode has been created.
    pub fn is_empty(&self) -> bool {
        self.rnodes.is_empty()
    }

    /// Returns the rnode with the given ID.
    pub fn get(&self, id: RnodeId) -> &Rnode {
        &self.rnodes[id.as_raw() as usize]
    }

    /// Returns a mutable reference to the rnode with the given ID.
    pub fn get_mut(&mut self, id: RnodeId) -> &mut Rnode {
        &mut self.rnodes[id.as_raw() as usize]
    }

    /// Returns the rnode interned for a device node, if any.
    pub fn find(&self, node: NodeId) -> Option<RnodeId> {
        self.node_to_rnode.get(&node).copied()
    }

    /// Iterates over all rnode IDs in creation order.
    pub fn ids(&self) -> impl Iterator<Item = RnodeId> {
        (0..self.rnodes.len() as u32).map(RnodeId::from_raw)
    }

    /// Interns a device node, returning its rnode and whether it was just
    /// created. The type only applies on creation; an existing rnode keeps
    /// its original type.
    pub fn intern(
        &mut self,
        device: &dyn DeviceGraph,
        node: NodeId,
        rtype: RnodeType,
    ) -> (RnodeId, bool) {
        if let Some(&id) = self.node_to_rnode.get(&node) {
            return (id, false);
        }
        let (x, y) = device.tile_xy(node);
        let length = device.length_of(node);
        let id = RnodeId::from_raw(self.rnodes.len() as u32);
        self.rnodes.push(Rnode::new(node, rtype, x, y, length));
        self.node_to_rnode.insert(node, id);
        (id, true)
    }

    // --- Preservation ---

    /// Records `net` as the owner of `node`.
    ///
    /// Returns the previous owner when it differs, so the caller can warn
    /// about the conflict; the first owner wins.
    pub fn preserve(&mut self, node: NodeId, net: PhysNetId) -> Option<PhysNetId> {
        match self.preserved.get(&node) {
            None => {
                self.preserved.insert(node, net);
                None
            }
            Some(&owner) if owner == net => None,
            Some(&owner) => Some(owner),
        }
    }

    /// Releases a preserved node.
    pub fn unpreserve(&mut self, node: NodeId) {
        self.preserved.remove(&node);
    }

    /// Returns the net owning a preserved node.
    pub fn preserved_net(&self, node: NodeId) -> Option<PhysNetId> {
        self.preserved.get(&node).copied()
    }

    /// Number of preserved nodes.
    pub fn preserved_count(&self) -> usize {
        self.preserved.len()
    }

    /// All currently preserved device nodes.
    pub fn preserved_nodes(&self) -> Vec<NodeId> {
        self.preserved.keys().copied().collect()
    }

    /// All device nodes that have an rnode.
    pub fn interned_nodes(&self) -> Vec<NodeId> {
        self.node_to_rnode.keys().copied().collect()
    }

    // --- Children ---

    /// Returns the children of an rnode, expanding them on first use.
    ///
    /// A downhill node becomes a child unless it is preserved for another
    /// net, the hop is a forbidden route-through, or it leaves the
    /// interconnect fabric (sink site pins are entered through their
    /// projected `PinfeedI` rnodes instead).
    pub fn children(
        &mut self,
        device: &dyn DeviceGraph,
        id: RnodeId,
        current_net: Option<PhysNetId>,
    ) -> Vec<RnodeId> {
        if let Some(children) = &self.get(id).children {
            return children.clone();
        }
        let node = self.get(id).node;
        let mut children = Vec::new();
        for child in device.downhill_nodes(node) {
            if let Some(owner) = self.preserved_net(child) {
                if current_net != Some(owner) {
                    continue;
                }
            }
            if device.is_route_thru(node, child) {
                continue;
            }
            if !device.is_int_tile(child) {
                continue;
            }
            let rtype = rnode_type_of(device.intent_code(child));
            let (child_id, _) = self.intern(device, child, rtype);
            children.push(child_id);
        }
        self.get_mut(id).children = Some(children.clone());
        children
    }

    /// Returns `true` once an rnode's children have been expanded.
    pub fn children_expanded(&self, id: RnodeId) -> bool {
        self.get(id).children.is_some()
    }

    /// Appends a child to an already-expanded parent, used when a
    /// soft-preserve rip-up makes previously hidden nodes visible.
    pub fn add_child_if_expanded(&mut self, parent: RnodeId, child: RnodeId) {
        if let Some(children) = &mut self.rnodes[parent.as_raw() as usize].children {
            if !children.contains(&child) {
                children.push(child);
            }
        }
    }

    /// Average child count over expanded rnodes.
    pub fn average_children(&self) -> f32 {
        let mut sum = 0usize;
        let mut count = 0usize;
        for r in &self.rnodes {
            if let Some(children) = &r.children {
                sum += children.len();
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum as f32 / count as f32
        }
    }
}

impl Default for RoutingGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Projects a device intent code onto an rnode type.
fn rnode_type_of(intent: IntentCode) -> RnodeType {
    match intent {
        IntentCode::Pinfeed => RnodeType::PinfeedI,
        IntentCode::Pinbounce => RnodeType::Pinbounce,
        _ => RnodeType::Wire,
    }
}
