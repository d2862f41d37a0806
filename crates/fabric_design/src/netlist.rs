//! The unfolded hierarchical logical netlist.
//!
//! Cells form an instance tree rooted at `top`. Each cell owns its ports
//! (boundary pins) and its internal nets. Because the netlist is unfolded,
//! a `(cell, port)` pair identifies exactly one hierarchical pin and a
//! `(cell, net)` pair exactly one hierarchical net; no instance paths need
//! to be threaded through the API.
//!
//! A port has up to two attachments: an *outer* net (in the parent cell,
//! where the cell is instantiated) and an *inner* net (inside the cell,
//! absent for leaf cells). Alias groups of nets connected through ports
//! are collapsed by the parent-net map, which names the physical net each
//! logical net resolves to.

use crate::arena::Arena;
use crate::ids::{CellId, NetId, PortId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Direction of a logical port, relative to its cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PortDir {
    /// Signal flows into the cell.
    Input,
    /// Signal flows out of the cell.
    Output,
}

/// A hierarchical pin: one port on one cell instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PinRef {
    /// The cell instance the port belongs to.
    pub cell: CellId,
    /// The port on that cell.
    pub port: PortId,
}

impl PinRef {
    /// Creates a pin reference.
    pub fn new(cell: CellId, port: PortId) -> Self {
        Self { cell, port }
    }
}

/// A hierarchical net: one net owned by one cell instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct NetKey {
    /// The cell instance that owns the net.
    pub cell: CellId,
    /// The net inside that cell.
    pub net: NetId,
}

impl NetKey {
    /// Creates a net key.
    pub fn new(cell: CellId, net: NetId) -> Self {
        Self { cell, net }
    }
}

/// A port on a logical cell's boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogicalPort {
    /// The port name (e.g. "D", "Q", "probe0[3]").
    pub name: String,
    /// Direction relative to the owning cell.
    pub dir: PortDir,
    /// The net attached outside, in the parent cell.
    pub outer_net: Option<NetId>,
    /// The net attached inside the owning cell (`None` for leaf cells).
    pub inner_net: Option<NetId>,
}

/// A net inside a logical cell.
///
/// Pins on the net are either boundary ports of child instances (outer
/// attachment) or boundary ports of the owning cell itself (inner
/// attachment, `pin.cell == owner`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogicalNet {
    /// The net name, unique within the owning cell.
    pub name: String,
    /// The attached pins.
    pub pins: Vec<PinRef>,
}

/// One cell instance in the unfolded hierarchy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogicalCell {
    /// The instance name (one path segment).
    pub name: String,
    /// The library cell type (e.g. "LUT6", "FDRE", "GND", "VCC").
    pub lib: String,
    /// The parent instance (`None` for the top cell).
    pub parent: Option<CellId>,
    /// Child instances.
    pub children: Vec<CellId>,
    /// Boundary ports.
    pub ports: Arena<PortId, LogicalPort>,
    /// Internal nets.
    pub nets: Arena<NetId, LogicalNet>,
    /// Tombstone set when the instance is removed from the design.
    pub dead: bool,
}

impl LogicalCell {
    /// Returns the port with the given name.
    pub fn port_named(&self, name: &str) -> Option<PortId> {
        self.ports
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| id)
    }

    /// Returns the net with the given name.
    pub fn net_named(&self, name: &str) -> Option<NetId> {
        self.nets
            .iter()
            .find(|(_, n)| n.name == name)
            .map(|(id, _)| id)
    }
}

/// A reusable description of a cell to instantiate with
/// [`LogicalNetlist::instantiate`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellTemplate {
    /// The library cell type.
    pub lib: String,
    /// Boundary ports as `(name, dir)` pairs.
    pub ports: Vec<(String, PortDir)>,
    /// Child instances as `(instance name, template)` pairs.
    pub children: Vec<(String, CellTemplate)>,
}

impl CellTemplate {
    /// Creates a leaf template with the given library type and ports.
    pub fn leaf(lib: impl Into<String>, ports: &[(&str, PortDir)]) -> Self {
        Self {
            lib: lib.into(),
            ports: ports
                .iter()
                .map(|(n, d)| (n.to_string(), *d))
                .collect(),
            children: Vec::new(),
        }
    }
}

/// The unfolded hierarchical netlist.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogicalNetlist {
    /// All cell instances, including removed ones (tombstoned).
    pub cells: Arena<CellId, LogicalCell>,
    /// The top cell.
    pub top: CellId,
    /// Alias resolution: every net to its parent (physical) net.
    #[serde(skip)]
    parent_net: HashMap<NetKey, NetKey>,
    #[serde(skip)]
    parent_net_valid: bool,
    /// Counter backing [`unique_suffix`](Self::unique_suffix).
    unique_counter: u32,
}

impl LogicalNetlist {
    /// Creates a netlist containing only a top cell with the given name.
    pub fn new(top_name: impl Into<String>) -> Self {
        let mut cells = Arena::new();
        let top = cells.alloc(LogicalCell {
            name: top_name.into(),
            lib: "top".into(),
            parent: None,
            children: Vec::new(),
            ports: Arena::new(),
            nets: Arena::new(),
            dead: false,
        });
        Self {
            cells,
            top,
            parent_net: HashMap::new(),
            parent_net_valid: false,
            unique_counter: 0,
        }
    }

    /// Returns the cell with the given ID.
    pub fn cell(&self, id: CellId) -> &LogicalCell {
        self.cells.get(id)
    }

    /// Returns a mutable reference to the cell with the given ID.
    pub fn cell_mut(&mut self, id: CellId) -> &mut LogicalCell {
        self.cells.get_mut(id)
    }

    /// Returns the net behind a key.
    pub fn net(&self, key: NetKey) -> &LogicalNet {
        self.cells.get(key.cell).nets.get(key.net)
    }

    /// Returns the port behind a pin reference.
    pub fn port(&self, pin: PinRef) -> &LogicalPort {
        self.cells.get(pin.cell).ports.get(pin.port)
    }

    /// Returns `true` if the cell has no children (a primitive instance).
    pub fn is_leaf(&self, cell: CellId) -> bool {
        self.cells.get(cell).children.is_empty()
    }

    /// Returns `true` if the cell is a GND or VCC constant source.
    pub fn is_static_source(&self, cell: CellId) -> bool {
        matches!(self.cells.get(cell).lib.as_str(), "GND" | "VCC")
    }

    /// Returns the direction of a pin's port.
    pub fn dir_of(&self, pin: PinRef) -> PortDir {
        self.port(pin).dir
    }

    /// Creates a child cell instance under `parent`.
    pub fn create_child_cell(
        &mut self,
        parent: CellId,
        name: impl Into<String>,
        lib: impl Into<String>,
    ) -> CellId {
        let id = self.cells.alloc(LogicalCell {
            name: name.into(),
            lib: lib.into(),
            parent: Some(parent),
            children: Vec::new(),
            ports: Arena::new(),
            nets: Arena::new(),
            dead: false,
        });
        self.cells.get_mut(parent).children.push(id);
        self.parent_net_valid = false;
        id
    }

    /// Creates a port on a cell.
    pub fn create_port(&mut self, cell: CellId, name: impl Into<String>, dir: PortDir) -> PortId {
        self.cells.get_mut(cell).ports.alloc(LogicalPort {
            name: name.into(),
            dir,
            outer_net: None,
            inner_net: None,
        })
    }

    /// Creates a net inside a cell.
    pub fn create_net_in(&mut self, cell: CellId, name: impl Into<String>) -> NetKey {
        let net = self.cells.get_mut(cell).nets.alloc(LogicalNet {
            name: name.into(),
            pins: Vec::new(),
        });
        self.parent_net_valid = false;
        NetKey::new(cell, net)
    }

    /// Instantiates a template as a child of `parent`.
    pub fn instantiate(
        &mut self,
        parent: CellId,
        name: impl Into<String>,
        template: &CellTemplate,
    ) -> CellId {
        let id = self.create_child_cell(parent, name, template.lib.clone());
        for (pname, dir) in &template.ports {
            self.create_port(id, pname.clone(), *dir);
        }
        for (cname, child) in &template.children {
            self.instantiate(id, cname.clone(), child);
        }
        id
    }

    /// Attaches a pin to a net.
    ///
    /// The pin must be on the net's side: either a port of the owning cell
    /// itself (inner attachment) or a port of one of its children (outer
    /// attachment).
    pub fn add_pin_to_net(&mut self, key: NetKey, pin: PinRef) {
        if pin.cell == key.cell {
            self.cells.get_mut(pin.cell).ports.get_mut(pin.port).inner_net = Some(key.net);
        } else {
            debug_assert_eq!(self.cells.get(pin.cell).parent, Some(key.cell));
            self.cells.get_mut(pin.cell).ports.get_mut(pin.port).outer_net = Some(key.net);
        }
        let net = self.cells.get_mut(key.cell).nets.get_mut(key.net);
        if !net.pins.contains(&pin) {
            net.pins.push(pin);
        }
        self.parent_net_valid = false;
    }

    /// Detaches a pin from a net.
    pub fn remove_pin_from_net(&mut self, key: NetKey, pin: PinRef) {
        let net = self.cells.get_mut(key.cell).nets.get_mut(key.net);
        net.pins.retain(|p| *p != pin);
        let port = self.cells.get_mut(pin.cell).ports.get_mut(pin.port);
        if pin.cell == key.cell {
            port.inner_net = None;
        } else {
            port.outer_net = None;
        }
        self.parent_net_valid = false;
    }

    /// Returns the net a pin is attached to in its instantiating context.
    pub fn outer_net_key(&self, pin: PinRef) -> Option<NetKey> {
        let parent = self.cells.get(pin.cell).parent?;
        let net = self.port(pin).outer_net?;
        Some(NetKey::new(parent, net))
    }

    /// Returns the net a pin is attached to inside its own cell.
    pub fn inner_net_key(&self, pin: PinRef) -> Option<NetKey> {
        let net = self.port(pin).inner_net?;
        Some(NetKey::new(pin.cell, net))
    }

    /// Looks up a cell by hierarchical path relative to the top cell.
    ///
    /// An empty path names the top cell itself.
    pub fn find_cell(&self, path: &str) -> Option<CellId> {
        let mut cur = self.top;
        if path.is_empty() {
            return Some(cur);
        }
        for segment in path.split('/') {
            cur = *self
                .cells
                .get(cur)
                .children
                .iter()
                .find(|&&c| !self.cells.get(c).dead && self.cells.get(c).name == segment)?;
        }
        Some(cur)
    }

    /// Looks up a hierarchical pin by path (`inst/.../inst/PORT`).
    pub fn find_pin(&self, path: &str) -> Option<PinRef> {
        let (cell_path, port_name) = path.rsplit_once('/')?;
        let cell = self.find_cell(cell_path)?;
        let port = self.cells.get(cell).port_named(port_name)?;
        Some(PinRef::new(cell, port))
    }

    /// Looks up a hierarchical net by path (`inst/.../inst/NET`).
    pub fn find_net(&self, path: &str) -> Option<NetKey> {
        let (cell_path, net_name) = match path.rsplit_once('/') {
            Some(split) => split,
            None => ("", path),
        };
        let cell = self.find_cell(cell_path)?;
        let net = self.cells.get(cell).net_named(net_name)?;
        Some(NetKey::new(cell, net))
    }

    /// Returns the full hierarchical name of a cell (empty for top).
    pub fn full_cell_name(&self, cell: CellId) -> String {
        let mut segments = Vec::new();
        let mut cur = cell;
        while let Some(parent) = self.cells.get(cur).parent {
            segments.push(self.cells.get(cur).name.clone());
            cur = parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Returns the full hierarchical name of a pin.
    pub fn full_pin_name(&self, pin: PinRef) -> String {
        let cell_name = self.full_cell_name(pin.cell);
        let port_name = &self.port(pin).name;
        if cell_name.is_empty() {
            port_name.clone()
        } else {
            format!("{cell_name}/{port_name}")
        }
    }

    /// Returns the full hierarchical name of a net.
    pub fn full_net_name(&self, key: NetKey) -> String {
        let cell_name = self.full_cell_name(key.cell);
        let net_name = &self.net(key).name;
        if cell_name.is_empty() {
            net_name.clone()
        } else {
            format!("{cell_name}/{net_name}")
        }
    }

    /// Returns every leaf-cell pin reachable from `start` without crossing
    /// a net already in `visited`.
    ///
    /// The visited set doubles as a traversal cut: pre-seeding it with a
    /// neighbor net restricts the walk to one side of a hierarchy port.
    pub fn leaf_pins_of_group(
        &self,
        start: NetKey,
        visited: &mut HashSet<NetKey>,
    ) -> Vec<PinRef> {
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        if visited.insert(start) {
            queue.push_back(start);
        }
        while let Some(key) = queue.pop_front() {
            for &pin in &self.net(key).pins {
                if pin.cell == key.cell {
                    // Boundary port of the owning cell; cross to the outer
                    // net in the parent.
                    if let Some(outer) = self.outer_net_key(pin) {
                        if visited.insert(outer) {
                            queue.push_back(outer);
                        }
                    }
                } else if self.is_leaf(pin.cell) {
                    out.push(pin);
                } else if let Some(inner) = self.inner_net_key(pin) {
                    if visited.insert(inner) {
                        queue.push_back(inner);
                    }
                }
            }
        }
        out
    }

    /// Returns all leaf-cell descendants of a cell, itself included when it
    /// is a leaf.
    pub fn leaf_descendants(&self, cell: CellId) -> Vec<CellId> {
        let mut out = Vec::new();
        let mut stack = vec![cell];
        while let Some(cur) = stack.pop() {
            let c = self.cells.get(cur);
            if c.children.is_empty() {
                out.push(cur);
            } else {
                for &child in c.children.iter().rev() {
                    if !self.cells.get(child).dead {
                        stack.push(child);
                    }
                }
            }
        }
        out
    }

    /// Detaches a cell instance from its parent and tombstones the whole
    /// subtree. Ports must already be detached from their nets.
    pub fn remove_cell_inst(&mut self, cell: CellId) {
        if let Some(parent) = self.cells.get(cell).parent {
            self.cells.get_mut(parent).children.retain(|&c| c != cell);
        }
        let mut stack = vec![cell];
        while let Some(cur) = stack.pop() {
            self.cells.get_mut(cur).dead = true;
            stack.extend(self.cells.get(cur).children.clone());
        }
        self.parent_net_valid = false;
    }

    /// Returns a globally unique suffix for generated net and port names.
    pub fn unique_suffix(&mut self) -> String {
        self.unique_counter += 1;
        format!("_gen{}", self.unique_counter)
    }

    fn hierarchy_depth(&self, cell: CellId) -> usize {
        let mut depth = 0;
        let mut cur = cell;
        while let Some(parent) = self.cells.get(cur).parent {
            depth += 1;
            cur = parent;
        }
        depth
    }

    /// Invalidates the parent-net map; it is rebuilt lazily.
    pub fn reset_parent_net_map(&mut self) {
        self.parent_net_valid = false;
    }

    /// Returns the parent (physical) net of a logical net, rebuilding the
    /// alias map if stale.
    ///
    /// The representative of an alias group is the net whose owning cell
    /// contains the driving leaf output pin; driverless groups resolve to
    /// the member closest to the hierarchy top.
    pub fn parent_net(&mut self, key: NetKey) -> NetKey {
        if !self.parent_net_valid {
            self.rebuild_parent_net_map();
        }
        *self.parent_net.get(&key).unwrap_or(&key)
    }

    fn rebuild_parent_net_map(&mut self) {
        self.parent_net.clear();
        let mut grouped: HashSet<NetKey> = HashSet::new();
        let all_keys: Vec<NetKey> = self
            .cells
            .iter()
            .filter(|(_, c)| !c.dead)
            .flat_map(|(cell, c)| c.nets.iter().map(move |(net, _)| NetKey::new(cell, net)))
            .collect();
        for key in all_keys {
            if grouped.contains(&key) {
                continue;
            }
            let mut visited = HashSet::new();
            let leaves = self.leaf_pins_of_group(key, &mut visited);
            let rep = leaves
                .iter()
                .find(|&&pin| self.dir_of(pin) == PortDir::Output)
                .and_then(|&pin| self.outer_net_key(pin))
                .unwrap_or_else(|| {
                    *visited
                        .iter()
                        .min_by_key(|k| (self.hierarchy_depth(k.cell), k.cell, k.net))
                        .expect("alias group is never empty")
                });
            for member in visited {
                grouped.insert(member);
                self.parent_net.insert(member, rep);
            }
        }
        self.parent_net_valid = true;
    }
}

/// Stitches a pin to a net through the hierarchy, materializing ports and
/// nets on every crossed cell boundary.
///
/// `base_name` seeds the names of the created ports and nets; pass a name
/// already carrying a [`unique_suffix`](LogicalNetlist::unique_suffix) to
/// avoid colliding with bus nets.
pub fn connect_thru_hier(
    netlist: &mut LogicalNetlist,
    key: NetKey,
    pin: PinRef,
    base_name: &str,
) {
    let pin_ctx = netlist
        .cells
        .get(pin.cell)
        .parent
        .expect("cannot stitch a pin on the top cell");
    let pin_drives = netlist.dir_of(pin) == PortDir::Output;

    let lca = lowest_common_ancestor(netlist, key.cell, pin_ctx);

    // Climb the net side to the LCA. Ports on this chain carry the signal
    // toward the net when the pin drives, away from it otherwise.
    let net_side_dir = if pin_drives {
        PortDir::Input
    } else {
        PortDir::Output
    };
    let top_net = climb_chain(netlist, key, lca, net_side_dir, base_name, None);

    if pin_ctx == lca {
        netlist.add_pin_to_net(top_net, pin);
    } else {
        let pin_side_dir = if pin_drives {
            PortDir::Output
        } else {
            PortDir::Input
        };
        let start = create_unique_net(netlist, pin_ctx, base_name);
        netlist.add_pin_to_net(start, pin);
        climb_chain(netlist, start, lca, pin_side_dir, base_name, Some(top_net));
    }
}

/// Walks from `key`'s cell up to `lca`, creating one port per crossed
/// boundary and one net per intermediate level. When `join` is given, the
/// final boundary attaches to it instead of a fresh net.
fn climb_chain(
    netlist: &mut LogicalNetlist,
    mut key: NetKey,
    lca: CellId,
    port_dir: PortDir,
    base_name: &str,
    join: Option<NetKey>,
) -> NetKey {
    while key.cell != lca {
        let cell = key.cell;
        let parent = netlist
            .cells
            .get(cell)
            .parent
            .expect("LCA not on the path to the top cell");
        let port_name = unique_port_name(netlist, cell, base_name);
        let port = netlist.create_port(cell, port_name, port_dir);
        netlist.add_pin_to_net(key, PinRef::new(cell, port));
        key = if parent == lca {
            match join {
                Some(joined) => joined,
                None => create_unique_net(netlist, parent, base_name),
            }
        } else {
            create_unique_net(netlist, parent, base_name)
        };
        netlist.add_pin_to_net(key, PinRef::new(cell, port));
    }
    key
}

fn lowest_common_ancestor(netlist: &LogicalNetlist, a: CellId, b: CellId) -> CellId {
    let mut ancestors = HashSet::new();
    let mut cur = Some(a);
    while let Some(c) = cur {
        ancestors.insert(c);
        cur = netlist.cells.get(c).parent;
    }
    let mut cur = Some(b);
    while let Some(c) = cur {
        if ancestors.contains(&c) {
            return c;
        }
        cur = netlist.cells.get(c).parent;
    }
    netlist.top
}

fn create_unique_net(netlist: &mut LogicalNetlist, cell: CellId, base: &str) -> NetKey {
    let name = unique_name(base, |n| netlist.cells.get(cell).net_named(n).is_some());
    netlist.create_net_in(cell, name)
}

fn unique_port_name(netlist: &LogicalNetlist, cell: CellId, base: &str) -> String {
    unique_name(base, |n| netlist.cells.get(cell).port_named(n).is_some())
}

fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut i = 1;
    loop {
        let candidate = format!("{base}_{i}");
        if !taken(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// top
    ///   a (wrapper)
    ///     drv (LUT1: O out)
    ///   b (wrapper)
    ///     snk (FDRE: D in)
    /// with top net "w" joining a.O -> b.I through the hierarchy.
    fn two_level_netlist() -> (LogicalNetlist, PinRef, PinRef) {
        let mut nl = LogicalNetlist::new("top");
        let top = nl.top;
        let a = nl.create_child_cell(top, "a", "wrapper");
        let b = nl.create_child_cell(top, "b", "wrapper");
        let drv = nl.create_child_cell(a, "drv", "LUT1");
        let snk = nl.create_child_cell(b, "snk", "FDRE");

        let drv_o = nl.create_port(drv, "O", PortDir::Output);
        let snk_d = nl.create_port(snk, "D", PortDir::Input);
        let a_o = nl.create_port(a, "O", PortDir::Output);
        let b_i = nl.create_port(b, "I", PortDir::Input);

        let na = nl.create_net_in(a, "w_inner");
        nl.add_pin_to_net(na, PinRef::new(drv, drv_o));
        nl.add_pin_to_net(na, PinRef::new(a, a_o));

        let nb = nl.create_net_in(b, "w_inner");
        nl.add_pin_to_net(nb, PinRef::new(snk, snk_d));
        nl.add_pin_to_net(nb, PinRef::new(b, b_i));

        let nt = nl.create_net_in(top, "w");
        nl.add_pin_to_net(nt, PinRef::new(a, a_o));
        nl.add_pin_to_net(nt, PinRef::new(b, b_i));

        (nl, PinRef::new(drv, drv_o), PinRef::new(snk, snk_d))
    }

    #[test]
    fn find_cell_and_pin() {
        let (nl, drv_o, _) = two_level_netlist();
        assert_eq!(nl.find_pin("a/drv/O"), Some(drv_o));
        assert!(nl.find_pin("a/drv/Z").is_none());
        assert!(nl.find_cell("a/nothing").is_none());
        assert_eq!(nl.full_pin_name(drv_o), "a/drv/O");
    }

    #[test]
    fn leaf_group_spans_hierarchy() {
        let (nl, drv_o, snk_d) = two_level_netlist();
        let key = nl.find_net("w").unwrap();
        let mut visited = HashSet::new();
        let mut leaves = nl.leaf_pins_of_group(key, &mut visited);
        leaves.sort_by_key(|p| nl.full_pin_name(*p));
        assert_eq!(leaves, vec![drv_o, snk_d]);
        // Three nets in the alias group.
        assert_eq!(visited.len(), 3);
    }

    #[test]
    fn visited_set_cuts_traversal() {
        let (nl, _, snk_d) = two_level_netlist();
        let inner = nl.inner_net_key(nl.find_pin("b/I").unwrap()).unwrap();
        let outer = nl.outer_net_key(nl.find_pin("b/I").unwrap()).unwrap();
        // Seeding visited with the outer net restricts the walk to b's side.
        let mut visited = HashSet::new();
        visited.insert(outer);
        let leaves = nl.leaf_pins_of_group(inner, &mut visited);
        assert_eq!(leaves, vec![snk_d]);
    }

    #[test]
    fn parent_net_is_driver_side() {
        let (mut nl, drv_o, _) = two_level_netlist();
        let rep_expected = nl.outer_net_key(drv_o).unwrap();
        let top_key = nl.find_net("w").unwrap();
        let b_inner = nl.find_net("b/w_inner").unwrap();
        assert_eq!(nl.parent_net(top_key), rep_expected);
        assert_eq!(nl.parent_net(b_inner), rep_expected);
        assert_eq!(nl.parent_net(rep_expected), rep_expected);
    }

    #[test]
    fn remove_pin_clears_port_side() {
        let (mut nl, drv_o, _) = two_level_netlist();
        let key = nl.outer_net_key(drv_o).unwrap();
        nl.remove_pin_from_net(key, drv_o);
        assert!(nl.port(drv_o).outer_net.is_none());
        assert!(!nl.net(key).pins.contains(&drv_o));
    }

    #[test]
    fn connect_thru_hier_creates_ports() {
        let mut nl = LogicalNetlist::new("top");
        let top = nl.top;
        let a = nl.create_child_cell(top, "a", "wrapper");
        let drv = nl.create_child_cell(a, "drv", "LUT1");
        let drv_o = nl.create_port(drv, "O", PortDir::Output);
        let b = nl.create_child_cell(top, "b", "wrapper");
        let snk = nl.create_child_cell(b, "snk", "FDRE");
        let snk_d = nl.create_port(snk, "D", PortDir::Input);

        // Net lives in a; source attached locally.
        let key = nl.create_net_in(a, "sig");
        nl.add_pin_to_net(key, PinRef::new(drv, drv_o));

        // Stitch the sink across the hierarchy.
        connect_thru_hier(&mut nl, key, PinRef::new(snk, snk_d), "sig_gen1");

        let mut visited = HashSet::new();
        let mut leaves = nl.leaf_pins_of_group(key, &mut visited);
        leaves.sort_by_key(|p| nl.full_pin_name(*p));
        assert_eq!(leaves.len(), 2);
        assert!(leaves.contains(&PinRef::new(drv, drv_o)));
        assert!(leaves.contains(&PinRef::new(snk, snk_d)));
        // A port materialized on each crossed boundary, with directions
        // following the signal away from the driver.
        let a_port = nl.cell(a).port_named("sig_gen1").unwrap();
        assert_eq!(nl.port(PinRef::new(a, a_port)).dir, PortDir::Output);
        let b_port = nl.cell(b).port_named("sig_gen1").unwrap();
        assert_eq!(nl.port(PinRef::new(b, b_port)).dir, PortDir::Input);
    }

    #[test]
    fn connect_thru_hier_driver_pin() {
        // Net at top, driver buried one level down: the crossed boundary
        // gets an Output port.
        let mut nl = LogicalNetlist::new("top");
        let top = nl.top;
        let a = nl.create_child_cell(top, "a", "wrapper");
        let drv = nl.create_child_cell(a, "drv", "LUT1");
        let drv_o = nl.create_port(drv, "O", PortDir::Output);
        let key = nl.create_net_in(top, "sig");

        connect_thru_hier(&mut nl, key, PinRef::new(drv, drv_o), "sig_gen1");

        let a_port = nl.cell(a).port_named("sig_gen1").unwrap();
        assert_eq!(nl.port(PinRef::new(a, a_port)).dir, PortDir::Output);
        let mut visited = HashSet::new();
        let leaves = nl.leaf_pins_of_group(key, &mut visited);
        assert_eq!(leaves, vec![PinRef::new(drv, drv_o)]);
    }

    #[test]
    fn remove_cell_tombstones_subtree() {
        let (mut nl, _, _) = two_level_netlist();
        let a = nl.find_cell("a").unwrap();
        let drv = nl.find_cell("a/drv").unwrap();
        nl.remove_cell_inst(a);
        assert!(nl.cell(a).dead);
        assert!(nl.cell(drv).dead);
        assert!(nl.find_cell("a").is_none());
    }

    #[test]
    fn leaf_descendants_collects_leaves() {
        let (nl, _, _) = two_level_netlist();
        let top_leaves = nl.leaf_descendants(nl.top);
        assert_eq!(top_leaves.len(), 2);
    }

    #[test]
    fn instantiate_template() {
        let mut nl = LogicalNetlist::new("top");
        let top = nl.top;
        let tmpl = CellTemplate {
            lib: "wrapper".into(),
            ports: vec![("I".into(), PortDir::Input)],
            children: vec![(
                "lut".into(),
                CellTemplate::leaf("LUT1", &[("I0", PortDir::Input), ("O", PortDir::Output)]),
            )],
        };
        let inst = nl.instantiate(top, "u0", &tmpl);
        assert_eq!(nl.full_cell_name(inst), "u0");
        assert!(nl.find_pin("u0/lut/O").is_some());
        assert!(!nl.is_leaf(inst));
    }

    #[test]
    fn unique_suffix_monotonic() {
        let mut nl = LogicalNetlist::new("top");
        let a = nl.unique_suffix();
        let b = nl.unique_suffix();
        assert_ne!(a, b);
    }
}
