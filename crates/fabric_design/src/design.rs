//! The top-level design: logical netlist plus physical state.

use crate::arena::Arena;
use crate::cell::PhysCell;
use crate::ids::{PhysCellId, PhysNetId, SiteInstId, SitePinId};
use crate::net::{NetType, PhysNet, SitePinInst};
use crate::netlist::LogicalNetlist;
use crate::site::SiteInst;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The name of the constant-0 distribution net.
pub const GND_NET: &str = "GLOBAL_LOGIC0";
/// The name of the constant-1 distribution net.
pub const VCC_NET: &str = "GLOBAL_LOGIC1";
/// The blocker net marking sitewires that must not be repurposed.
pub const USED_NET: &str = "GLOBAL_USEDNET";

/// A placed (and possibly routed) design: the logical netlist and the
/// physical state that must stay consistent with it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Design {
    /// The design name.
    pub name: String,
    /// The unfolded logical netlist.
    pub netlist: LogicalNetlist,
    /// All physical nets.
    pub nets: Arena<PhysNetId, PhysNet>,
    /// All site instances.
    pub sites: Arena<SiteInstId, SiteInst>,
    /// All site pin instances, including detached ones.
    pub pins: Arena<SitePinId, SitePinInst>,
    /// All physical cells, including removed ones (tombstoned).
    pub cells: Arena<PhysCellId, PhysCell>,
    #[serde(skip)]
    net_by_name: HashMap<String, PhysNetId>,
    #[serde(skip)]
    site_by_name: HashMap<String, SiteInstId>,
    #[serde(skip)]
    cell_by_name: HashMap<String, PhysCellId>,
}

impl Design {
    /// Creates an empty design with the given name and top cell.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            netlist: LogicalNetlist::new(name.clone()),
            name,
            nets: Arena::new(),
            sites: Arena::new(),
            pins: Arena::new(),
            cells: Arena::new(),
            net_by_name: HashMap::new(),
            site_by_name: HashMap::new(),
            cell_by_name: HashMap::new(),
        }
    }

    /// Rebuilds the name indices after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.net_by_name.clear();
        for (id, net) in self.nets.iter() {
            self.net_by_name.insert(net.name.clone(), id);
        }
        self.site_by_name.clear();
        for (id, site) in self.sites.iter() {
            self.site_by_name.insert(site.name.clone(), id);
        }
        self.cell_by_name.clear();
        for (id, cell) in self.cells.iter() {
            if !cell.dead {
                self.cell_by_name.insert(cell.name.clone(), id);
            }
        }
    }

    // --- Physical nets ---

    /// Returns the physical net with the given name.
    pub fn net_named(&self, name: &str) -> Option<PhysNetId> {
        self.net_by_name.get(name).copied()
    }

    /// Creates a physical net. GND/VCC names produce static nets.
    pub fn create_net(&mut self, name: impl Into<String>) -> PhysNetId {
        let name = name.into();
        let ntype = match name.as_str() {
            GND_NET => NetType::Gnd,
            VCC_NET => NetType::Vcc,
            _ => NetType::Wire,
        };
        let id = self.nets.alloc(PhysNet::new(name.clone(), ntype));
        self.net_by_name.insert(name, id);
        id
    }

    /// Returns the GND net, creating it on first use.
    pub fn gnd_net(&mut self) -> PhysNetId {
        self.net_named(GND_NET)
            .unwrap_or_else(|| self.create_net(GND_NET))
    }

    /// Returns the VCC net, creating it on first use.
    pub fn vcc_net(&mut self) -> PhysNetId {
        self.net_named(VCC_NET)
            .unwrap_or_else(|| self.create_net(VCC_NET))
    }

    /// Returns the USED_NET blocker net, creating it on first use.
    pub fn used_net(&mut self) -> PhysNetId {
        self.net_named(USED_NET)
            .unwrap_or_else(|| self.create_net(USED_NET))
    }

    /// Returns the static net of the given type.
    pub fn static_net(&mut self, ntype: NetType) -> Option<PhysNetId> {
        match ntype {
            NetType::Gnd => Some(self.gnd_net()),
            NetType::Vcc => Some(self.vcc_net()),
            NetType::Wire => None,
        }
    }

    /// Removes every PIP of a net and marks its sinks unrouted.
    pub fn unroute_net(&mut self, net: PhysNetId) {
        let pins: Vec<SitePinId> = self.nets.get(net).pins.clone();
        self.nets.get_mut(net).pips.clear();
        for pin in pins {
            let pin = self.pins.get_mut(pin);
            if !pin.is_output {
                pin.routed = false;
            }
        }
    }

    /// Returns the sink pins of a net.
    pub fn sink_pins(&self, net: PhysNetId) -> Vec<SitePinId> {
        self.nets
            .get(net)
            .pins
            .iter()
            .copied()
            .filter(|&p| !self.pins.get(p).is_output)
            .collect()
    }

    /// Returns `true` if the net has a source but no sinks.
    pub fn is_load_less(&self, net: PhysNetId) -> bool {
        self.nets.get(net).source.is_some() && self.sink_pins(net).is_empty()
    }

    /// Returns `true` if the net has sinks but no source.
    pub fn is_driver_less(&self, net: PhysNetId) -> bool {
        self.nets.get(net).source.is_none() && !self.sink_pins(net).is_empty()
    }

    /// Returns `true` if the net has no site pins at all (routed entirely
    /// inside a site).
    pub fn is_internally_routed(&self, net: PhysNetId) -> bool {
        self.nets.get(net).pins.is_empty()
    }

    // --- Site instances ---

    /// Returns the site instance with the given name.
    pub fn site_named(&self, name: &str) -> Option<SiteInstId> {
        self.site_by_name.get(name).copied()
    }

    /// Creates a site instance of the given site type.
    pub fn create_site(
        &mut self,
        name: impl Into<String>,
        site_type: impl Into<String>,
    ) -> SiteInstId {
        let name = name.into();
        let id = self.sites.alloc(SiteInst::new(name.clone(), site_type));
        self.site_by_name.insert(name, id);
        id
    }

    /// Returns the pin instance with the given name on a site.
    pub fn site_pin(&self, site: SiteInstId, pin: &str) -> Option<SitePinId> {
        self.sites.get(site).pins.get(pin).copied()
    }

    // --- Site pin instances ---

    /// Creates a site pin instance on `site` and attaches it to `net`.
    ///
    /// Output pins become the net source, or the alternate source when a
    /// source already exists.
    pub fn create_pin(
        &mut self,
        net: PhysNetId,
        site: SiteInstId,
        pin_name: impl Into<String>,
        is_output: bool,
    ) -> SitePinId {
        let pin_name = pin_name.into();
        debug_assert!(
            !self.sites.get(site).pins.contains_key(&pin_name),
            "site pin created twice"
        );
        let id = self.pins.alloc(SitePinInst {
            name: pin_name.clone(),
            site: Some(site),
            is_output,
            net: Some(net),
            routed: false,
        });
        self.sites.get_mut(site).pins.insert(pin_name, id);
        self.attach_pin(net, id);
        id
    }

    /// Attaches an existing pin instance to a net.
    pub fn attach_pin(&mut self, net: PhysNetId, pin: SitePinId) {
        let is_output = self.pins.get(pin).is_output;
        self.pins.get_mut(pin).net = Some(net);
        let n = self.nets.get_mut(net);
        if !n.pins.contains(&pin) {
            n.pins.push(pin);
        }
        if is_output {
            if n.source.is_none() {
                n.source = Some(pin);
            } else if n.source != Some(pin) && n.alt_source.is_none() {
                n.alt_source = Some(pin);
            }
        }
    }

    /// Detaches a pin from its net.
    ///
    /// With `preserve_other_routes` the net's PIPs are left alone (a stub
    /// may persist); otherwise the whole net is unrouted.
    pub fn detach_pin(&mut self, net: PhysNetId, pin: SitePinId, preserve_other_routes: bool) {
        {
            let n = self.nets.get_mut(net);
            n.pins.retain(|&p| p != pin);
            if n.source == Some(pin) {
                n.source = None;
            }
            if n.alt_source == Some(pin) {
                n.alt_source = None;
            }
        }
        self.pins.get_mut(pin).net = None;
        if !preserve_other_routes {
            self.unroute_net(net);
        }
    }

    /// Removes a pin instance from its site, leaving it fully detached.
    pub fn remove_pin_from_site(&mut self, pin: SitePinId) {
        if let Some(site) = self.pins.get(pin).site {
            let name = self.pins.get(pin).name.clone();
            self.sites.get_mut(site).pins.remove(&name);
        }
        self.pins.get_mut(pin).site = None;
    }

    /// Formats a pin instance the way reports show it: `IN SITE.PIN` or
    /// `OUT SITE.PIN`.
    pub fn pin_display(&self, pin: SitePinId) -> String {
        let p = self.pins.get(pin);
        let dir = if p.is_output { "OUT" } else { "IN" };
        let site = p
            .site
            .map(|s| self.sites.get(s).name.clone())
            .unwrap_or_else(|| "<detached>".into());
        format!("{dir} {site}.{}", p.name)
    }

    // --- Physical cells ---

    /// Returns the physical cell with the given hierarchical name.
    pub fn cell_named(&self, name: &str) -> Option<PhysCellId> {
        self.cell_by_name.get(name).copied()
    }

    /// Adds a physical cell.
    pub fn add_cell(&mut self, cell: PhysCell) -> PhysCellId {
        let name = cell.name.clone();
        let id = self.cells.alloc(cell);
        self.cell_by_name.insert(name, id);
        id
    }

    /// Tombstones a physical cell and drops it from the name index.
    pub fn remove_cell(&mut self, cell: PhysCellId) {
        let name = self.cells.get(cell).name.clone();
        self.cell_by_name.remove(&name);
        self.cells.get_mut(cell).dead = true;
    }
}
