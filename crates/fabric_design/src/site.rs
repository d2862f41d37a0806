//! Site instances and intra-site routing state.
//!
//! A [`SiteInst`] holds the mutable, per-design state of one placed site:
//! which net occupies each sitewire, which input each routing BEL (site
//! PIP) currently selects, which cell sits on each BEL, and the pin
//! instances on the site boundary. The static connectivity comes from the
//! device's [`SiteTypeDef`](fabric_device::SiteTypeDef).

use crate::design::Design;
use crate::ids::{PhysCellId, PhysNetId, SiteInstId, SitePinId};
use fabric_device::{BelClass, BelPinRef, DeviceGraph, PinDir, SiteTypeDef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The mutable state of one placed site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteInst {
    /// The site name (e.g. "SLICE_X13Y237").
    pub name: String,
    /// The site-type name resolved through the device.
    pub site_type: String,
    /// Pin instances on the site boundary, by pin name.
    pub pins: HashMap<String, SitePinId>,
    /// The net occupying each sitewire.
    pub sitewire_nets: HashMap<String, PhysNetId>,
    /// The selected input pin of each configured routing BEL.
    pub used_site_pips: HashMap<String, String>,
    /// The cell placed on each BEL.
    pub cells: HashMap<String, PhysCellId>,
}

impl SiteInst {
    /// Creates an empty site instance.
    pub fn new(name: impl Into<String>, site_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            site_type: site_type.into(),
            pins: HashMap::new(),
            sitewire_nets: HashMap::new(),
            used_site_pips: HashMap::new(),
            cells: HashMap::new(),
        }
    }
}

fn site_type_def<'d>(design: &Design, device: &'d dyn DeviceGraph, site: SiteInstId) -> &'d SiteTypeDef {
    let name = &design.sites.get(site).site_type;
    device
        .site_type(name)
        .unwrap_or_else(|| panic!("unknown site type '{name}'"))
}

/// Returns the net currently occupying a sitewire.
pub fn net_from_sitewire(design: &Design, site: SiteInstId, sitewire: &str) -> Option<PhysNetId> {
    design.sites.get(site).sitewire_nets.get(sitewire).copied()
}

/// Returns the selected input pin of a routing BEL, if it is configured.
pub fn used_site_pip(design: &Design, site: SiteInstId, bel: &str) -> Option<String> {
    design.sites.get(site).used_site_pips.get(bel).cloned()
}

/// Routes `net` inside a site from one BEL pin to another, activating site
/// PIPs along the way and claiming the crossed sitewires.
///
/// With `from == to` this just claims the pin's sitewire, which is how
/// sitewires are blocked (USED_NET) or restored after a partial unroute.
/// Returns `false` when no path exists or a crossed sitewire is already
/// claimed by a different net.
pub fn route_intra_site_net(
    design: &mut Design,
    device: &dyn DeviceGraph,
    site: SiteInstId,
    net: PhysNetId,
    from: &BelPinRef,
    to: &BelPinRef,
) -> bool {
    let std = site_type_def(design, device, site);
    let Some(from_wire) = std.sitewire_of(from).map(str::to_string) else {
        return false;
    };
    let Some(to_wire) = std.sitewire_of(to).map(str::to_string) else {
        return false;
    };
    if from_wire == to_wire {
        design
            .sites
            .get_mut(site)
            .sitewire_nets
            .insert(from_wire, net);
        return true;
    }

    // BFS downstream over site PIPs, plus route-throughs of unoccupied
    // LUTs. An edge exists from a sitewire to a routing BEL's output
    // sitewire through any of the BEL's input pins on the current wire;
    // LUT crossings carry no site PIP.
    let mut prev: HashMap<String, (String, Option<(String, String)>)> = HashMap::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(from_wire.clone());
    let mut found = false;
    while let Some(wire) = queue.pop_front() {
        if wire == to_wire {
            found = true;
            break;
        }
        for pin in std.sitewire_bel_pins(&wire) {
            let Some(bel) = std.bel(&pin.bel) else { continue };
            if std.bel_pin_dir(&pin) != Some(PinDir::Input) {
                continue;
            }
            let mut hops: Vec<(String, Option<(String, String)>)> = Vec::new();
            match bel.class {
                BelClass::Routing => {
                    let Some(pip) = std.site_pip_on(&pin.bel) else {
                        continue;
                    };
                    if !pip.inputs.contains(&pin.pin) {
                        continue;
                    }
                    let out_wire = std
                        .sitewire_of(&BelPinRef::new(pip.bel.clone(), pip.output.clone()))
                        .expect("site PIP output pin has a sitewire")
                        .to_string();
                    hops.push((out_wire, Some((pin.bel.clone(), pin.pin.clone()))));
                }
                BelClass::Logic => {
                    let occupied = design.sites.get(site).cells.contains_key(&pin.bel);
                    if !pin.bel.ends_with("LUT") || occupied {
                        continue;
                    }
                    for out in &bel.pins {
                        if out.dir == PinDir::Output {
                            hops.push((out.sitewire.clone(), None));
                        }
                    }
                }
                BelClass::Port => continue,
            }
            for (out_wire, crossing) in hops {
                if prev.contains_key(&out_wire) || out_wire == from_wire {
                    continue;
                }
                prev.insert(out_wire.clone(), (wire.clone(), crossing));
                queue.push_back(out_wire);
            }
        }
    }
    if !found {
        return false;
    }

    // Collect the path and refuse if any crossed wire belongs to a
    // different net.
    let mut wires = vec![to_wire.clone()];
    let mut pips = Vec::new();
    let mut cur = to_wire;
    while cur != from_wire {
        let (wire, crossing) = prev[&cur].clone();
        if let Some((bel, input)) = crossing {
            pips.push((bel, input));
        }
        wires.push(wire.clone());
        cur = wire;
    }
    {
        let inst = design.sites.get(site);
        for wire in &wires {
            if let Some(&occupant) = inst.sitewire_nets.get(wire) {
                if occupant != net {
                    return false;
                }
            }
        }
    }
    let inst = design.sites.get_mut(site);
    for wire in wires {
        inst.sitewire_nets.insert(wire, net);
    }
    for (bel, input) in pips {
        inst.used_site_pips.insert(bel, input);
    }
    true
}

/// Unroutes the intra-site path from one BEL pin to another, clearing the
/// crossed sitewires and deconfiguring the crossed site PIPs.
///
/// The `from` pin's own sitewire is ripped up too; callers that need the
/// driver side preserved re-claim it afterwards with
/// [`route_intra_site_net`] (`from == to`). Returns `false` when no routed
/// path connects the two pins.
pub fn unroute_intra_site_net(
    design: &mut Design,
    device: &dyn DeviceGraph,
    site: SiteInstId,
    from: &BelPinRef,
    to: &BelPinRef,
) -> bool {
    let std = site_type_def(design, device, site);
    let Some(from_wire) = std.sitewire_of(from).map(str::to_string) else {
        return false;
    };
    let Some(to_wire) = std.sitewire_of(to).map(str::to_string) else {
        return false;
    };
    if from_wire == to_wire {
        design.sites.get_mut(site).sitewire_nets.remove(&from_wire);
        return true;
    }

    // Follow currently configured site PIPs, plus LUT route-throughs
    // whose input and output sitewires carry the same net.
    let inst = design.sites.get(site);
    let mut prev: HashMap<String, (String, Option<String>)> = HashMap::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(from_wire.clone());
    let mut found = false;
    while let Some(wire) = queue.pop_front() {
        if wire == to_wire {
            found = true;
            break;
        }
        for pin in std.sitewire_bel_pins(&wire) {
            let Some(bel) = std.bel(&pin.bel) else { continue };
            if std.bel_pin_dir(&pin) != Some(PinDir::Input) {
                continue;
            }
            let mut hops: Vec<(String, Option<String>)> = Vec::new();
            match bel.class {
                BelClass::Routing => {
                    if inst.used_site_pips.get(&pin.bel) != Some(&pin.pin) {
                        continue;
                    }
                    let pip = std.site_pip_on(&pin.bel).expect("used site PIP is defined");
                    let out_wire = std
                        .sitewire_of(&BelPinRef::new(pip.bel.clone(), pip.output.clone()))
                        .expect("site PIP output pin has a sitewire")
                        .to_string();
                    hops.push((out_wire, Some(pin.bel.clone())));
                }
                BelClass::Logic => {
                    if !pin.bel.ends_with("LUT") || inst.cells.contains_key(&pin.bel) {
                        continue;
                    }
                    let here = inst.sitewire_nets.get(&wire);
                    for out in &bel.pins {
                        if out.dir == PinDir::Output
                            && here.is_some()
                            && inst.sitewire_nets.get(&out.sitewire) == here
                        {
                            hops.push((out.sitewire.clone(), None));
                        }
                    }
                }
                BelClass::Port => continue,
            }
            for (out_wire, crossing) in hops {
                if prev.contains_key(&out_wire) || out_wire == from_wire {
                    continue;
                }
                prev.insert(out_wire.clone(), (wire.clone(), crossing));
                queue.push_back(out_wire);
            }
        }
    }
    if !found {
        return false;
    }

    let mut wires = vec![to_wire.clone()];
    let mut bels = Vec::new();
    let mut cur = to_wire;
    while cur != from_wire {
        let (wire, crossing) = prev[&cur].clone();
        if let Some(bel) = crossing {
            bels.push(bel);
        }
        wires.push(wire.clone());
        cur = wire;
    }
    let inst = design.sites.get_mut(site);
    for wire in wires {
        inst.sitewire_nets.remove(&wire);
    }
    for bel in bels {
        inst.used_site_pips.remove(&bel);
    }
    true
}
