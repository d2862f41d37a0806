//! Physical cells and logical-to-physical pin resolution.
//!
//! A [`PhysCell`] is the physical incarnation of one leaf logical cell:
//! its placement (site + BEL) and the mapping from logical pin names to
//! physical BEL pin names. The walk functions here resolve a logical pin
//! to the site pins servicing it by following sitewires through the site,
//! either along the currently configured intra-site routing or along every
//! realizable path.

use crate::design::Design;
use crate::ids::{CellId, PhysCellId, SiteInstId, SitePinId};
use crate::site::used_site_pip;
use fabric_device::{BelClass, BelPinRef, DeviceGraph, PinDir, SiteTypeDef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The physical incarnation of a leaf logical cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhysCell {
    /// The full hierarchical name of the logical cell.
    pub name: String,
    /// The logical cell, when the link is known.
    pub logical: Option<CellId>,
    /// The site the cell is placed on (`None` = unplaced).
    pub site: Option<SiteInstId>,
    /// The BEL the cell is placed on.
    pub bel: Option<String>,
    /// Logical pin name to physical BEL pin names. LUT fracturing can map
    /// one logical pin onto several physical pins.
    pub pin_map: HashMap<String, Vec<String>>,
    /// Tombstone set when the cell is removed from the design.
    pub dead: bool,
}

impl PhysCell {
    /// Creates an unplaced cell with the given hierarchical name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logical: None,
            site: None,
            bel: None,
            pin_map: HashMap::new(),
            dead: false,
        }
    }

    /// Returns `true` when the cell has a site and BEL assignment.
    pub fn is_placed(&self) -> bool {
        self.site.is_some() && self.bel.is_some()
    }
}

/// How pin-resolution walks cross routing BELs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PinWalk {
    /// Follow only currently configured site PIPs: resolves what the pin
    /// is wired to right now.
    ExistingRouting,
    /// Also branch through unconfigured site PIPs (and optionally LUT
    /// route-throughs): resolves everywhere the pin could be wired.
    Potential,
}

/// Returns the BEL pins a logical pin maps onto.
pub fn bel_pin_refs(design: &Design, cell: PhysCellId, logical_pin: &str) -> Vec<BelPinRef> {
    let c = design.cells.get(cell);
    let Some(bel) = &c.bel else {
        return Vec::new();
    };
    c.pin_map
        .get(logical_pin)
        .map(|phys| {
            phys.iter()
                .map(|p| BelPinRef::new(bel.clone(), p.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Returns the first BEL pin a logical pin maps onto.
pub fn cell_bel_pin(design: &Design, cell: PhysCellId, logical_pin: &str) -> Option<BelPinRef> {
    bel_pin_refs(design, cell, logical_pin).into_iter().next()
}

/// Returns the logical pin mapped onto a physical BEL pin, if any.
pub fn logical_pin_of_bel_pin(
    design: &Design,
    cell: PhysCellId,
    bel_pin: &str,
) -> Option<String> {
    let c = design.cells.get(cell);
    c.pin_map
        .iter()
        .find(|(_, phys)| phys.iter().any(|p| p == bel_pin))
        .map(|(logical, _)| logical.clone())
}

/// Resolves a logical pin to the site pin names that reach it.
///
/// `sitewires`, when given, collects every sitewire touched by the walk
/// (the seed list for site-PIP unrouting when no site pin is reachable).
pub fn corresponding_site_pin_names(
    design: &Design,
    device: &dyn DeviceGraph,
    cell: PhysCellId,
    logical_pin: &str,
    walk: PinWalk,
    mut sitewires: Option<&mut Vec<String>>,
    consider_lut_routethru: bool,
) -> Vec<String> {
    let c = design.cells.get(cell);
    let Some(site) = c.site else {
        return Vec::new();
    };
    let Some(std) = device.site_type(&design.sites.get(site).site_type) else {
        return Vec::new();
    };

    let mut candidates: Vec<String> = Vec::new();
    for bel_pin in bel_pin_refs(design, cell, logical_pin) {
        let Some(dir) = std.bel_pin_dir(&bel_pin) else {
            continue;
        };
        let Some(start) = std.sitewire_of(&bel_pin).map(str::to_string) else {
            continue;
        };
        let names = match dir {
            PinDir::Input => {
                walk_upstream(design, std, site, &start, walk, &mut sitewires, consider_lut_routethru)
            }
            PinDir::Output => walk_downstream(design, std, site, &start, walk, &mut sitewires),
        };
        for name in names {
            if !candidates.contains(&name) {
                candidates.push(name);
            }
        }
    }
    candidates
}

/// Returns the site pin instances currently servicing a logical pin.
pub fn all_site_pins_from_logical_pin(
    design: &Design,
    device: &dyn DeviceGraph,
    cell: PhysCellId,
    logical_pin: &str,
) -> Vec<SitePinId> {
    let Some(site) = design.cells.get(cell).site else {
        return Vec::new();
    };
    corresponding_site_pin_names(
        design,
        device,
        cell,
        logical_pin,
        PinWalk::ExistingRouting,
        None,
        false,
    )
    .into_iter()
    .filter_map(|name| design.site_pin(site, &name))
    .collect()
}

fn record(sitewires: &mut Option<&mut Vec<String>>, wire: &str) {
    if let Some(list) = sitewires {
        if !list.iter().any(|w| w == wire) {
            list.push(wire.to_string());
        }
    }
}

/// Walks from a sink BEL pin toward the site boundary, against the signal
/// direction.
fn walk_upstream(
    design: &Design,
    std: &SiteTypeDef,
    site: SiteInstId,
    start: &str,
    walk: PinWalk,
    sitewires: &mut Option<&mut Vec<String>>,
    consider_lut_routethru: bool,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![start.to_string()];
    let mut seen = vec![start.to_string()];
    while let Some(wire) = stack.pop() {
        record(sitewires, &wire);
        for spd in std.sitewire_site_pins(&wire) {
            if spd.dir == PinDir::Input && !out.contains(&spd.name) {
                out.push(spd.name.clone());
            }
        }
        let Some(src) = std.sitewire_source(&wire) else {
            continue;
        };
        let Some(bel) = std.bel(&src.bel) else {
            continue;
        };
        match bel.class {
            BelClass::Port => {}
            BelClass::Routing => {
                let Some(pip) = std.site_pip_on(&src.bel) else {
                    continue;
                };
                let used = used_site_pip(design, site, &src.bel);
                let follow: Vec<&str> = match (walk, used.as_deref()) {
                    (_, Some(selected)) => vec![selected],
                    (PinWalk::ExistingRouting, None) => Vec::new(),
                    (PinWalk::Potential, None) => {
                        pip.inputs.iter().map(String::as_str).collect()
                    }
                };
                for input in follow {
                    if let Some(next) = std
                        .sitewire_of(&BelPinRef::new(src.bel.clone(), input.to_string()))
                        .map(str::to_string)
                    {
                        if !seen.contains(&next) {
                            seen.push(next.clone());
                            stack.push(next);
                        }
                    }
                }
            }
            BelClass::Logic => {
                // A LUT with no cell on it can pass a signal through.
                let is_lut = src.bel.ends_with("LUT");
                let occupied = design.sites.get(site).cells.contains_key(&src.bel);
                if walk == PinWalk::Potential && consider_lut_routethru && is_lut && !occupied {
                    for pin in &bel.pins {
                        if pin.dir == PinDir::Input && !seen.contains(&pin.sitewire) {
                            seen.push(pin.sitewire.clone());
                            stack.push(pin.sitewire.clone());
                        }
                    }
                }
            }
        }
    }
    out
}

/// Walks from a source BEL pin toward the site boundary, with the signal
/// direction.
fn walk_downstream(
    design: &Design,
    std: &SiteTypeDef,
    site: SiteInstId,
    start: &str,
    walk: PinWalk,
    sitewires: &mut Option<&mut Vec<String>>,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![start.to_string()];
    let mut seen = vec![start.to_string()];
    while let Some(wire) = stack.pop() {
        record(sitewires, &wire);
        for spd in std.sitewire_site_pins(&wire) {
            if spd.dir == PinDir::Output && !out.contains(&spd.name) {
                out.push(spd.name.clone());
            }
        }
        for pin in std.sitewire_bel_pins(&wire) {
            let Some(bel) = std.bel(&pin.bel) else {
                continue;
            };
            if bel.class != BelClass::Routing || std.bel_pin_dir(&pin) != Some(PinDir::Input) {
                continue;
            }
            let Some(pip) = std.site_pip_on(&pin.bel) else {
                continue;
            };
            if !pip.inputs.contains(&pin.pin) {
                continue;
            }
            let crossable = match used_site_pip(design, site, &pin.bel) {
                Some(selected) => selected == pin.pin,
                None => walk == PinWalk::Potential,
            };
            if !crossable {
                continue;
            }
            if let Some(next) = std
                .sitewire_of(&BelPinRef::new(pip.bel.clone(), pip.output.clone()))
                .map(str::to_string)
            {
                if !seen.contains(&next) {
                    seen.push(next.clone());
                    stack.push(next);
                }
            }
        }
    }
    out
}
