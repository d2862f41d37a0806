//! Design-level tools shared by the router and the ECO operators.
//!
//! The central convention here is the *deferred-removals* map: operators
//! that want site pins gone record them per physical net instead of
//! removing them eagerly, so that repeated mutations stay cheap and a
//! later connect can reuse a pin instead of recreating it. The batch is
//! applied with [`process_deferred_removals`].

use crate::cell::{corresponding_site_pin_names, logical_pin_of_bel_pin, PinWalk};
use crate::design::Design;
use crate::ids::{PhysCellId, PhysNetId, SitePinId};
use crate::site::{route_intra_site_net, used_site_pip};
use fabric_device::{BelClass, BelPinRef, DeviceGraph};
use std::collections::{BTreeMap, BTreeSet};

/// Site pins marked for removal, batched per physical net.
///
/// Ordered maps keep batch application deterministic.
pub type DeferredRemovals = BTreeMap<PhysNetId, BTreeSet<SitePinId>>;

/// Records a pin for deferred removal under its current net.
pub fn handle_pin_removals(design: &Design, deferred: &mut DeferredRemovals, pin: SitePinId) {
    if let Some(net) = design.pins.get(pin).net {
        deferred.entry(net).or_default().insert(pin);
    }
}

/// Applies a deferred-removals batch: detaches each pin from its net and
/// site, releases its sitewire, and fully unroutes nets left load-less
/// with stale PIPs.
pub fn process_deferred_removals(
    design: &mut Design,
    device: &dyn DeviceGraph,
    deferred: &mut DeferredRemovals,
) {
    let batch = std::mem::take(deferred);
    for (net, pins) in batch {
        for pin in pins {
            let (site, name) = {
                let p = design.pins.get(pin);
                (p.site, p.name.clone())
            };
            design.detach_pin(net, pin, true);
            if let Some(site) = site {
                if let Some(std) = device.site_type(&design.sites.get(site).site_type) {
                    if let Some(spd) = std.site_pin(&name) {
                        let wire = spd.sitewire.clone();
                        design.sites.get_mut(site).sitewire_nets.remove(&wire);
                    }
                }
            }
            design.remove_pin_from_site(pin);
        }
        if design.is_load_less(net) && design.nets.get(net).has_pips() {
            design.unroute_net(net);
        }
    }
}

/// Finds the logic BEL pin that ultimately drives a source site pin,
/// following configured site PIPs backwards.
pub fn driving_bel_pin(
    design: &Design,
    device: &dyn DeviceGraph,
    source: SitePinId,
) -> Option<(PhysCellId, BelPinRef)> {
    let spi = design.pins.get(source);
    let site = spi.site?;
    let inst = design.sites.get(site);
    let std = device.site_type(&inst.site_type)?;
    let mut wire = std.site_pin(&spi.name)?.sitewire.clone();
    loop {
        let src = std.sitewire_source(&wire)?;
        let bel = std.bel(&src.bel)?;
        match bel.class {
            BelClass::Logic => {
                let cell = *inst.cells.get(&src.bel)?;
                return Some((cell, src));
            }
            BelClass::Routing => {
                let selected = used_site_pip(design, site, &src.bel)?;
                wire = std
                    .sitewire_of(&BelPinRef::new(src.bel.clone(), selected))?
                    .to_string();
            }
            BelClass::Port => return None,
        }
    }
}

/// Finds a legal alternative output site pin for a net's source (e.g. the
/// `?MUX` pin when `?_O` is blocked, or vice versa).
///
/// Returns `None` when the driver has no second exit or every alternative
/// is occupied.
pub fn legal_alternative_output_pin(
    design: &Design,
    device: &dyn DeviceGraph,
    net: PhysNetId,
) -> Option<String> {
    let source = design.nets.get(net).source?;
    let site = design.pins.get(source).site?;
    let current = design.pins.get(source).name.clone();
    let (cell, bel_pin) = driving_bel_pin(design, device, source)?;
    let logical_pin = logical_pin_of_bel_pin(design, cell, &bel_pin.pin)?;
    let candidates = corresponding_site_pin_names(
        design,
        device,
        cell,
        &logical_pin,
        PinWalk::Potential,
        None,
        false,
    );
    let inst = design.sites.get(site);
    let std = device.site_type(&inst.site_type)?;
    candidates.into_iter().find(|name| {
        if *name == current || design.site_pin(site, name).is_some() {
            return false;
        }
        // The exit sitewire must be idle or already carrying this net.
        match std.site_pin(name) {
            Some(spd) => match inst.sitewire_nets.get(&spd.sitewire) {
                None => true,
                Some(&occupant) => occupant == net,
            },
            None => false,
        }
    })
}

/// Creates the alternative output pin instance and routes the driver out
/// to it inside the site.
pub fn route_alternative_output_site_pin(
    design: &mut Design,
    device: &dyn DeviceGraph,
    net: PhysNetId,
    alt_name: &str,
) -> Option<SitePinId> {
    let source = design.nets.get(net).source?;
    let site = design.pins.get(source).site?;
    let (_, bel_pin) = driving_bel_pin(design, device, source)?;
    let alt = design.create_pin(net, site, alt_name, true);
    let std = device.site_type(&design.sites.get(site).site_type)?;
    let alt_bel = std.site_pin_bel(alt_name)?;
    if !route_intra_site_net(design, device, site, net, &bel_pin, &alt_bel) {
        return None;
    }
    Some(alt)
}

/// Swaps a net's source and alternate-source pins.
pub fn swap_source(design: &mut Design, net: PhysNetId) {
    let n = design.nets.get_mut(net);
    std::mem::swap(&mut n.source, &mut n.alt_source);
}

/// Unplaces a physical cell: defers removal of every site pin mapped from
/// its logical pins, releases its BEL pin sitewires, and clears the
/// placement.
pub fn fully_unplace_cell(
    design: &mut Design,
    device: &dyn DeviceGraph,
    cell: PhysCellId,
    deferred: &mut DeferredRemovals,
) {
    let mut logical_pins: Vec<String> =
        design.cells.get(cell).pin_map.keys().cloned().collect();
    logical_pins.sort();
    for pin in &logical_pins {
        for spi in crate::cell::all_site_pins_from_logical_pin(design, device, cell, pin) {
            handle_pin_removals(design, deferred, spi);
        }
    }

    let (site, bel) = {
        let c = design.cells.get(cell);
        (c.site, c.bel.clone())
    };
    if let (Some(site), Some(bel)) = (site, bel) {
        if let Some(std) = device.site_type(&design.sites.get(site).site_type) {
            let wires: Vec<String> = std
                .bel(&bel)
                .map(|b| b.pins.iter().map(|p| p.sitewire.clone()).collect())
                .unwrap_or_default();
            let inst = design.sites.get_mut(site);
            for wire in wires {
                inst.sitewire_nets.remove(&wire);
            }
        }
        design.sites.get_mut(site).cells.remove(&bel);
    }
    let c = design.cells.get_mut(cell);
    c.site = None;
    c.bel = None;
}

/// Moves GND sinks that land on invertible BEL pins over to the VCC net.
///
/// Returns the number of pins moved. Which pins are invertible is device
/// knowledge ([`DeviceGraph::is_invertible_pin`]).
pub fn invert_gnd_pins_to_vcc(design: &mut Design, device: &dyn DeviceGraph) -> usize {
    let Some(gnd) = design.net_named(crate::design::GND_NET) else {
        return 0;
    };
    let vcc = design.vcc_net();
    let mut moved = 0;
    for pin in design.sink_pins(gnd) {
        let Some(site) = design.pins.get(pin).site else {
            continue;
        };
        let site_type = design.sites.get(site).site_type.clone();
        let pin_name = design.pins.get(pin).name.clone();
        if device.is_invertible_pin(&site_type, &pin_name) {
            design.detach_pin(gnd, pin, true);
            design.attach_pin(vcc, pin);
            moved += 1;
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::PhysCell;
    use fabric_device::MeshDevice;

    fn lut_with_output(design: &mut Design, device: &MeshDevice) -> (PhysNetId, PhysCellId) {
        let site = design.create_site("SLICE_X0Y0", "SLICE");
        let mut cell = PhysCell::new("drv");
        cell.site = Some(site);
        cell.bel = Some("E6LUT".into());
        cell.pin_map.insert("O".into(), vec!["O6".into()]);
        cell.pin_map.insert("I0".into(), vec!["A1".into()]);
        let cell = design.add_cell(cell);
        design.sites.get_mut(site).cells.insert("E6LUT".into(), cell);

        let net = design.create_net("sig");
        design.create_pin(net, site, "E_O", true);
        let o6 = BelPinRef::new("E6LUT", "O6");
        let exit = device
            .site_type("SLICE")
            .unwrap()
            .site_pin_bel("E_O")
            .unwrap();
        assert!(route_intra_site_net(design, device, site, net, &o6, &exit));
        (net, cell)
    }

    #[test]
    fn deferred_removal_batches_by_net() {
        let mut design = Design::new("d");
        let net = design.create_net("sig");
        let site = design.create_site("SLICE_X0Y0", "SLICE");
        let pin = design.create_pin(net, site, "E1", false);
        let mut deferred = DeferredRemovals::new();
        handle_pin_removals(&design, &mut deferred, pin);
        assert_eq!(deferred.len(), 1);
        assert!(deferred.get(&net).unwrap().contains(&pin));
    }

    #[test]
    fn process_removals_detaches_everything() {
        let mut design = Design::new("d");
        let device = MeshDevice::new(2, 2);
        let net = design.create_net("sig");
        let site = design.create_site("SLICE_X0Y0", "SLICE");
        let pin = design.create_pin(net, site, "E1", false);
        let mut deferred = DeferredRemovals::new();
        handle_pin_removals(&design, &mut deferred, pin);
        process_deferred_removals(&mut design, &device, &mut deferred);
        assert!(deferred.is_empty());
        assert!(design.pins.get(pin).net.is_none());
        assert!(design.pins.get(pin).site.is_none());
        assert!(design.site_pin(site, "E1").is_none());
    }

    #[test]
    fn driving_bel_pin_through_direct_exit() {
        let mut design = Design::new("d");
        let device = MeshDevice::new(2, 2);
        let (net, cell) = lut_with_output(&mut design, &device);
        let source = design.nets.get(net).source.unwrap();
        let (found_cell, bel_pin) = driving_bel_pin(&design, &device, source).unwrap();
        assert_eq!(found_cell, cell);
        assert_eq!(bel_pin, BelPinRef::new("E6LUT", "O6"));
    }

    #[test]
    fn alternative_output_is_the_mux_pin() {
        let mut design = Design::new("d");
        let device = MeshDevice::new(2, 2);
        let (net, _) = lut_with_output(&mut design, &device);
        let alt = legal_alternative_output_pin(&design, &device, net);
        assert_eq!(alt.as_deref(), Some("EMUX"));

        let alt_pin = route_alternative_output_site_pin(&mut design, &device, net, "EMUX").unwrap();
        assert_eq!(design.nets.get(net).alt_source, Some(alt_pin));
        swap_source(&mut design, net);
        assert_eq!(design.nets.get(net).source, Some(alt_pin));
    }

    #[test]
    fn no_alternative_when_mux_taken() {
        let mut design = Design::new("d");
        let device = MeshDevice::new(2, 2);
        let (net, _) = lut_with_output(&mut design, &device);
        // Claim EMUX's sitewire for another net.
        let other = design.create_net("other");
        let site = design.site_named("SLICE_X0Y0").unwrap();
        design
            .sites
            .get_mut(site)
            .sitewire_nets
            .insert("EMUX".into(), other);
        assert!(legal_alternative_output_pin(&design, &device, net).is_none());
    }

    #[test]
    fn unplace_cell_defers_its_pins() {
        let mut design = Design::new("d");
        let device = MeshDevice::new(2, 2);
        let (net, cell) = lut_with_output(&mut design, &device);
        let mut deferred = DeferredRemovals::new();
        fully_unplace_cell(&mut design, &device, cell, &mut deferred);
        assert!(!design.cells.get(cell).is_placed());
        assert_eq!(deferred.get(&net).map(|s| s.len()), Some(1));
    }

    #[test]
    fn gnd_inversion_respects_device() {
        // A wrapper device that declares E1 invertible.
        struct Dev(MeshDevice);
        impl DeviceGraph for Dev {
            fn node_count(&self) -> usize {
                self.0.node_count()
            }
            fn uphill_nodes(&self, n: fabric_device::NodeId) -> Vec<fabric_device::NodeId> {
                self.0.uphill_nodes(n)
            }
            fn downhill_nodes(&self, n: fabric_device::NodeId) -> Vec<fabric_device::NodeId> {
                self.0.downhill_nodes(n)
            }
            fn pip_between(
                &self,
                a: fabric_device::NodeId,
                b: fabric_device::NodeId,
            ) -> Option<fabric_device::Pip> {
                self.0.pip_between(a, b)
            }
            fn intent_code(&self, n: fabric_device::NodeId) -> fabric_device::IntentCode {
                self.0.intent_code(n)
            }
            fn length_of(&self, n: fabric_device::NodeId) -> u16 {
                self.0.length_of(n)
            }
            fn tile_xy(&self, n: fabric_device::NodeId) -> (i16, i16) {
                self.0.tile_xy(n)
            }
            fn is_int_tile(&self, n: fabric_device::NodeId) -> bool {
                self.0.is_int_tile(n)
            }
            fn is_route_thru(&self, a: fabric_device::NodeId, b: fabric_device::NodeId) -> bool {
                self.0.is_route_thru(a, b)
            }
            fn node_name(&self, n: fabric_device::NodeId) -> String {
                self.0.node_name(n)
            }
            fn site_type(&self, name: &str) -> Option<&fabric_device::SiteTypeDef> {
                self.0.site_type(name)
            }
            fn site_pin_node(&self, site: &str, pin: &str) -> Option<fabric_device::NodeId> {
                self.0.site_pin_node(site, pin)
            }
            fn is_invertible_pin(&self, _site_type: &str, site_pin: &str) -> bool {
                site_pin == "E1"
            }
        }

        let mut design = Design::new("d");
        let device = Dev(MeshDevice::new(2, 2));
        let gnd = design.gnd_net();
        let site = design.create_site("SLICE_X0Y0", "SLICE");
        let inv = design.create_pin(gnd, site, "E1", false);
        let keep = design.create_pin(gnd, site, "E2", false);
        assert_eq!(invert_gnd_pins_to_vcc(&mut design, &device), 1);
        let vcc = design.vcc_net();
        assert_eq!(design.pins.get(inv).net, Some(vcc));
        assert_eq!(design.pins.get(keep).net, Some(gnd));
    }
}
