//! Synthesizing site pin instances for pins without one.

use crate::error::{EcoError, EcoResult};
use fabric_design::{
    cell::{self, PinWalk},
    site, Design, PhysNetId, PinRef, PortDir, SitePinId,
};
use fabric_device::{BelClass, BelPinRef, DeviceGraph};

/// Creates a site pin instance servicing a hierarchical leaf pin and
/// routes the intra-site leg, for sources and sinks alike.
pub fn create_exit_site_pin(
    design: &mut Design,
    device: &dyn DeviceGraph,
    pin: PinRef,
    net: PhysNetId,
) -> EcoResult<SitePinId> {
    if design.netlist.dir_of(pin) == PortDir::Output {
        return route_out_site_pin_source(design, device, pin, net);
    }
    let pin_name = design.netlist.full_pin_name(pin);
    let phys_cell = design
        .cell_named(&design.netlist.full_cell_name(pin.cell))
        .ok_or_else(|| EcoError::MissingPhysicalCell(pin_name.clone()))?;
    let site_inst = design
        .cells
        .get(phys_cell)
        .site
        .ok_or_else(|| EcoError::Structural(format!("cell of pin '{pin_name}' is unplaced")))?;
    let logical_pin = design.netlist.port(pin).name.clone();
    let cell_bp = cell::cell_bel_pin(design, phys_cell, &logical_pin)
        .ok_or_else(|| EcoError::Structural(format!("pin '{pin_name}' has no BEL pin mapping")))?;

    let mut sitewires = Vec::new();
    let mut candidates = cell::corresponding_site_pin_names(
        design,
        device,
        phys_cell,
        &logical_pin,
        PinWalk::Potential,
        Some(&mut sitewires),
        true,
    );
    if candidates.is_empty() {
        // Following existing intra-site wires did not reach a site pin
        // (e.g. the BEL pin is currently driven by a LUT). Unroute the
        // first reconfigurable BEL upstream, preserving the net on its
        // input sitewire, and try again.
        let std = device
            .site_type(&design.sites.get(site_inst).site_type)
            .ok_or_else(|| EcoError::Structural("unknown site type".into()))?;
        let mut unrouted = false;
        for wire in &sitewires {
            let Some(src) = std.sitewire_source(wire) else {
                continue;
            };
            let Some(bel) = std.bel(&src.bel) else { continue };
            if bel.class != BelClass::Routing {
                continue;
            }
            let Some(selected) = site::used_site_pip(design, site_inst, &src.bel) else {
                continue;
            };
            let input_bp = BelPinRef::new(src.bel.clone(), selected);
            let input_wire = std
                .sitewire_of(&input_bp)
                .map(str::to_string)
                .ok_or_else(|| EcoError::Structural("site PIP input has no sitewire".into()))?;
            // The unroute rips the input sitewire too; remember its net.
            let input_net = site::net_from_sitewire(design, site_inst, &input_wire);
            if !site::unroute_intra_site_net(design, device, site_inst, &input_bp, &cell_bp) {
                return Err(EcoError::IntraSiteUnroute(format!(
                    "{}/{input_bp} to {cell_bp}",
                    design.sites.get(site_inst).name
                )));
            }
            if let Some(input_net) = input_net {
                site::route_intra_site_net(
                    design, device, site_inst, input_net, &input_bp, &input_bp,
                );
            }
            unrouted = true;
            break;
        }
        if unrouted {
            candidates = cell::corresponding_site_pin_names(
                design,
                device,
                phys_cell,
                &logical_pin,
                PinWalk::Potential,
                None,
                true,
            );
        }
    }

    // Choose the first candidate whose sitewire is currently idle.
    let std = device
        .site_type(&design.sites.get(site_inst).site_type)
        .ok_or_else(|| EcoError::Structural("unknown site type".into()))?;
    let mut chosen = None;
    for name in candidates {
        let Some(spd) = std.site_pin(&name) else { continue };
        if design.site_pin(site_inst, &name).is_some() {
            continue;
        }
        if site::net_from_sitewire(design, site_inst, &spd.sitewire).is_none() {
            chosen = Some(name);
            break;
        }
    }
    let name = chosen.ok_or_else(|| EcoError::NoSiteExit(pin_name.clone()))?;
    let spi = design.create_pin(net, site_inst, name.clone(), false);

    let spi_bel = std
        .site_pin_bel(&name)
        .ok_or_else(|| EcoError::Structural("site pin has no port BEL".into()))?;
    // Rip whatever stale routing sits between the pin and the BEL pin,
    // then claim it for the new net.
    site::unroute_intra_site_net(design, device, site_inst, &spi_bel, &cell_bp);
    if !site::route_intra_site_net(design, device, site_inst, net, &spi_bel, &cell_bp) {
        return Err(EcoError::IntraSiteRoute(format!(
            "{}/{spi_bel} to {cell_bp}",
            design.sites.get(site_inst).name
        )));
    }
    Ok(spi)
}

/// Creates a site pin source for the physical net by routing an internal
/// output pin out to a site pin output.
///
/// The special case: a LUT5's O5 whose only exit (`?MUX`) is occupied by
/// the O6 path gets it back by moving the O6 consumer onto the dedicated
/// `?_O` pin and reconfiguring the output mux to select O5.
pub fn route_out_site_pin_source(
    design: &mut Design,
    device: &dyn DeviceGraph,
    pin: PinRef,
    net: PhysNetId,
) -> EcoResult<SitePinId> {
    let pin_name = design.netlist.full_pin_name(pin);
    let phys_cell = design
        .cell_named(&design.netlist.full_cell_name(pin.cell))
        .ok_or_else(|| EcoError::MissingPhysicalCell(pin_name.clone()))?;
    let site_inst = design
        .cells
        .get(phys_cell)
        .site
        .ok_or_else(|| EcoError::Structural(format!("cell of pin '{pin_name}' is unplaced")))?;
    let logical_pin = design.netlist.port(pin).name.clone();
    let output_bp = cell::cell_bel_pin(design, phys_cell, &logical_pin)
        .ok_or_else(|| EcoError::Structural(format!("pin '{pin_name}' has no BEL pin mapping")))?;

    // Find the first available corresponding site pin (e.g. between ?_O
    // and ?MUX).
    let candidates = cell::corresponding_site_pin_names(
        design,
        device,
        phys_cell,
        &logical_pin,
        PinWalk::Potential,
        None,
        false,
    );
    let mut site_pin_name = candidates
        .iter()
        .find(|name| design.site_pin(site_inst, name).is_none())
        .cloned();

    if site_pin_name.is_none() {
        if output_bp.pin == "O5" && candidates.is_empty() {
            site_pin_name = Some(free_o5_exit(design, device, site_inst, &output_bp, net)?);
        } else {
            return Err(EcoError::NoSiteExit(pin_name));
        }
    }
    let name = site_pin_name.expect("exit pin resolved above");

    let spi = design.create_pin(net, site_inst, name.clone(), true);
    let std = device
        .site_type(&design.sites.get(site_inst).site_type)
        .ok_or_else(|| EcoError::Structural("unknown site type".into()))?;
    let spi_bel = std
        .site_pin_bel(&name)
        .ok_or_else(|| EcoError::Structural("site pin has no port BEL".into()))?;
    if !site::route_intra_site_net(design, device, site_inst, net, &output_bp, &spi_bel) {
        return Err(EcoError::IntraSiteRoute(format!(
            "{}/{output_bp} to {spi_bel}",
            design.sites.get(site_inst).name
        )));
    }
    Ok(spi)
}

/// The O5-blocked-by-O6 case: unroutes the OUTMUX site PIP, moves the O6
/// consumer from `?MUX` to `?_O`, reconfigures OUTMUX to select O5, and
/// returns the freed `?MUX` pin name.
fn free_o5_exit(
    design: &mut Design,
    device: &dyn DeviceGraph,
    site_inst: fabric_design::SiteInstId,
    output_bp: &BelPinRef,
    net: PhysNetId,
) -> EcoResult<String> {
    let letter = output_bp
        .bel
        .chars()
        .next()
        .ok_or_else(|| EcoError::Structural("empty BEL name".into()))?;
    let rbel = format!("OUTMUX{letter}");
    let selected = site::used_site_pip(design, site_inst, &rbel)
        .ok_or_else(|| EcoError::Structural(format!("{rbel} is not blocking the O5 exit")))?;
    if selected != "D6" {
        return Err(EcoError::Structural(format!(
            "{rbel} selects {selected}, expected the O6 path"
        )));
    }

    // Remove the OUTMUX site PIP from the O6 path.
    let in_bp = BelPinRef::new(rbel.clone(), "D6");
    let out_bp = BelPinRef::new(rbel.clone(), "OUT");
    if !site::unroute_intra_site_net(design, device, site_inst, &in_bp, &out_bp) {
        return Err(EcoError::IntraSiteUnroute(format!(
            "{}/{in_bp} to {out_bp}",
            design.sites.get(site_inst).name
        )));
    }

    // Move the O6 consumer from ?MUX to ?_O.
    let mux_name = format!("{letter}MUX");
    let mut lut6_net = None;
    if let Some(mux_spi) = design.site_pin(site_inst, &mux_name) {
        lut6_net = design.pins.get(mux_spi).net;
        if let Some(old) = lut6_net {
            design.detach_pin(old, mux_spi, true);
        }
        design.remove_pin_from_site(mux_spi);
    }
    let main_name = format!("{letter}_O");
    match design.site_pin(site_inst, &main_name) {
        Some(main_spi) => {
            let main_net = design.pins.get(main_spi).net;
            match (lut6_net, main_net) {
                (Some(a), Some(b)) if a != b => {
                    return Err(EcoError::Structural(format!(
                        "{main_name} and {mux_name} carry different nets"
                    )));
                }
                (None, Some(b)) => lut6_net = Some(b),
                _ => {}
            }
            // The unroute above ripped the ?_O sitewire (the site PIP
            // input); restore it for the O6 net.
            if let Some(lut6_net) = lut6_net {
                site::route_intra_site_net(design, device, site_inst, lut6_net, &in_bp, &in_bp);
            }
        }
        None => {
            if let Some(lut6_net) = lut6_net {
                design.create_pin(lut6_net, site_inst, main_name, true);
                site::route_intra_site_net(design, device, site_inst, lut6_net, &in_bp, &in_bp);
            }
        }
    }

    // Reconfigure OUTMUX to select O5.
    let d5_bp = BelPinRef::new(rbel, "D5");
    if !site::route_intra_site_net(design, device, site_inst, net, &d5_bp, &out_bp) {
        return Err(EcoError::IntraSiteRoute(format!(
            "{}/{d5_bp} to {out_bp}",
            design.sites.get(site_inst).name
        )));
    }
    Ok(mux_name)
}
