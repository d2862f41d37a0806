//! Connecting hierarchical pins to nets, keeping the physical state
//! coherent.

use crate::error::{EcoError, EcoResult};
use crate::site_pins::create_exit_site_pin;
use crate::EcoOptions;
use fabric_design::{
    cell, netlist::connect_thru_hier, site, tools, DeferredRemovals, Design, NetKey, NetType,
    PhysCellId, PhysNetId, PinRef, PortDir, SitePinId,
};
use fabric_device::{BelPinRef, DeviceGraph};
use fabric_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use std::collections::HashSet;

/// Connects pins (hierarchical paths) to nets (hierarchical paths).
pub fn connect_net_paths(
    design: &mut Design,
    device: &dyn DeviceGraph,
    entries: &[(&str, Vec<&str>)],
    deferred: &mut DeferredRemovals,
    options: &EcoOptions,
    sink: &DiagnosticSink,
) -> EcoResult<()> {
    let mut resolved = Vec::with_capacity(entries.len());
    for (net_path, pin_paths) in entries {
        let net = design
            .netlist
            .find_net(net_path)
            .ok_or_else(|| EcoError::NetNotFound(net_path.to_string()))?;
        let mut pins = Vec::with_capacity(pin_paths.len());
        for pin_path in pin_paths {
            let pin = design
                .netlist
                .find_pin(pin_path)
                .ok_or_else(|| EcoError::PinNotFound(pin_path.to_string()))?;
            pins.push(pin);
        }
        resolved.push((net, pins));
    }
    connect_net(design, device, &resolved, deferred, options, sink)
}

/// Connects the given pins to the given nets.
///
/// At most one output pin may be requested per net; it becomes the net's
/// new source, demoting (with a warning) any existing one. Input pins are
/// stitched through the hierarchy where needed, and the whole net's
/// physical view is then reconciled: existing site pins are re-homed onto
/// the resolved physical net and missing ones are synthesized.
pub fn connect_net(
    design: &mut Design,
    device: &dyn DeviceGraph,
    net_to_pins: &[(NetKey, Vec<PinRef>)],
    deferred: &mut DeferredRemovals,
    options: &EcoOptions,
    sink: &DiagnosticSink,
) -> EcoResult<()> {
    // Partition the requested pins into at most one source per net plus
    // the sinks.
    let mut net_to_source: Vec<(NetKey, PinRef)> = Vec::new();
    let mut net_to_sinks: Vec<(NetKey, Vec<PinRef>)> = Vec::new();
    for (net, pins) in net_to_pins {
        let mut sinks = Vec::new();
        for &pin in pins {
            if design.netlist.dir_of(pin) == PortDir::Output {
                if net_to_source.iter().any(|(n, _)| n == net) {
                    return Err(EcoError::MultipleSources(
                        design.netlist.full_net_name(*net),
                    ));
                }
                net_to_source.push((*net, pin));
            } else {
                sinks.push(pin);
            }
        }
        net_to_sinks.push((*net, sinks));
    }

    if !net_to_source.is_empty() {
        connect_net_source(design, device, &net_to_source, deferred, sink)?;
    }

    // Modify the logical netlist.
    for (net, pins) in &net_to_sinks {
        for &pin in pins {
            attach_logical(design, *net, pin);
        }
    }

    // Reconcile the physical netlist, net by net.
    for (net, _) in &net_to_sinks {
        reconcile_net(design, device, *net, deferred, options, sink)?;
    }
    Ok(())
}

/// Attaches a pin to a net on the logical side, materializing hierarchy
/// ports when the pin lives elsewhere.
fn attach_logical(design: &mut Design, net: NetKey, pin: PinRef) {
    let direct = pin.cell == net.cell
        || design.netlist.cells.get(pin.cell).parent == Some(net.cell);
    if direct {
        if !design.netlist.net(net).pins.contains(&pin) {
            design.netlist.add_pin_to_net(net, pin);
        }
    } else {
        // A unique base name avoids collisions with bus nets, which are
        // only represented by their individual bit nets.
        let suffix = design.netlist.unique_suffix();
        let base = format!("{}{}", design.netlist.net(net).name, suffix);
        connect_thru_hier(&mut design.netlist, net, pin, &base);
    }
}

/// The resolved physical context of one net during connect.
struct PhysContext {
    new_phys: PhysNetId,
    source_site: Option<fabric_design::SiteInstId>,
    source_bel_pin: Option<BelPinRef>,
}

/// Locates or materializes the physical net for a logical net and, for
/// static nets, migrates the previously named physical net out of the
/// way.
fn resolve_physical_net(
    design: &mut Design,
    device: &dyn DeviceGraph,
    net: NetKey,
    source_pin: Option<PinRef>,
) -> EcoResult<PhysContext> {
    let mut new_phys = None;
    let mut source_site = None;
    let mut source_bel_pin = None;

    if let Some(src) = source_pin {
        let cell_name = design.netlist.full_cell_name(src.cell);
        match design.cell_named(&cell_name) {
            Some(cell_id) => {
                let cell = design.cells.get(cell_id);
                source_site = cell.site;
                let port = design.netlist.port(src).name.clone();
                source_bel_pin = cell::cell_bel_pin(design, cell_id, &port);
            }
            None => {
                let lib = design.netlist.cells.get(src.cell).lib.clone();
                new_phys = match lib.as_str() {
                    "GND" => Some(design.gnd_net()),
                    "VCC" => Some(design.vcc_net()),
                    _ => {
                        return Err(EcoError::MissingPhysicalCell(
                            design.netlist.full_pin_name(src),
                        ))
                    }
                };
            }
        }
    }

    match new_phys {
        Some(new_phys) => {
            // The logical net becomes a static net; migrate the old
            // physical net out of the way.
            let net_name = design.netlist.full_net_name(net);
            let static_type = design.nets.get(new_phys).ntype;
            if let Some(old) = design.net_named(&net_name) {
                if old != new_phys {
                    migrate_to_static(design, device, old, static_type)?;
                }
            }
            Ok(PhysContext {
                new_phys,
                source_site,
                source_bel_pin,
            })
        }
        None => {
            let parent = design.netlist.parent_net(net);
            let parent_name = design.netlist.full_net_name(parent);
            let own_name = design.netlist.full_net_name(net);
            // The parent net's physical alias wins; fall back to the
            // net's own alias, else create one.
            let mut resolved = design.net_named(&parent_name);
            if resolved.is_none() {
                resolved = design.net_named(&own_name);
            }
            let resolved = match resolved {
                Some(existing) => existing,
                None => design.create_net(parent_name),
            };
            Ok(PhysContext {
                new_phys: resolved,
                source_site,
                source_bel_pin,
            })
        }
    }
}

/// Turns a formerly ordinary physical net into a static one: propagates
/// the type, unroutes it, and retires its output pins with a USED_NET
/// block on their sitewires.
fn migrate_to_static(
    design: &mut Design,
    device: &dyn DeviceGraph,
    old: PhysNetId,
    static_type: NetType,
) -> EcoResult<()> {
    design.nets.get_mut(old).ntype = static_type;
    let used = design.used_net();
    design.unroute_net(old);
    let outputs = [design.nets.get(old).alt_source, design.nets.get(old).source];
    for spi in outputs.into_iter().flatten() {
        let Some(site_inst) = design.pins.get(spi).site else {
            continue;
        };
        let name = design.pins.get(spi).name.clone();
        let std = device
            .site_type(&design.sites.get(site_inst).site_type)
            .ok_or_else(|| EcoError::Structural("unknown site type".into()))?;
        let spi_bel = std
            .site_pin_bel(&name)
            .ok_or_else(|| EcoError::Structural("site pin has no port BEL".into()))?;
        if let Some((_, driver)) = tools::driving_bel_pin(design, device, spi) {
            site::unroute_intra_site_net(design, device, site_inst, &driver, &spi_bel);
        }
        design.detach_pin(old, spi, true);
        design.remove_pin_from_site(spi);
        // Block the output sitewire from serving as a static source.
        site::route_intra_site_net(design, device, site_inst, used, &spi_bel, &spi_bel);
    }
    Ok(())
}

/// Reconciles one net's physical state with its logical leaf pins.
fn reconcile_net(
    design: &mut Design,
    device: &dyn DeviceGraph,
    net: NetKey,
    deferred: &mut DeferredRemovals,
    options: &EcoOptions,
    sink: &DiagnosticSink,
) -> EcoResult<()> {
    let mut visited = HashSet::new();
    let leaf_pins = design.netlist.leaf_pins_of_group(net, &mut visited);

    // Find the one and only source pin.
    let mut source_pin = None;
    for &leaf in &leaf_pins {
        if design.netlist.dir_of(leaf) == PortDir::Output {
            if source_pin.is_some() {
                return Err(EcoError::MultipleSources(
                    design.netlist.full_net_name(net),
                ));
            }
            source_pin = Some(leaf);
        }
    }

    let ctx = resolve_physical_net(design, device, net, source_pin)?;

    for leaf in leaf_pins {
        if design.netlist.dir_of(leaf) == PortDir::Output {
            continue;
        }
        let cell_name = design.netlist.full_cell_name(leaf.cell);
        let Some(cell_id) = design.cell_named(&cell_name) else {
            if design.netlist.is_static_source(leaf.cell) {
                continue;
            }
            return Err(EcoError::MissingPhysicalCell(
                design.netlist.full_pin_name(leaf),
            ));
        };
        let logical_pin = design.netlist.port(leaf).name.clone();
        // Extract the site pins up front: LUT6/LUT5 pin sharing can
        // change the answer mid-mutation.
        let site_pins =
            cell::all_site_pins_from_logical_pin(design, device, cell_id, &logical_pin);
        if !site_pins.is_empty() {
            for spi in site_pins {
                rehome_sink_site_pin(
                    design, device, leaf, cell_id, &logical_pin, spi, ctx.new_phys, deferred,
                    options, sink,
                )?;
            }
        } else {
            // Source and sink in the same site: try intra-site only.
            let cell_site = design.cells.get(cell_id).site;
            if cell_site.is_some() && cell_site == ctx.source_site {
                if let (Some(site_inst), Some(source_bp)) = (cell_site, &ctx.source_bel_pin) {
                    if let Some(sink_bp) = cell::cell_bel_pin(design, cell_id, &logical_pin) {
                        if site::route_intra_site_net(
                            design,
                            device,
                            site_inst,
                            ctx.new_phys,
                            source_bp,
                            &sink_bp,
                        ) {
                            continue;
                        }
                    }
                }
            }
            if design.cells.get(cell_id).pin_map.contains_key(&logical_pin) {
                create_exit_site_pin(design, device, leaf, ctx.new_phys)?;
            }
        }
    }
    Ok(())
}

/// Moves one existing sink site pin onto the new physical net, after
/// verifying every logical pin the site pin services resolves to the same
/// parent net.
#[allow(clippy::too_many_arguments)]
fn rehome_sink_site_pin(
    design: &mut Design,
    device: &dyn DeviceGraph,
    leaf: PinRef,
    cell_id: PhysCellId,
    logical_pin: &str,
    spi: SitePinId,
    new_phys: PhysNetId,
    deferred: &mut DeferredRemovals,
    options: &EcoOptions,
    sink: &DiagnosticSink,
) -> EcoResult<()> {
    let leaf_parent = design
        .netlist
        .outer_net_key(leaf)
        .map(|key| design.netlist.parent_net(key));
    for (other_cell, other_pin) in port_insts_on_site_pin(design, device, spi) {
        let Some(other_logical) = design.cells.get(other_cell).logical else {
            continue;
        };
        let Some(port) = design.netlist.cells.get(other_logical).port_named(&other_pin) else {
            continue;
        };
        let other_ref = PinRef::new(other_logical, port);
        if other_ref == leaf {
            continue;
        }
        let other_parent = design
            .netlist
            .outer_net_key(other_ref)
            .map(|key| design.netlist.parent_net(key));
        if other_parent != leaf_parent {
            let inst_name = design.netlist.cells.get(other_logical).name.clone();
            let prefix = &options.warn_if_cell_inst_starts_with;
            let error = EcoError::SharedSitePin {
                site_pin: design.pin_display(spi),
                pin: design.netlist.full_pin_name(leaf),
                other: design.netlist.full_pin_name(other_ref),
            };
            if !prefix.is_empty() && inst_name.starts_with(prefix.as_str()) {
                sink.emit(Diagnostic::warning(
                    DiagnosticCode::new(Category::Eco, 1),
                    error.to_string(),
                ));
            } else {
                return Err(error);
            }
        }
    }

    let old_phys = design.pins.get(spi).net;
    if let Some(old) = old_phys {
        erase_deferred(deferred, old, spi);
    }
    erase_deferred(deferred, new_phys, spi);
    if old_phys == Some(new_phys) {
        return Ok(());
    }

    let site_inst = design
        .pins
        .get(spi)
        .site
        .ok_or_else(|| EcoError::Structural("detached site pin in rehome".into()))?;
    let std = device
        .site_type(&design.sites.get(site_inst).site_type)
        .ok_or_else(|| EcoError::Structural("unknown site type".into()))?;
    let spi_bel = std
        .site_pin_bel(&design.pins.get(spi).name)
        .ok_or_else(|| EcoError::Structural("site pin has no port BEL".into()))?;
    let sink_bp = cell::cell_bel_pin(design, cell_id, logical_pin).ok_or_else(|| {
        EcoError::Structural(format!("pin '{logical_pin}' has no BEL pin mapping"))
    })?;

    // Unroute the old intra-site leg and remove the pin from the old net,
    // preserving its other routes.
    if !site::unroute_intra_site_net(design, device, site_inst, &spi_bel, &sink_bp) {
        return Err(EcoError::IntraSiteUnroute(format!(
            "{}/{spi_bel} to {sink_bp}",
            design.sites.get(site_inst).name
        )));
    }
    if let Some(old) = old_phys {
        design.detach_pin(old, spi, true);
        if design.is_load_less(old) && design.nets.get(old).has_pips() {
            // A routing stub persevered with no sinks left behind it.
            design.unroute_net(old);
        }
    }

    // Re-do the intra-site routing onto the new net and add the pin.
    if !site::route_intra_site_net(design, device, site_inst, new_phys, &spi_bel, &sink_bp) {
        return Err(EcoError::IntraSiteRoute(format!(
            "{}/{spi_bel} to {sink_bp}",
            design.sites.get(site_inst).name
        )));
    }
    design.attach_pin(new_phys, spi);
    design.pins.get_mut(spi).routed = false;
    Ok(())
}

/// Installs new source pins: demotes existing sources, attaches the new
/// port instance, and re-homes or synthesizes the output site pin.
fn connect_net_source(
    design: &mut Design,
    device: &dyn DeviceGraph,
    net_to_source: &[(NetKey, PinRef)],
    deferred: &mut DeferredRemovals,
    sink: &DiagnosticSink,
) -> EcoResult<()> {
    for &(net, pin) in net_to_source {
        // Demote any existing source.
        let mut visited = HashSet::new();
        let existing: Vec<PinRef> = design
            .netlist
            .leaf_pins_of_group(net, &mut visited)
            .into_iter()
            .filter(|&leaf| design.netlist.dir_of(leaf) == PortDir::Output)
            .collect();
        for src in existing {
            sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Eco, 2),
                    format!(
                        "net '{}' already has an output pin '{}'; replacing with '{}'",
                        design.netlist.full_net_name(net),
                        design.netlist.full_pin_name(src),
                        design.netlist.full_pin_name(pin)
                    ),
                )
                .with_subject(design.netlist.full_net_name(net)),
            );
            let cell_name = design.netlist.full_cell_name(src.cell);
            let cell_id = design
                .cell_named(&cell_name)
                .ok_or_else(|| EcoError::MissingPhysicalCell(cell_name))?;
            let port = design.netlist.port(src).name.clone();
            for spi in cell::all_site_pins_from_logical_pin(design, device, cell_id, &port) {
                tools::handle_pin_removals(design, deferred, spi);
            }
            if let Some(outer) = design.netlist.outer_net_key(src) {
                design.netlist.remove_pin_from_net(outer, src);
            }
        }
        attach_logical(design, net, pin);
    }

    // Source pins changed; alias resolution must be regenerated.
    design.netlist.reset_parent_net_map();

    for &(net, source_pin) in net_to_source {
        let ctx = resolve_physical_net(design, device, net, Some(source_pin))?;
        let cell_name = design.netlist.full_cell_name(source_pin.cell);
        let Some(cell_id) = design.cell_named(&cell_name) else {
            if design.netlist.is_static_source(source_pin.cell) {
                continue;
            }
            return Err(EcoError::MissingPhysicalCell(
                design.netlist.full_pin_name(source_pin),
            ));
        };
        let logical_pin = design.netlist.port(source_pin).name.clone();
        let site_pins =
            cell::all_site_pins_from_logical_pin(design, device, cell_id, &logical_pin);

        if !site_pins.is_empty() {
            for spi in site_pins {
                debug_assert!(design.pins.get(spi).is_output);
                let old_phys = design.pins.get(spi).net;
                if old_phys == Some(ctx.new_phys) {
                    continue;
                }
                if let Some(old) = old_phys {
                    erase_deferred(deferred, old, spi);
                    fully_unroute_sources(design, device, old);
                }
                erase_source_removals(design, deferred, ctx.new_phys);
                fully_unroute_sources(design, device, ctx.new_phys);

                // Re-home the existing pin onto the new net.
                let site_inst = design
                    .cells
                    .get(cell_id)
                    .site
                    .ok_or_else(|| EcoError::Structural("source cell unplaced".into()))?;
                let name = design.pins.get(spi).name.clone();
                design.pins.get_mut(spi).site = Some(site_inst);
                design
                    .sites
                    .get_mut(site_inst)
                    .pins
                    .insert(name.clone(), spi);
                design.attach_pin(ctx.new_phys, spi);
                let std = device
                    .site_type(&design.sites.get(site_inst).site_type)
                    .ok_or_else(|| EcoError::Structural("unknown site type".into()))?;
                let spi_bel = std
                    .site_pin_bel(&name)
                    .ok_or_else(|| EcoError::Structural("site pin has no port BEL".into()))?;
                if let Some(source_bp) = &ctx.source_bel_pin {
                    site::route_intra_site_net(
                        design,
                        device,
                        site_inst,
                        ctx.new_phys,
                        source_bp,
                        &spi_bel,
                    );
                }
            }
        } else {
            erase_source_removals(design, deferred, ctx.new_phys);
            fully_unroute_sources(design, device, ctx.new_phys);
            create_exit_site_pin(design, device, source_pin, ctx.new_phys)?;
        }
    }
    Ok(())
}

/// Unroutes and detaches both source pins of a net, should they exist,
/// ripping the associated intra-site routing.
fn fully_unroute_sources(design: &mut Design, device: &dyn DeviceGraph, net: PhysNetId) {
    let outputs = [design.nets.get(net).source, design.nets.get(net).alt_source];
    for spi in outputs.into_iter().flatten() {
        if let Some(site_inst) = design.pins.get(spi).site {
            let name = design.pins.get(spi).name.clone();
            if let Some(std) = device.site_type(&design.sites.get(site_inst).site_type) {
                if let Some(spi_bel) = std.site_pin_bel(&name) {
                    if let Some((_, driver)) = tools::driving_bel_pin(design, device, spi) {
                        site::unroute_intra_site_net(design, device, site_inst, &driver, &spi_bel);
                    } else {
                        site::unroute_intra_site_net(design, device, site_inst, &spi_bel, &spi_bel);
                    }
                }
            }
        }
        design.detach_pin(net, spi, true);
        design.remove_pin_from_site(spi);
    }
}

/// Every `(cell, logical pin)` pair currently serviced by a site pin.
fn port_insts_on_site_pin(
    design: &Design,
    device: &dyn DeviceGraph,
    spi: SitePinId,
) -> Vec<(PhysCellId, String)> {
    let Some(site_inst) = design.pins.get(spi).site else {
        return Vec::new();
    };
    let mut bels: Vec<(&String, &PhysCellId)> =
        design.sites.get(site_inst).cells.iter().collect();
    bels.sort_by(|a, b| a.0.cmp(b.0));
    let mut out = Vec::new();
    for (_, &cell_id) in bels {
        let mut pins: Vec<String> = design.cells.get(cell_id).pin_map.keys().cloned().collect();
        pins.sort();
        for pin in pins {
            if cell::all_site_pins_from_logical_pin(design, device, cell_id, &pin).contains(&spi)
            {
                out.push((cell_id, pin));
            }
        }
    }
    out
}

fn erase_deferred(deferred: &mut DeferredRemovals, net: PhysNetId, spi: SitePinId) {
    if let Some(set) = deferred.get_mut(&net) {
        set.remove(&spi);
        if set.is_empty() {
            deferred.remove(&net);
        }
    }
}

/// Drops the net's own source pins from its deferred-removals entry, as
/// they are about to be rewired rather than removed.
fn erase_source_removals(design: &Design, deferred: &mut DeferredRemovals, net: PhysNetId) {
    let sources = [design.nets.get(net).source, design.nets.get(net).alt_source];
    for spi in sources.into_iter().flatten() {
        erase_deferred(deferred, net, spi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disconnect::disconnect_net_paths;
    use fabric_design::PhysCell;
    use fabric_device::MeshDevice;

    /// A driver LUT and two sink FFs on separate sites, everything placed
    /// and wired through E_I pins.
    fn fixture() -> (Design, MeshDevice) {
        let mut design = Design::new("top");
        let device = MeshDevice::new(3, 3);
        let top = design.netlist.top;

        let lut = design.netlist.create_child_cell(top, "drv", "LUT1");
        let lut_o = design.netlist.create_port(lut, "O", PortDir::Output);
        let lut_site = design.create_site("SLICE_X0Y0", "SLICE");
        let mut c = PhysCell::new("drv");
        c.logical = Some(lut);
        c.site = Some(lut_site);
        c.bel = Some("E6LUT".into());
        c.pin_map.insert("O".into(), vec!["O6".into()]);
        let c = design.add_cell(c);
        design
            .sites
            .get_mut(lut_site)
            .cells
            .insert("E6LUT".into(), c);

        for (i, site_name) in ["SLICE_X1Y0", "SLICE_X2Y0"].iter().enumerate() {
            let ff = design
                .netlist
                .create_child_cell(top, format!("ff{i}"), "FDRE");
            design.netlist.create_port(ff, "D", PortDir::Input);
            let ff_site = design.create_site(*site_name, "SLICE");
            let mut c = PhysCell::new(format!("ff{i}"));
            c.logical = Some(ff);
            c.site = Some(ff_site);
            c.bel = Some("EFF".into());
            c.pin_map.insert("D".into(), vec!["D".into()]);
            let c = design.add_cell(c);
            design
                .sites
                .get_mut(ff_site)
                .cells
                .insert("EFF".into(), c);
        }

        // Logical net "sig" drives ff0; physically routed through E_O and
        // ff0's E_I.
        let key = design.netlist.create_net_in(top, "sig");
        design.netlist.add_pin_to_net(key, PinRef::new(lut, lut_o));
        let ff0 = design.netlist.find_cell("ff0").unwrap();
        let ff0_d = design.netlist.cells.get(ff0).port_named("D").unwrap();
        design.netlist.add_pin_to_net(key, PinRef::new(ff0, ff0_d));

        let phys = design.create_net("sig");
        design.create_pin(phys, lut_site, "E_O", true);
        let o6 = BelPinRef::new("E6LUT", "O6");
        let std = device.site_type("SLICE").unwrap();
        let e_o = std.site_pin_bel("E_O").unwrap();
        assert!(site::route_intra_site_net(
            &mut design,
            &device,
            lut_site,
            phys,
            &o6,
            &e_o
        ));
        let ff0_site = design.site_named("SLICE_X1Y0").unwrap();
        design.create_pin(phys, ff0_site, "E_I", false);
        let byp = std.site_pin_bel("E_I").unwrap();
        let ff_d = BelPinRef::new("EFF", "D");
        assert!(site::route_intra_site_net(
            &mut design,
            &device,
            ff0_site,
            phys,
            &byp,
            &ff_d
        ));
        (design, device)
    }

    #[test]
    fn connect_new_sink_synthesizes_site_pin() {
        let (mut design, device) = fixture();
        let sink = DiagnosticSink::new();
        let mut deferred = DeferredRemovals::new();
        connect_net_paths(
            &mut design,
            &device,
            &[("sig", vec!["ff1/D"])],
            &mut deferred,
            &EcoOptions::default(),
            &sink,
        )
        .unwrap();

        // Logical: ff1/D joined the net.
        let key = design.netlist.find_net("sig").unwrap();
        let mut visited = HashSet::new();
        let leaves = design.netlist.leaf_pins_of_group(key, &mut visited);
        assert_eq!(leaves.len(), 3);

        // Physical: a new E_I pin on ff1's site, on the same net.
        let phys = design.net_named("sig").unwrap();
        let ff1_site = design.site_named("SLICE_X2Y0").unwrap();
        let spi = design.site_pin(ff1_site, "E_I").unwrap();
        assert_eq!(design.pins.get(spi).net, Some(phys));
        assert!(!design.pins.get(spi).routed);
        assert!(deferred.is_empty());
    }

    #[test]
    fn disconnect_then_connect_restores_leaf_set() {
        let (mut design, device) = fixture();
        let key = design.netlist.find_net("sig").unwrap();
        let mut visited = HashSet::new();
        let mut before: Vec<String> = design
            .netlist
            .leaf_pins_of_group(key, &mut visited)
            .into_iter()
            .map(|p| design.netlist.full_pin_name(p))
            .collect();
        before.sort();

        let sink = DiagnosticSink::new();
        let mut deferred = DeferredRemovals::new();
        disconnect_net_paths(&mut design, &device, &["ff0/D"], &mut deferred).unwrap();
        connect_net_paths(
            &mut design,
            &device,
            &[("sig", vec!["ff0/D"])],
            &mut deferred,
            &EcoOptions::default(),
            &sink,
        )
        .unwrap();

        let mut visited = HashSet::new();
        let mut after: Vec<String> = design
            .netlist
            .leaf_pins_of_group(key, &mut visited)
            .into_iter()
            .map(|p| design.netlist.full_pin_name(p))
            .collect();
        after.sort();
        assert_eq!(before, after);
        // The deferred pin was reused rather than removed.
        assert!(deferred.is_empty());
        let ff0_site = design.site_named("SLICE_X1Y0").unwrap();
        assert!(design.site_pin(ff0_site, "E_I").is_some());
    }

    #[test]
    fn moving_sink_to_new_net_rehomes_site_pin() {
        let (mut design, device) = fixture();
        // A second driver on the D letter of the lut site.
        let top = design.netlist.top;
        let lut2 = design.netlist.create_child_cell(top, "drv2", "LUT1");
        let lut2_o = design.netlist.create_port(lut2, "O", PortDir::Output);
        let lut_site = design.site_named("SLICE_X0Y0").unwrap();
        let mut c = PhysCell::new("drv2");
        c.logical = Some(lut2);
        c.site = Some(lut_site);
        c.bel = Some("D6LUT".into());
        c.pin_map.insert("O".into(), vec!["O6".into()]);
        let c = design.add_cell(c);
        design
            .sites
            .get_mut(lut_site)
            .cells
            .insert("D6LUT".into(), c);
        let key2 = design.netlist.create_net_in(top, "sig2");
        design
            .netlist
            .add_pin_to_net(key2, PinRef::new(lut2, lut2_o));
        let phys2 = design.create_net("sig2");
        design.create_pin(phys2, lut_site, "D_O", true);
        let o6 = BelPinRef::new("D6LUT", "O6");
        let d_o = device
            .site_type("SLICE")
            .unwrap()
            .site_pin_bel("D_O")
            .unwrap();
        assert!(site::route_intra_site_net(
            &mut design,
            &device,
            lut_site,
            phys2,
            &o6,
            &d_o
        ));

        // Move ff0/D from "sig" to "sig2".
        let sink = DiagnosticSink::new();
        let mut deferred = DeferredRemovals::new();
        disconnect_net_paths(&mut design, &device, &["ff0/D"], &mut deferred).unwrap();
        connect_net_paths(
            &mut design,
            &device,
            &[("sig2", vec!["ff0/D"])],
            &mut deferred,
            &EcoOptions::default(),
            &sink,
        )
        .unwrap();

        let ff0_site = design.site_named("SLICE_X1Y0").unwrap();
        let spi = design.site_pin(ff0_site, "E_I").unwrap();
        assert_eq!(design.pins.get(spi).net, Some(phys2));
        // The old net kept its source but lost the sink.
        let phys = design.net_named("sig").unwrap();
        assert!(design.sink_pins(phys).is_empty());
        assert!(design.nets.get(phys).source.is_some());
    }

    #[test]
    fn same_site_sink_routes_intra_site_only() {
        let (mut design, device) = fixture();
        // A flop next to the driver, in the very same site.
        let top = design.netlist.top;
        let ff = design.netlist.create_child_cell(top, "ff_local", "FDRE");
        design.netlist.create_port(ff, "D", PortDir::Input);
        let lut_site = design.site_named("SLICE_X0Y0").unwrap();
        let mut c = PhysCell::new("ff_local");
        c.logical = Some(ff);
        c.site = Some(lut_site);
        c.bel = Some("EFF".into());
        c.pin_map.insert("D".into(), vec!["D".into()]);
        let c = design.add_cell(c);
        design
            .sites
            .get_mut(lut_site)
            .cells
            .insert("EFF".into(), c);

        let pins_before = design.sites.get(lut_site).pins.len();
        let sink = DiagnosticSink::new();
        let mut deferred = DeferredRemovals::new();
        connect_net_paths(
            &mut design,
            &device,
            &[("sig", vec!["ff_local/D"])],
            &mut deferred,
            &EcoOptions::default(),
            &sink,
        )
        .unwrap();

        // No site pin was synthesized: the connection closed inside the
        // site through the FF input mux.
        assert_eq!(design.sites.get(lut_site).pins.len(), pins_before);
        assert_eq!(
            site::used_site_pip(&design, lut_site, "FFMUXE").as_deref(),
            Some("D6")
        );
        let phys = design.net_named("sig").unwrap();
        assert_eq!(
            site::net_from_sitewire(&design, lut_site, "FFMUXE_OUT"),
            Some(phys)
        );
    }

    #[test]
    fn second_requested_source_is_refused() {
        let (mut design, device) = fixture();
        let lut = design.netlist.find_cell("drv").unwrap();
        let o = design.netlist.cells.get(lut).port_named("O").unwrap();
        let top = design.netlist.top;
        let lut2 = design.netlist.create_child_cell(top, "drv2", "LUT1");
        let o2 = design.netlist.create_port(lut2, "O", PortDir::Output);

        let key = design.netlist.find_net("sig").unwrap();
        let sink = DiagnosticSink::new();
        let mut deferred = DeferredRemovals::new();
        let err = connect_net(
            &mut design,
            &device,
            &[(key, vec![PinRef::new(lut, o), PinRef::new(lut2, o2)])],
            &mut deferred,
            &EcoOptions::default(),
            &sink,
        )
        .unwrap_err();
        assert!(matches!(err, EcoError::MultipleSources(_)));
    }
}
