//! Disconnecting hierarchical pins from their nets.

use crate::error::{EcoError, EcoResult};
use fabric_design::{
    cell, tools, DeferredRemovals, Design, NetKey, PinRef, PortDir,
};
use fabric_device::DeviceGraph;
use std::collections::HashSet;

/// Disconnects each pin (given as a hierarchical path) from its current
/// net.
///
/// A path naming an existing port that simply has no net is skipped;
/// a path naming a missing cell or port is an error.
pub fn disconnect_net_paths(
    design: &mut Design,
    device: &dyn DeviceGraph,
    paths: &[&str],
    deferred: &mut DeferredRemovals,
) -> EcoResult<()> {
    let mut pins = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(pin) = design.netlist.find_pin(path) else {
            let (cell_path, _) = path
                .rsplit_once('/')
                .ok_or_else(|| EcoError::PinNotFound(path.to_string()))?;
            if design.netlist.find_cell(cell_path).is_none() {
                return Err(EcoError::CellNotFound(cell_path.to_string()));
            }
            return Err(EcoError::PinNotFound(path.to_string()));
        };
        if design.netlist.outer_net_key(pin).is_none() {
            // Port exists but is unconnected; nothing to be done.
            continue;
        }
        pins.push(pin);
    }
    disconnect_net(design, device, &pins, deferred)
}

/// Disconnects the given pins from their nets, deferring the removal of
/// every affected site pin.
///
/// Modifies the logical netlist (the port instance leaves its net) and
/// collects the physical consequences in `deferred`: callers may batch
/// many disconnects before applying the removals, or hand the collected
/// pins to a subsequent connect for reuse.
pub fn disconnect_net(
    design: &mut Design,
    device: &dyn DeviceGraph,
    pins: &[PinRef],
    deferred: &mut DeferredRemovals,
) -> EcoResult<()> {
    for &pin in pins {
        let Some(outer) = design.netlist.outer_net_key(pin) else {
            return Err(EcoError::PinNotConnected(
                design.netlist.full_pin_name(pin),
            ));
        };
        let affected = affected_leaf_pins(design, pin, outer);

        let disconnecting_input = design.netlist.dir_of(pin) == PortDir::Input;
        for leaf in affected {
            // Disconnecting an input only ever affects input leaf pins.
            if disconnecting_input && design.netlist.dir_of(leaf) != PortDir::Input {
                continue;
            }
            let leaf_name = design.netlist.full_pin_name(leaf);
            let Some(phys_cell) = design.cell_named(&design.netlist.full_cell_name(leaf.cell))
            else {
                return Err(EcoError::MissingPhysicalCell(leaf_name));
            };
            let port_name = design.netlist.port(leaf).name.clone();
            for spi in cell::all_site_pins_from_logical_pin(design, device, phys_cell, &port_name)
            {
                tools::handle_pin_removals(design, deferred, spi);
            }
        }

        // Detach from the net but not from the cell instance: typically
        // the pin is about to be connected to another net.
        design.netlist.remove_pin_from_net(outer, pin);
    }
    Ok(())
}

/// Determines the leaf pins affected by disconnecting `pin` from `outer`.
///
/// For a leaf input that is just the pin itself; for a leaf output, every
/// leaf of the net group. For a hierarchy port the affected side depends
/// on where the source lives: if the internal side contains it, the
/// upstream (outer) leaves are affected, otherwise the downstream ones.
fn affected_leaf_pins(design: &Design, pin: PinRef, outer: NetKey) -> Vec<PinRef> {
    let netlist = &design.netlist;
    match netlist.inner_net_key(pin) {
        None => {
            if netlist.is_leaf(pin.cell) {
                if netlist.dir_of(pin) == PortDir::Input {
                    vec![pin]
                } else {
                    let mut visited = HashSet::new();
                    netlist.leaf_pins_of_group(outer, &mut visited)
                }
            } else {
                // A hierarchy port with no internal net cannot reach any
                // leaf pin through the cell.
                Vec::new()
            }
        }
        Some(internal) => {
            let mut visited = HashSet::new();
            visited.insert(outer);
            let downstream = netlist.leaf_pins_of_group(internal, &mut visited);
            if netlist.dir_of(pin) == PortDir::Input {
                downstream
            } else {
                let source_inside = downstream
                    .iter()
                    .any(|&leaf| netlist.dir_of(leaf) == PortDir::Output);
                if source_inside {
                    let mut visited = HashSet::new();
                    visited.insert(internal);
                    netlist.leaf_pins_of_group(outer, &mut visited)
                } else {
                    downstream
                }
            }
        }
    }
}
