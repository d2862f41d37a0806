//! Creating and removing cells and nets, in both design views.

use crate::error::{EcoError, EcoResult};
use fabric_design::{
    netlist::CellTemplate, tools, DeferredRemovals, Design, PhysCell,
};
use fabric_device::DeviceGraph;

/// Removes hierarchical cell instances from the design.
///
/// Detaches every port from its net, unplaces every non-constant leaf
/// descendant (its site pins joining the deferred removals), removes the
/// physical cells, and finally drops the logical instances from their
/// parents.
pub fn remove_cell(
    design: &mut Design,
    device: &dyn DeviceGraph,
    paths: &[&str],
    deferred: &mut DeferredRemovals,
) -> EcoResult<()> {
    let mut insts = Vec::with_capacity(paths.len());
    for path in paths {
        let inst = design
            .netlist
            .find_cell(path)
            .ok_or_else(|| EcoError::CellNotFound(path.to_string()))?;
        insts.push(inst);
    }

    for &inst in &insts {
        // Disconnect the instance's ports from their nets.
        let ports: Vec<_> = design
            .netlist
            .cells
            .get(inst)
            .ports
            .iter()
            .map(|(id, _)| id)
            .collect();
        for port in ports {
            let pin = fabric_design::PinRef::new(inst, port);
            if let Some(outer) = design.netlist.outer_net_key(pin) {
                design.netlist.remove_pin_from_net(outer, pin);
            }
        }

        // Remove all leaf cells from the physical design.
        for leaf in design.netlist.leaf_descendants(inst) {
            if design.netlist.is_static_source(leaf) {
                continue;
            }
            let name = design.netlist.full_cell_name(leaf);
            let Some(phys) = design.cell_named(&name) else {
                return Err(EcoError::MissingPhysicalCell(name));
            };
            tools::fully_unplace_cell(design, device, phys, deferred);
            design.remove_cell(phys);
        }
    }

    for inst in insts {
        design.netlist.remove_cell_inst(inst);
    }
    Ok(())
}

/// Instantiates a cell template at each of the given hierarchical paths.
///
/// Inserts the instances into the logical netlist and creates unplaced
/// physical cells for every non-constant leaf.
pub fn create_cell(
    design: &mut Design,
    reference: &CellTemplate,
    paths: &[&str],
) -> EcoResult<()> {
    for path in paths {
        let (parent, name) = parent_and_name(design, path)?;
        let inst = design.netlist.instantiate(parent, name, reference);
        for leaf in design.netlist.leaf_descendants(inst) {
            if design.netlist.is_static_source(leaf) {
                continue;
            }
            let full = design.netlist.full_cell_name(leaf);
            let mut cell = PhysCell::new(full);
            cell.logical = Some(leaf);
            design.add_cell(cell);
        }
    }
    Ok(())
}

/// Creates nets at the given hierarchical paths, in both views.
pub fn create_net(design: &mut Design, paths: &[&str]) -> EcoResult<()> {
    for path in paths {
        let (parent, name) = parent_and_name(design, path)?;
        design.netlist.create_net_in(parent, name);
        if design.net_named(path).is_some() {
            return Err(EcoError::Structural(format!(
                "physical net '{path}' already exists"
            )));
        }
        design.create_net(path.to_string());
    }
    Ok(())
}

/// Splits a hierarchical path into its parent cell and final segment.
fn parent_and_name<'p>(
    design: &Design,
    path: &'p str,
) -> EcoResult<(fabric_design::CellId, &'p str)> {
    match path.rsplit_once('/') {
        Some((parent_path, name)) => {
            let parent = design
                .netlist
                .find_cell(parent_path)
                .ok_or_else(|| EcoError::CellNotFound(parent_path.to_string()))?;
            Ok((parent, name))
        }
        None => Ok((design.netlist.top, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_design::{PinRef, PortDir};
    use fabric_device::MeshDevice;

    fn lut_template() -> CellTemplate {
        CellTemplate::leaf(
            "LUT1",
            &[("I0", PortDir::Input), ("O", PortDir::Output)],
        )
    }

    #[test]
    fn create_and_remove_cell_is_identity() {
        let mut design = Design::new("top");
        let device = MeshDevice::new(2, 2);
        let top = design.netlist.top;
        design.netlist.create_child_cell(top, "keeper", "FDRE");
        let count_cells = |design: &Design| {
            design
                .netlist
                .leaf_descendants(design.netlist.top)
                .iter()
                .map(|&c| design.netlist.full_cell_name(c))
                .collect::<Vec<_>>()
        };
        let before = count_cells(&design);

        create_cell(&mut design, &lut_template(), &["added"]).unwrap();
        assert!(design.netlist.find_cell("added").is_some());
        assert!(design.cell_named("added").is_some());

        let mut deferred = DeferredRemovals::new();
        remove_cell(&mut design, &device, &["added"], &mut deferred).unwrap();
        assert!(design.netlist.find_cell("added").is_none());
        assert!(design.cell_named("added").is_none());
        assert_eq!(count_cells(&design), before);
    }

    #[test]
    fn create_cell_with_hierarchy() {
        let mut design = Design::new("top");
        let template = CellTemplate {
            lib: "wrapper".into(),
            ports: vec![("I".into(), PortDir::Input)],
            children: vec![("lut".into(), lut_template())],
        };
        create_cell(&mut design, &template, &["u0"]).unwrap();
        assert!(design.netlist.find_pin("u0/lut/O").is_some());
        assert!(design.cell_named("u0/lut").is_some());
        // The wrapper itself has no physical counterpart.
        assert!(design.cell_named("u0").is_none());
    }

    #[test]
    fn remove_cell_detaches_ports() {
        let mut design = Design::new("top");
        let device = MeshDevice::new(2, 2);
        create_cell(&mut design, &lut_template(), &["a", "b"]).unwrap();
        let a = design.netlist.find_cell("a").unwrap();
        let a_o = design.netlist.cells.get(a).port_named("O").unwrap();
        let b = design.netlist.find_cell("b").unwrap();
        let b_i = design.netlist.cells.get(b).port_named("I0").unwrap();
        let key = design.netlist.create_net_in(design.netlist.top, "w");
        design.netlist.add_pin_to_net(key, PinRef::new(a, a_o));
        design.netlist.add_pin_to_net(key, PinRef::new(b, b_i));

        let mut deferred = DeferredRemovals::new();
        remove_cell(&mut design, &device, &["a"], &mut deferred).unwrap();
        assert_eq!(design.netlist.net(key).pins.len(), 1);
        assert!(design.netlist.find_cell("a").is_none());
    }

    #[test]
    fn create_net_in_both_views() {
        let mut design = Design::new("top");
        let top = design.netlist.top;
        design.netlist.create_child_cell(top, "u0", "wrapper");
        create_net(&mut design, &["u0/fresh"]).unwrap();
        assert!(design.netlist.find_net("u0/fresh").is_some());
        assert!(design.net_named("u0/fresh").is_some());

        let err = create_net(&mut design, &["u0/fresh"]).unwrap_err();
        assert!(matches!(err, EcoError::Structural(_)));
    }

    #[test]
    fn remove_missing_cell_fails() {
        let mut design = Design::new("top");
        let device = MeshDevice::new(2, 2);
        let mut deferred = DeferredRemovals::new();
        let err = remove_cell(&mut design, &device, &["ghost"], &mut deferred).unwrap_err();
        assert!(matches!(err, EcoError::CellNotFound(_)));
    }
}
