//! A synthetic mesh device for tests and examples.
//!
//! The mesh models a rectangular grid of interconnect tiles, each paired
//! with one SLICE site. Per tile the interconnect offers length-1 and
//! length-2 wires in all four directions, length-6 long wires, a PINBOUNCE
//! node, input muxes feeding the site pins, and output stubs. The SLICE
//! site carries eight LUT/FF letter groups with FFMUX/OUTMUX routing BELs,
//! enough to exercise both the router and the intra-site ECO paths. A
//! grid-less RAMB36 site type is also defined so block-RAM pin handling
//! can be exercised off the fabric.
//!
//! Real devices live behind the same [`DeviceGraph`] trait in external
//! crates; nothing in the engine depends on the mesh shape.

use crate::graph::{DeviceGraph, Pip};
use crate::ids::NodeId;
use crate::intent::IntentCode;
use crate::site::{BelClass, BelDef, BelPinDef, PinDir, SitePinDef, SitePipDef, SiteTypeDef};
use std::collections::{HashMap, HashSet};

/// The eight letter groups of a mesh SLICE.
pub const SLICE_LETTERS: [char; 8] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

struct MeshNode {
    name: String,
    x: i16,
    y: i16,
    is_int: bool,
    intent: IntentCode,
    length: u16,
}

/// A synthetic grid device implementing [`DeviceGraph`].
pub struct MeshDevice {
    x0: i16,
    y0: i16,
    width: i16,
    height: i16,
    nodes: Vec<MeshNode>,
    downhill: Vec<Vec<NodeId>>,
    uphill: Vec<Vec<NodeId>>,
    by_name: HashMap<String, NodeId>,
    route_thrus: HashSet<(NodeId, NodeId)>,
    slice_type: SiteTypeDef,
    ram_type: SiteTypeDef,
    slr_height: i16,
}

impl MeshDevice {
    /// Builds a `width` x `height` mesh with tile coordinates starting at
    /// the origin.
    pub fn new(width: i16, height: i16) -> Self {
        Self::with_origin(0, 0, width, height)
    }

    /// Builds a mesh whose lower-left tile sits at `(x0, y0)`.
    ///
    /// Useful when a test needs sites with specific absolute names (e.g.
    /// `SLICE_X13Y237`) without paying for the whole device below them.
    pub fn with_origin(x0: i16, y0: i16, width: i16, height: i16) -> Self {
        assert!(width > 0 && height > 0, "mesh must not be empty");
        let mut device = Self {
            x0,
            y0,
            width,
            height,
            nodes: Vec::new(),
            downhill: Vec::new(),
            uphill: Vec::new(),
            by_name: HashMap::new(),
            route_thrus: HashSet::new(),
            slice_type: build_slice_type(),
            ram_type: build_ramb_type(),
            slr_height: i16::MAX,
        };
        device.build();
        device
    }

    /// Splits the mesh into SLRs of `height` tiles each.
    pub fn with_slr_height(mut self, height: i16) -> Self {
        assert!(height > 0);
        self.slr_height = height;
        self
    }

    /// Marks the `a -> b` hop as a forbidden route-through.
    pub fn add_route_thru(&mut self, a: NodeId, b: NodeId) {
        self.route_thrus.insert((a, b));
    }

    /// Returns the site name at the given tile.
    pub fn site_at(&self, x: i16, y: i16) -> String {
        format!("SLICE_X{x}Y{y}")
    }

    /// Returns the node with the given name, if it exists.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    fn in_bounds(&self, x: i16, y: i16) -> bool {
        x >= self.x0 && x < self.x0 + self.width && y >= self.y0 && y < self.y0 + self.height
    }

    fn add_node(
        &mut self,
        name: String,
        x: i16,
        y: i16,
        is_int: bool,
        intent: IntentCode,
        length: u16,
    ) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.nodes.push(MeshNode {
            name,
            x,
            y,
            is_int,
            intent,
            length,
        });
        self.downhill.push(Vec::new());
        id
    }

    fn node(&self, name: &str) -> NodeId {
        self.by_name[name]
    }

    fn build(&mut self) {
        let (x0, y0) = (self.x0, self.y0);
        let (x1, y1) = (x0 + self.width, y0 + self.height);

        // Pass 1: create every node.
        for y in y0..y1 {
            for x in x0..x1 {
                let site = self.site_at(x, y);
                for l in SLICE_LETTERS {
                    for i in 1..=6 {
                        self.add_node(
                            format!("INT_X{x}Y{y}/IMUX_{l}{i}"),
                            x,
                            y,
                            true,
                            IntentCode::Pinfeed,
                            0,
                        );
                        self.add_node(
                            format!("{site}.{l}{i}"),
                            x,
                            y,
                            false,
                            IntentCode::Generic,
                            0,
                        );
                    }
                    self.add_node(
                        format!("INT_X{x}Y{y}/IMUX_{l}_I"),
                        x,
                        y,
                        true,
                        IntentCode::Pinfeed,
                        0,
                    );
                    self.add_node(
                        format!("{site}.{l}_I"),
                        x,
                        y,
                        false,
                        IntentCode::Generic,
                        0,
                    );
                    for out in [format!("{l}_O"), format!("{l}MUX"), format!("{l}Q")] {
                        self.add_node(
                            format!("{site}.{out}"),
                            x,
                            y,
                            false,
                            IntentCode::Generic,
                            0,
                        );
                        self.add_node(
                            format!("INT_X{x}Y{y}/LOGIC_OUTS_{out}"),
                            x,
                            y,
                            true,
                            IntentCode::Local,
                            0,
                        );
                    }
                }
                self.add_node(
                    format!("INT_X{x}Y{y}/BOUNCE"),
                    x,
                    y,
                    true,
                    IntentCode::Pinbounce,
                    0,
                );
                for (dir, dx, dy) in [("NN", 0, 1), ("EE", 1, 0), ("SS", 0, -1), ("WW", -1, 0)] {
                    if self.in_bounds(x + dx, y + dy) {
                        self.add_node(
                            format!("INT_X{x}Y{y}/{dir}1"),
                            x,
                            y,
                            true,
                            IntentCode::Single,
                            1,
                        );
                    }
                    if self.in_bounds(x + 2 * dx, y + 2 * dy) {
                        self.add_node(
                            format!("INT_X{x}Y{y}/{dir}2"),
                            x,
                            y,
                            true,
                            IntentCode::Double,
                            2,
                        );
                    }
                    if self.in_bounds(x + 6 * dx, y + 6 * dy) {
                        let intent = if dx == 0 {
                            IntentCode::VLong
                        } else {
                            IntentCode::HLong
                        };
                        self.add_node(
                            format!("INT_X{x}Y{y}/{dir}6"),
                            x,
                            y,
                            true,
                            intent,
                            6,
                        );
                    }
                }
            }
        }

        // Pass 2: wire up adjacency.
        for y in y0..y1 {
            for x in x0..x1 {
                let site = self.site_at(x, y);
                for l in SLICE_LETTERS {
                    for i in 1..=6 {
                        let imux = self.node(&format!("INT_X{x}Y{y}/IMUX_{l}{i}"));
                        let pin = self.node(&format!("{site}.{l}{i}"));
                        self.downhill[imux.as_raw() as usize].push(pin);
                    }
                    let imux = self.node(&format!("INT_X{x}Y{y}/IMUX_{l}_I"));
                    let pin = self.node(&format!("{site}.{l}_I"));
                    self.downhill[imux.as_raw() as usize].push(pin);
                    for out in [format!("{l}_O"), format!("{l}MUX"), format!("{l}Q")] {
                        let pin = self.node(&format!("{site}.{out}"));
                        let stub = self.node(&format!("INT_X{x}Y{y}/LOGIC_OUTS_{out}"));
                        self.downhill[pin.as_raw() as usize].push(stub);
                        let mut next = self.tile_wires(x, y);
                        next.extend(self.tile_imuxes(x, y));
                        self.downhill[stub.as_raw() as usize] = next;
                    }
                }

                // Bounce re-enters the same tile's input muxes.
                let bounce = self.node(&format!("INT_X{x}Y{y}/BOUNCE"));
                let imuxes = self.tile_imuxes(x, y);
                self.downhill[bounce.as_raw() as usize] = imuxes;

                for (dir, dx, dy) in [("NN", 0, 1), ("EE", 1, 0), ("SS", 0, -1), ("WW", -1, 0)] {
                    for (len, reach) in [(1, 1), (2, 2), (6, 6)] {
                        let Some(&wire) = self.by_name.get(&format!("INT_X{x}Y{y}/{dir}{len}"))
                        else {
                            continue;
                        };
                        let (tx, ty) = (x + reach * dx, y + reach * dy);
                        let mut next = Vec::new();
                        if len < 6 {
                            next.extend(self.tile_imuxes(tx, ty));
                            next.push(self.node(&format!("INT_X{tx}Y{ty}/BOUNCE")));
                        }
                        next.extend(self.tile_wires(tx, ty));
                        self.downhill[wire.as_raw() as usize] = next;
                    }
                }
            }
        }

        // Pass 3: derive uphill adjacency.
        self.uphill = vec![Vec::new(); self.nodes.len()];
        for (from, outs) in self.downhill.iter().enumerate() {
            for &to in outs {
                self.uphill[to.as_raw() as usize].push(NodeId::from_raw(from as u32));
            }
        }
    }

    fn tile_imuxes(&self, x: i16, y: i16) -> Vec<NodeId> {
        let mut out = Vec::new();
        for l in SLICE_LETTERS {
            for i in 1..=6 {
                out.push(self.node(&format!("INT_X{x}Y{y}/IMUX_{l}{i}")));
            }
            out.push(self.node(&format!("INT_X{x}Y{y}/IMUX_{l}_I")));
        }
        out
    }

    fn tile_wires(&self, x: i16, y: i16) -> Vec<NodeId> {
        let mut out = Vec::new();
        for dir in ["NN", "EE", "SS", "WW"] {
            for len in [1, 2, 6] {
                if let Some(&id) = self.by_name.get(&format!("INT_X{x}Y{y}/{dir}{len}")) {
                    out.push(id);
                }
            }
        }
        out
    }
}

impl DeviceGraph for MeshDevice {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn uphill_nodes(&self, n: NodeId) -> Vec<NodeId> {
        self.uphill[n.as_raw() as usize].clone()
    }

    fn downhill_nodes(&self, n: NodeId) -> Vec<NodeId> {
        self.downhill[n.as_raw() as usize].clone()
    }

    fn pip_between(&self, a: NodeId, b: NodeId) -> Option<Pip> {
        if self.downhill[a.as_raw() as usize].contains(&b) {
            Some(Pip::new(a, b))
        } else if self.downhill[b.as_raw() as usize].contains(&a) {
            Some(Pip::new(b, a))
        } else {
            None
        }
    }

    fn intent_code(&self, n: NodeId) -> IntentCode {
        self.nodes[n.as_raw() as usize].intent
    }

    fn length_of(&self, n: NodeId) -> u16 {
        self.nodes[n.as_raw() as usize].length
    }

    fn tile_xy(&self, n: NodeId) -> (i16, i16) {
        let node = &self.nodes[n.as_raw() as usize];
        (node.x, node.y)
    }

    fn is_int_tile(&self, n: NodeId) -> bool {
        self.nodes[n.as_raw() as usize].is_int
    }

    fn is_route_thru(&self, a: NodeId, b: NodeId) -> bool {
        self.route_thrus.contains(&(a, b))
    }

    fn slr_of(&self, n: NodeId) -> u8 {
        let y = self.nodes[n.as_raw() as usize].y - self.y0;
        (y / self.slr_height) as u8
    }

    fn node_name(&self, n: NodeId) -> String {
        self.nodes[n.as_raw() as usize].name.clone()
    }

    fn site_type(&self, name: &str) -> Option<&SiteTypeDef> {
        match name {
            "SLICE" => Some(&self.slice_type),
            "RAMB36" => Some(&self.ram_type),
            _ => None,
        }
    }

    fn site_pin_node(&self, site: &str, pin: &str) -> Option<NodeId> {
        self.by_name.get(&format!("{site}.{pin}")).copied()
    }
}

/// Builds the mesh SLICE site type: eight letter groups of LUT6/LUT5/FF
/// with FFMUX and OUTMUX routing BELs.
fn build_slice_type() -> SiteTypeDef {
    let mut site = SiteTypeDef {
        name: "SLICE".into(),
        ..SiteTypeDef::default()
    };
    for l in SLICE_LETTERS {
        let mut lut6_pins = Vec::new();
        for i in 1..=6 {
            lut6_pins.push(BelPinDef {
                name: format!("A{i}"),
                dir: PinDir::Input,
                sitewire: format!("{l}{i}"),
            });
        }
        lut6_pins.push(BelPinDef {
            name: "O6".into(),
            dir: PinDir::Output,
            sitewire: format!("{l}_O6"),
        });
        site.bels.push(BelDef {
            name: format!("{l}6LUT"),
            class: BelClass::Logic,
            pins: lut6_pins,
        });

        let mut lut5_pins = Vec::new();
        for i in 1..=5 {
            lut5_pins.push(BelPinDef {
                name: format!("A{i}"),
                dir: PinDir::Input,
                sitewire: format!("{l}{i}"),
            });
        }
        lut5_pins.push(BelPinDef {
            name: "O5".into(),
            dir: PinDir::Output,
            sitewire: format!("{l}_O5"),
        });
        site.bels.push(BelDef {
            name: format!("{l}5LUT"),
            class: BelClass::Logic,
            pins: lut5_pins,
        });

        site.bels.push(BelDef {
            name: format!("{l}FF"),
            class: BelClass::Logic,
            pins: vec![
                BelPinDef {
                    name: "D".into(),
                    dir: PinDir::Input,
                    sitewire: format!("FFMUX{l}_OUT"),
                },
                BelPinDef {
                    name: "Q".into(),
                    dir: PinDir::Output,
                    sitewire: format!("{l}Q"),
                },
            ],
        });

        site.bels.push(BelDef {
            name: format!("FFMUX{l}"),
            class: BelClass::Routing,
            pins: vec![
                BelPinDef {
                    name: "D6".into(),
                    dir: PinDir::Input,
                    sitewire: format!("{l}_O6"),
                },
                BelPinDef {
                    name: "D5".into(),
                    dir: PinDir::Input,
                    sitewire: format!("{l}_O5"),
                },
                BelPinDef {
                    name: "BYP".into(),
                    dir: PinDir::Input,
                    sitewire: format!("{l}_I"),
                },
                BelPinDef {
                    name: "OUT".into(),
                    dir: PinDir::Output,
                    sitewire: format!("FFMUX{l}_OUT"),
                },
            ],
        });

        site.bels.push(BelDef {
            name: format!("OUTMUX{l}"),
            class: BelClass::Routing,
            pins: vec![
                BelPinDef {
                    name: "D6".into(),
                    dir: PinDir::Input,
                    sitewire: format!("{l}_O6"),
                },
                BelPinDef {
                    name: "D5".into(),
                    dir: PinDir::Input,
                    sitewire: format!("{l}_O5"),
                },
                BelPinDef {
                    name: "OUT".into(),
                    dir: PinDir::Output,
                    sitewire: format!("{l}MUX"),
                },
            ],
        });

        let mut pin_defs = Vec::new();
        for i in 1..=6 {
            pin_defs.push((format!("{l}{i}"), PinDir::Input, format!("{l}{i}")));
        }
        pin_defs.push((format!("{l}_I"), PinDir::Input, format!("{l}_I")));
        pin_defs.push((format!("{l}_O"), PinDir::Output, format!("{l}_O6")));
        pin_defs.push((format!("{l}MUX"), PinDir::Output, format!("{l}MUX")));
        pin_defs.push((format!("{l}Q"), PinDir::Output, format!("{l}Q")));
        for (name, dir, sitewire) in pin_defs {
            site.site_pins.push(SitePinDef {
                name: name.clone(),
                dir,
                sitewire: sitewire.clone(),
            });
            // The matching port BEL faces into the site: an input site pin
            // drives its sitewire, an output site pin consumes it.
            let inner_dir = match dir {
                PinDir::Input => PinDir::Output,
                PinDir::Output => PinDir::Input,
            };
            site.bels.push(BelDef {
                name: name.clone(),
                class: BelClass::Port,
                pins: vec![BelPinDef {
                    name,
                    dir: inner_dir,
                    sitewire,
                }],
            });
        }

        site.site_pips.push(SitePipDef {
            bel: format!("FFMUX{l}"),
            inputs: vec!["D6".into(), "D5".into(), "BYP".into()],
            output: "OUT".into(),
        });
        site.site_pips.push(SitePipDef {
            bel: format!("OUTMUX{l}"),
            inputs: vec!["D6".into(), "D5".into()],
            output: "OUT".into(),
        });
    }
    site
}

/// Builds the mesh RAMB36 site type: one block-RAM BEL with a pair of
/// upper data input/output pins wired straight to the site boundary.
fn build_ramb_type() -> SiteTypeDef {
    let mut site = SiteTypeDef {
        name: "RAMB36".into(),
        ..SiteTypeDef::default()
    };
    let mut ram_pins = Vec::new();
    for i in 0..2 {
        ram_pins.push(BelPinDef {
            name: format!("DIBU{i}"),
            dir: PinDir::Input,
            sitewire: format!("DIBU{i}"),
        });
        ram_pins.push(BelPinDef {
            name: format!("DOBU{i}"),
            dir: PinDir::Output,
            sitewire: format!("DOBU{i}"),
        });
    }
    site.bels.push(BelDef {
        name: "RAMB36E2".into(),
        class: BelClass::Logic,
        pins: ram_pins,
    });
    for i in 0..2 {
        for (name, dir) in [
            (format!("DIBU{i}"), PinDir::Input),
            (format!("DOBU{i}"), PinDir::Output),
        ] {
            site.site_pins.push(SitePinDef {
                name: name.clone(),
                dir,
                sitewire: name.clone(),
            });
            let inner_dir = match dir {
                PinDir::Input => PinDir::Output,
                PinDir::Output => PinDir::Input,
            };
            site.bels.push(BelDef {
                name: name.clone(),
                class: BelClass::Port,
                pins: vec![BelPinDef {
                    name: name.clone(),
                    dir: inner_dir,
                    sitewire: name,
                }],
            });
        }
    }
    site
}
