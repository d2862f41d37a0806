//! Site-type definitions: BELs, BEL pins, sitewires, site pins, site PIPs.
//!
//! A site type is static device data describing the internal connectivity of
//! one placement site. The ECO engine walks this structure when it re-homes
//! intra-site routing; the mutable per-design state (which net occupies which
//! sitewire) lives in the design model, not here.

use serde::{Deserialize, Serialize};

/// Direction of a BEL pin or site pin.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PinDir {
    /// An input pin.
    Input,
    /// An output pin.
    Output,
}

/// The class of a BEL within a site.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BelClass {
    /// A logic BEL (LUT, flip-flop, carry) that cells are placed on.
    Logic,
    /// A routing BEL (intra-site mux) configured through site PIPs.
    Routing,
    /// A port BEL standing in for a site boundary pin; its single pin
    /// carries the pin's name and faces into the site.
    Port,
}

/// A pin on a BEL, attached to exactly one sitewire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BelPinDef {
    /// The pin name (e.g. "A1", "O6", "D").
    pub name: String,
    /// The pin direction.
    pub dir: PinDir,
    /// The sitewire this pin is attached to.
    pub sitewire: String,
}

/// A BEL inside a site type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BelDef {
    /// The BEL name (e.g. "E6LUT", "EFF", "OUTMUXE").
    pub name: String,
    /// Logic or routing.
    pub class: BelClass,
    /// The BEL's pins.
    pub pins: Vec<BelPinDef>,
}

impl BelDef {
    /// Returns the pin with the given name.
    pub fn pin(&self, name: &str) -> Option<&BelPinDef> {
        self.pins.iter().find(|p| p.name == name)
    }
}

/// A pin on the site boundary, attached to one sitewire and (when the site
/// is placed) to one routing-resource node outside the site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SitePinDef {
    /// The site pin name (e.g. "E1", "E_I", "EQ", "EMUX").
    pub name: String,
    /// Direction relative to the site (an `Input` pin feeds into the site).
    pub dir: PinDir,
    /// The sitewire this pin drives or is driven by.
    pub sitewire: String,
}

/// A configurable intra-site switch on a routing BEL.
///
/// At most one input can be selected at a time; the selection is per-design
/// state kept on the site instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SitePipDef {
    /// The routing BEL this PIP configures.
    pub bel: String,
    /// Selectable input pin names on the BEL.
    pub inputs: Vec<String>,
    /// The output pin name on the BEL.
    pub output: String,
}

/// A reference to a pin on a named BEL, used when walking sitewires.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BelPinRef {
    /// The BEL name.
    pub bel: String,
    /// The pin name on that BEL.
    pub pin: String,
}

impl BelPinRef {
    /// Creates a reference to `bel`/`pin`.
    pub fn new(bel: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            bel: bel.into(),
            pin: pin.into(),
        }
    }
}

impl std::fmt::Display for BelPinRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bel, self.pin)
    }
}

/// The static definition of one site type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SiteTypeDef {
    /// The site-type name (e.g. "SLICE").
    pub name: String,
    /// All BELs in the site.
    pub bels: Vec<BelDef>,
    /// All site boundary pins.
    pub site_pins: Vec<SitePinDef>,
    /// All configurable intra-site switches.
    pub site_pips: Vec<SitePipDef>,
}

impl SiteTypeDef {
    /// Returns the BEL with the given name.
    pub fn bel(&self, name: &str) -> Option<&BelDef> {
        self.bels.iter().find(|b| b.name == name)
    }

    /// Returns the port-BEL pin standing in for a site pin.
    ///
    /// Site pins are modelled as single-pin BELs of class
    /// [`BelClass::Port`] named after the pin, so intra-site routing can
    /// treat boundary pins and BEL pins uniformly.
    pub fn site_pin_bel(&self, pin: &str) -> Option<BelPinRef> {
        self.site_pin(pin)?;
        Some(BelPinRef::new(pin, pin))
    }

    /// Returns the site pin with the given name.
    pub fn site_pin(&self, name: &str) -> Option<&SitePinDef> {
        self.site_pins.iter().find(|p| p.name == name)
    }

    /// Returns the sitewire a BEL pin is attached to.
    pub fn sitewire_of(&self, pin: &BelPinRef) -> Option<&str> {
        self.bel(&pin.bel)?.pin(&pin.pin).map(|p| p.sitewire.as_str())
    }

    /// Returns every BEL pin attached to the given sitewire.
    pub fn sitewire_bel_pins(&self, sitewire: &str) -> Vec<BelPinRef> {
        let mut pins = Vec::new();
        for bel in &self.bels {
            for pin in &bel.pins {
                if pin.sitewire == sitewire {
                    pins.push(BelPinRef::new(bel.name.clone(), pin.name.clone()));
                }
            }
        }
        pins
    }

    /// Returns every site pin attached to the given sitewire.
    pub fn sitewire_site_pins(&self, sitewire: &str) -> Vec<&SitePinDef> {
        self.site_pins
            .iter()
            .filter(|p| p.sitewire == sitewire)
            .collect()
    }

    /// Returns the BEL pin that drives the given sitewire, if any.
    ///
    /// A sitewire is driven either by exactly one output BEL pin or by an
    /// input site pin (in which case this returns `None`).
    pub fn sitewire_source(&self, sitewire: &str) -> Option<BelPinRef> {
        for bel in &self.bels {
            for pin in &bel.pins {
                if pin.sitewire == sitewire && pin.dir == PinDir::Output {
                    return Some(BelPinRef::new(bel.name.clone(), pin.name.clone()));
                }
            }
        }
        None
    }

    /// Returns the site PIP on the given routing BEL, if any.
    pub fn site_pip_on(&self, bel: &str) -> Option<&SitePipDef> {
        self.site_pips.iter().find(|p| p.bel == bel)
    }

    /// Returns the dir of a pin on a BEL.
    pub fn bel_pin_dir(&self, pin: &BelPinRef) -> Option<PinDir> {
        self.bel(&pin.bel)?.pin(&pin.pin).map(|p| p.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_site() -> SiteTypeDef {
        SiteTypeDef {
            name: "TINY".into(),
            bels: vec![
                BelDef {
                    name: "LUT".into(),
                    class: BelClass::Logic,
                    pins: vec![
                        BelPinDef {
                            name: "A1".into(),
                            dir: PinDir::Input,
                            sitewire: "I1".into(),
                        },
                        BelPinDef {
                            name: "O".into(),
                            dir: PinDir::Output,
                            sitewire: "LUT_O".into(),
                        },
                    ],
                },
                BelDef {
                    name: "OMUX".into(),
                    class: BelClass::Routing,
                    pins: vec![
                        BelPinDef {
                            name: "D".into(),
                            dir: PinDir::Input,
                            sitewire: "LUT_O".into(),
                        },
                        BelPinDef {
                            name: "OUT".into(),
                            dir: PinDir::Output,
                            sitewire: "MUX_O".into(),
                        },
                    ],
                },
            ],
            site_pins: vec![
                SitePinDef {
                    name: "I1".into(),
                    dir: PinDir::Input,
                    sitewire: "I1".into(),
                },
                SitePinDef {
                    name: "O".into(),
                    dir: PinDir::Output,
                    sitewire: "MUX_O".into(),
                },
            ],
            site_pips: vec![SitePipDef {
                bel: "OMUX".into(),
                inputs: vec!["D".into()],
                output: "OUT".into(),
            }],
        }
    }

    #[test]
    fn bel_and_pin_lookup() {
        let site = tiny_site();
        assert!(site.bel("LUT").is_some());
        assert!(site.bel("NOPE").is_none());
        assert_eq!(
            site.sitewire_of(&BelPinRef::new("LUT", "O")),
            Some("LUT_O")
        );
    }

    #[test]
    fn sitewire_source_is_output_pin() {
        let site = tiny_site();
        let src = site.sitewire_source("LUT_O").unwrap();
        assert_eq!(src, BelPinRef::new("LUT", "O"));
        // Input site pin drives I1; no BEL output there.
        assert!(site.sitewire_source("I1").is_none());
    }

    #[test]
    fn sitewire_fanout() {
        let site = tiny_site();
        let pins = site.sitewire_bel_pins("LUT_O");
        assert_eq!(pins.len(), 2);
        let spis = site.sitewire_site_pins("MUX_O");
        assert_eq!(spis.len(), 1);
        assert_eq!(spis[0].name, "O");
    }

    #[test]
    fn site_pip_lookup() {
        let site = tiny_site();
        let pip = site.site_pip_on("OMUX").unwrap();
        assert_eq!(pip.output, "OUT");
        assert!(site.site_pip_on("LUT").is_none());
    }
}
