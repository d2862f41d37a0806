//! Physical nets and site pin instances.

use crate::ids::{PhysNetId, SiteInstId};
use fabric_device::Pip;
use serde::{Deserialize, Serialize};

/// The electrical type of a physical net.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum NetType {
    /// An ordinary signal net.
    Wire,
    /// The constant-0 distribution net.
    Gnd,
    /// The constant-1 distribution net.
    Vcc,
}

impl NetType {
    /// Returns `true` for the GND and VCC distribution nets.
    pub fn is_static(self) -> bool {
        matches!(self, NetType::Gnd | NetType::Vcc)
    }
}

/// A physical net: a set of site pin instances plus the PIPs realizing the
/// routes between them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhysNet {
    /// The net name. For routable signal nets this is the hierarchical
    /// name of the parent logical net.
    pub name: String,
    /// The electrical type.
    pub ntype: NetType,
    /// Whether this is a global clock net, routed by the clock router.
    pub clock: bool,
    /// The driving site pin.
    pub source: Option<crate::ids::SitePinId>,
    /// The secondary output pin after an output-pin swap (e.g. `?_O`
    /// versus `?MUX`).
    pub alt_source: Option<crate::ids::SitePinId>,
    /// Every attached site pin, sources included.
    pub pins: Vec<crate::ids::SitePinId>,
    /// The activated PIPs of the net's routes.
    pub pips: Vec<Pip>,
}

impl PhysNet {
    /// Creates an empty net of the given type.
    pub fn new(name: impl Into<String>, ntype: NetType) -> Self {
        Self {
            name: name.into(),
            ntype,
            clock: false,
            source: None,
            alt_source: None,
            pins: Vec::new(),
            pips: Vec::new(),
        }
    }

    /// Returns `true` for GND/VCC nets.
    pub fn is_static(&self) -> bool {
        self.ntype.is_static()
    }

    /// Returns `true` if the net carries any PIPs.
    pub fn has_pips(&self) -> bool {
        !self.pips.is_empty()
    }
}

/// A site pin instance: the binding of a physical net to one pin of a
/// placed site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SitePinInst {
    /// The site pin name (e.g. "E_I", "G6", "EQ").
    pub name: String,
    /// The site the pin lives on (`None` once detached).
    pub site: Option<SiteInstId>,
    /// `true` for output (driving) pins.
    pub is_output: bool,
    /// The net the pin is attached to.
    pub net: Option<PhysNetId>,
    /// Whether the router has realized this pin's connection.
    pub routed: bool,
}
