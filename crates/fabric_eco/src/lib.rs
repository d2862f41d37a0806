//! ECO operators: structurally safe mutation of a placed-and-routed
//! design.
//!
//! Every operator keeps the logical (netlist) and physical (placement +
//! routing) views mutually consistent: disconnecting a pin finds and
//! defers the site pins its leaf pins map onto, connecting a net re-homes
//! or synthesizes site pins and intra-site routes, and cell removal
//! unplaces every leaf descendant. Physical side-effects are batched in a
//! [`DeferredRemovals`](fabric_design::DeferredRemovals) map so that
//! repeated operations stay cheap and pins can be reused by a later
//! connect.
//!
//! The netlist must be *unfolded* (each cell instance privately defined);
//! see `fabric_design`.

pub mod cells;
pub mod connect;
pub mod disconnect;
pub mod error;
pub mod site_pins;

pub use cells::{create_cell, create_net, remove_cell};
pub use connect::{connect_net, connect_net_paths};
pub use disconnect::{disconnect_net, disconnect_net_paths};
pub use error::{EcoError, EcoResult};
pub use site_pins::{create_exit_site_pin, route_out_site_pin_source};

use serde::{Deserialize, Serialize};

/// Knobs for the ECO operators.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EcoOptions {
    /// Instance-name prefix downgrading shared-site-pin conflicts from
    /// errors to warnings. Empty disables the escape hatch.
    pub warn_if_cell_inst_starts_with: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_disable_escape_hatch() {
        let options = EcoOptions::default();
        assert!(options.warn_if_cell_inst_starts_with.is_empty());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: EcoOptions = serde_json::from_str("{}").unwrap();
        assert!(options.warn_if_cell_inst_starts_with.is_empty());
        let options: EcoOptions =
            serde_json::from_str(r#"{"warn_if_cell_inst_starts_with": "dbg_"}"#).unwrap();
        assert_eq!(options.warn_if_cell_inst_starts_with, "dbg_");
    }
}
