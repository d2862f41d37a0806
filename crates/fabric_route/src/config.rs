//! Router configuration.

use serde::{Deserialize, Serialize};

/// The maximum criticality a connection can carry.
pub const MAX_CRITICALITY: f32 = 0.99;

/// All recognized routing parameters.
///
/// The defaults reproduce the stock full-routing behavior; partial flows
/// typically enable `soft_preserve` and widen the bounding boxes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Hard cap on rip-up-and-reroute iterations.
    pub max_iterations: u16,
    /// Present-congestion factor of the first iteration.
    pub initial_present_factor: f32,
    /// Geometric growth of the present-congestion factor per iteration.
    pub present_multiplier: f32,
    /// Historical-congestion bump per unit of overuse per iteration.
    pub historical_factor: f32,
    /// Wirelength weight in the total cost (0..1).
    pub wl_weight: f32,
    /// Timing weight in the total cost (0..1).
    pub timing_weight: f32,
    /// Growth of the timing weight per iteration (clamped at 1).
    pub timing_multiplier: f32,
    /// Exponent applied to normalized slack when computing criticality.
    pub criticality_exponent: f32,
    /// Connections above this criticality are re-routed every iteration.
    pub min_reroute_criticality: f32,
    /// Cap on the share of critical connections ripped up per iteration,
    /// in percent of all connections.
    pub reroute_percentage: f32,
    /// Exponent controlling fan-out sharing.
    pub share_exponent: f32,
    /// INT-tile margin around a connection's initial bounding box.
    pub bounding_box_extension: i16,
    /// Horizontal bounding-box growth per congested iteration.
    pub enlarge_bbox_h: i16,
    /// Vertical bounding-box growth per congested iteration.
    pub enlarge_bbox_v: i16,
    /// Gate path search by the connection bounding box.
    pub use_bounding_box: bool,
    /// Whether bounding boxes grow on congestion at all.
    pub enlarge_bounding_box: bool,
    /// Mask U-turn / cross-RCLK nodes via the delay sentinel.
    pub mask_cross_rclk: bool,
    /// Allow boundary U-turn nodes in the delay model.
    pub use_u_turn_nodes: bool,
    /// Enable timing-aware costs and criticality updates.
    pub timing_driven: bool,
    /// Use the alternate symmetric clock router.
    pub symmetric_clk_routing: bool,
    /// Allow ripping up preserved nets to resolve congestion.
    pub soft_preserve: bool,
    /// Instance-name prefix downgrading shared-site-pin conflicts from
    /// errors to warnings during ECO connect. Empty disables the escape
    /// hatch.
    pub warn_if_cell_inst_starts_with: String,
    /// Emit verbose per-iteration notes.
    pub verbose: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            initial_present_factor: 0.5,
            present_multiplier: 2.0,
            historical_factor: 1.0,
            wl_weight: 0.8,
            timing_weight: 0.35,
            timing_multiplier: 1.0,
            criticality_exponent: 3.0,
            min_reroute_criticality: 0.85,
            reroute_percentage: 3.0,
            share_exponent: 2.0,
            bounding_box_extension: 3,
            enlarge_bbox_h: 4,
            enlarge_bbox_v: 4,
            use_bounding_box: true,
            enlarge_bounding_box: true,
            mask_cross_rclk: false,
            use_u_turn_nodes: false,
            timing_driven: true,
            symmetric_clk_routing: false,
            soft_preserve: false,
            warn_if_cell_inst_starts_with: String::new(),
            verbose: false,
        }
    }
}
