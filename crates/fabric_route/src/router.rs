//! The iterative rip-up-and-reroute loop and its phases.
//!
//! Control flow: clocks, then static nets, then signal nets through the
//! negotiated-congestion loop; afterwards node lists are finalized,
//! illegal routes legalized, and PIPs assigned per net with a design-wide
//! conflict audit.

use crate::adapters::RouterAdapters;
use crate::config::{RouterConfig, MAX_CRITICALITY};
use crate::cost::{self, SearchWeights};
use crate::fixer::RouteLegalizer;
use crate::graph::RoutingGraph;
use crate::helper;
use crate::netwrap::{BBox, Connection, NetWrapper};
use crate::report::{
    IterationReport, NodeTypeUsage, RouteOutcome, RouteReport, RouteTargets,
};
use crate::rnode::{ConnectionId, NetWrapId, RnodeId, RnodeType};
use crate::search::PathSearch;
use fabric_common::{FabricResult, InternalError};
use fabric_design::{tools, Design, PhysNetId, SitePinId};
use fabric_device::{DeviceGraph, Pip};
use fabric_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Initial delay estimate offset for a connection, in picoseconds.
const EST_BASE_DELAY_PS: f32 = 113.0;

/// Routes a placed design.
///
/// Missing timing collaborators downgrade a timing-driven configuration
/// to wirelength-driven with a note. The returned report carries the
/// outcome, per-iteration statistics, and the final usage audit.
pub fn route_design(
    design: &mut Design,
    device: &dyn DeviceGraph,
    config: &RouterConfig,
    adapters: RouterAdapters<'_>,
    sink: &DiagnosticSink,
) -> FabricResult<RouteReport> {
    let mut router = Router::new(design, device, config, adapters, sink);
    router.determine_routing_targets()?;
    router.route()
}

struct Router<'a, 'b> {
    design: &'a mut Design,
    device: &'a dyn DeviceGraph,
    config: &'a RouterConfig,
    adapters: RouterAdapters<'b>,
    sink: &'a DiagnosticSink,
    timing_driven: bool,

    graph: RoutingGraph,
    search: PathSearch,
    nets: Vec<NetWrapper>,
    connections: Vec<Connection>,
    sorted: Vec<ConnectionId>,
    indirect: Vec<ConnectionId>,
    direct: Vec<ConnectionId>,
    clk_nets: Vec<PhysNetId>,
    static_targets: Vec<(PhysNetId, Vec<SitePinId>)>,
    targets: RouteTargets,

    iteration: u16,
    present_factor: f32,
    timing_weight: f32,
    min_reroute_criticality: f32,
    max_delay: f32,
    connections_routed: u64,
    connections_routed_iteration: usize,
    iterations: Vec<IterationReport>,
}

impl<'a, 'b> Router<'a, 'b> {
    fn new(
        design: &'a mut Design,
        device: &'a dyn DeviceGraph,
        config: &'a RouterConfig,
        adapters: RouterAdapters<'b>,
        sink: &'a DiagnosticSink,
    ) -> Self {
        let mut timing_driven = config.timing_driven;
        if timing_driven && (adapters.estimator.is_none() || adapters.timing.is_none()) {
            sink.emit(Diagnostic::note(
                DiagnosticCode::new(Category::Timing, 1),
                "timing-driven routing requested without a delay estimator and timing \
                 graph; falling back to wirelength-driven mode",
            ));
            timing_driven = false;
        }
        Self {
            design,
            device,
            config,
            adapters,
            sink,
            timing_driven,
            graph: RoutingGraph::new(),
            search: PathSearch::new(),
            nets: Vec::new(),
            connections: Vec::new(),
            sorted: Vec::new(),
            indirect: Vec::new(),
            direct: Vec::new(),
            clk_nets: Vec::new(),
            static_targets: Vec::new(),
            targets: RouteTargets::default(),
            iteration: 0,
            present_factor: config.initial_present_factor,
            timing_weight: config.timing_weight,
            min_reroute_criticality: config.min_reroute_criticality,
            max_delay: 0.0,
            connections_routed: 0,
            connections_routed_iteration: 0,
            iterations: Vec::new(),
        }
    }

    fn diag(&self, code: u16, message: String) {
        self.sink.emit(Diagnostic::note(
            DiagnosticCode::new(Category::Route, code),
            message,
        ));
    }

    // --- Target determination ---

    /// Classifies every physical net into clock, static, or signal
    /// routing targets; nets that need no routing are preserved.
    fn determine_routing_targets(&mut self) -> FabricResult<()> {
        let net_ids: Vec<PhysNetId> = self.design.nets.iter().map(|(id, _)| id).collect();
        for net in net_ids {
            let (is_clock, is_static) = {
                let n = self.design.nets.get(net);
                (n.clock, n.is_static())
            };
            if is_clock {
                if self.design.nets.get(net).source.is_some()
                    && !self.design.sink_pins(net).is_empty()
                {
                    self.design.unroute_net(net);
                    self.clk_nets.push(net);
                    self.targets.clock_nets += 1;
                } else {
                    self.targets.not_needing_routing += 1;
                    self.sink.emit(
                        Diagnostic::error(
                            DiagnosticCode::new(Category::Route, 10),
                            "incomplete clock net",
                        )
                        .with_subject(self.design.nets.get(net).name.clone()),
                    );
                }
            } else if is_static {
                let sinks = self.design.sink_pins(net);
                if sinks.is_empty() {
                    self.preserve_net(net);
                    self.targets.not_needing_routing += 1;
                } else {
                    for &pin in &sinks {
                        if let Some(node) =
                            helper::spi_connected_node(self.design, self.device, pin)
                        {
                            self.preserve_node(node, net);
                        }
                    }
                    self.static_targets.push((net, sinks));
                    self.targets.static_nets += 1;
                }
            } else if self.design.nets.get(net).source.is_some()
                && !self.design.sink_pins(net).is_empty()
            {
                self.design.unroute_net(net);
                self.targets.wire_nets += 1;
                self.initialize_net(net)?;
            } else if self.design.is_driver_less(net) || self.design.is_load_less(net) {
                self.preserve_net(net);
                self.targets.not_needing_routing += 1;
            } else {
                // No pins at all: routed inside a site, preserved as-is.
                self.preserve_net(net);
                self.targets.not_needing_routing += 1;
            }
        }
        Ok(())
    }

    fn preserve_net(&mut self, net: PhysNetId) {
        for node in helper::nodes_of_net(self.design, self.device, net) {
            self.preserve_node(node, net);
        }
        self.targets.preserved_nets += 1;
    }

    fn preserve_node(&mut self, node: fabric_device::NodeId, net: PhysNetId) {
        if let Some(previous) = self.graph.preserve(node, net) {
            let name = self.design.nets.get(net).name.clone();
            let previous_name = self.design.nets.get(previous).name.clone();
            self.sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Route, 11),
                    format!("conflicting preserved node: {name} vs {previous_name}"),
                )
                .with_subject(self.device.node_name(node)),
            );
        }
    }

    /// Wraps one signal net and creates a connection per sink.
    fn initialize_net(&mut self, net: PhysNetId) -> FabricResult<NetWrapId> {
        let wrap_id = NetWrapId::from_raw(self.nets.len() as u32);
        let mut wrapper = NetWrapper::new(wrap_id, net);
        let net_name = self.design.nets.get(net).name.clone();
        let mut source = self.design.nets.get(net).source.ok_or_else(|| {
            InternalError::DriverlessNet {
                net: net_name.clone(),
            }
        })?;
        let mut source_rnode: Option<RnodeId> = None;
        let mut source_node = None;

        for sink_pin in self.design.sink_pins(net) {
            if helper::is_external_cout_to_cin(self.design, source, sink_pin) {
                source = self.design.nets.get(net).alt_source.ok_or_else(|| {
                    InternalError::MissingAlternateSource {
                        net: net_name.clone(),
                    }
                })?;
                source_rnode = None;
                source_node = None;
            }
            let cid = ConnectionId::from_raw(self.connections.len() as u32);
            let mut conn = Connection::new(cid, wrap_id, source, sink_pin);

            let sink_node = helper::spi_connected_node(self.design, self.device, sink_pin)
                .ok_or_else(|| InternalError::UnconnectedSitePin {
                    pin: self.design.pin_display(sink_pin),
                })?;
            let projection = helper::project_input_to_int(self.device, sink_node);
            if projection.is_empty() {
                conn.direct = true;
                self.direct.push(cid);
                self.targets.direct_connections += 1;
            } else {
                let sink_int = projection[0];
                let (sink_rnode, created) =
                    self.graph
                        .intern(self.device, sink_int, RnodeType::PinfeedI);
                if created {
                    self.set_rnode_delay(sink_rnode);
                } else if self.graph.get(sink_rnode).rtype == RnodeType::PinfeedI {
                    self.sink.emit(
                        Diagnostic::warning(
                            DiagnosticCode::new(Category::Route, 12),
                            format!(
                                "conflicting node connected to sink {}",
                                self.design.pin_display(sink_pin)
                            ),
                        )
                        .with_subject(self.device.node_name(sink_int)),
                    );
                }
                conn.sink_rnode = Some(sink_rnode);

                if source_rnode.is_none() {
                    let src_pin_node =
                        helper::spi_connected_node(self.design, self.device, source)
                            .ok_or_else(|| InternalError::UnconnectedSitePin {
                                pin: self.design.pin_display(source),
                            })?;
                    let projected = helper::project_output_to_int(self.device, src_pin_node)
                        .ok_or_else(|| InternalError::UnprojectableSource {
                            net: net_name.clone(),
                        })?;
                    let (rnode, created) =
                        self.graph
                            .intern(self.device, projected, RnodeType::PinfeedO);
                    if created {
                        self.set_rnode_delay(rnode);
                    }
                    source_rnode = Some(rnode);
                    source_node = Some(projected);
                }
                conn.source_rnode = source_rnode;
                conn.cross_slr = self.device.slr_of(source_node.unwrap())
                    != self.device.slr_of(sink_int);
                let (sx, sy) = {
                    let r = self.graph.get(source_rnode.unwrap());
                    (r.x, r.y)
                };
                let (tx, ty) = {
                    let r = self.graph.get(sink_rnode);
                    (r.x, r.y)
                };
                conn.hpwl = ((sx - tx).abs() + 1 + (sy - ty).abs() + 1) as u16;
                self.indirect.push(cid);
                self.targets.connections += 1;
            }
            wrapper.connections.push(cid);
            self.connections.push(conn);
        }

        let has_indirect = wrapper
            .connections
            .iter()
            .any(|&c| !self.connections[c.as_raw() as usize].direct);
        if has_indirect {
            wrapper.compute_center_and_hpwl(&self.graph, &self.connections);
            if self.config.use_bounding_box {
                for &cid in &wrapper.connections {
                    let conn = &self.connections[cid.as_raw() as usize];
                    if conn.direct {
                        continue;
                    }
                    let src = self.graph.get(conn.source_rnode.unwrap());
                    let snk = self.graph.get(conn.sink_rnode.unwrap());
                    let bbox = BBox::around(
                        (src.x, src.y),
                        (snk.x, snk.y),
                        self.config.bounding_box_extension,
                    );
                    self.connections[cid.as_raw() as usize].bbox = Some(bbox);
                }
            }
        }
        self.nets.push(wrapper);
        Ok(wrap_id)
    }

    fn set_rnode_delay(&mut self, rnode: RnodeId) {
        let node = self.graph.get(rnode).node;
        let mut delay = match self.adapters.estimator {
            Some(estimator) if self.timing_driven => estimator.delay_of(self.device, node),
            _ => 0,
        };
        if self.config.mask_cross_rclk
            && !self.config.use_u_turn_nodes
            && self.device.crosses_rclk(node)
        {
            delay = 10_500;
        }
        self.graph.get_mut(rnode).delay = delay;
    }

    // --- Phases ---

    fn route(&mut self) -> FabricResult<RouteReport> {
        self.route_global_clk_nets();
        self.route_static_nets();
        self.pre_routing_estimation();
        self.route_indirect_connections()?;
        self.route_direct_connections();
        let fixed_sinks = self.post_route_process();
        if let (true, Some(timing)) = (self.timing_driven, self.adapters.timing.as_deref_mut()) {
            timing.patch_up_delays(&fixed_sinks);
        }
        let pip_conflicts = self.assign_pips();
        Ok(self.finish(pip_conflicts))
    }

    fn route_global_clk_nets(&mut self) {
        if self.clk_nets.is_empty() {
            return;
        }
        let clk_nets = self.clk_nets.clone();
        if self.adapters.clock.is_none() {
            self.sink.emit(Diagnostic::warning(
                DiagnosticCode::new(Category::Route, 13),
                format!(
                    "{} clock nets present but no clock router supplied",
                    clk_nets.len()
                ),
            ));
            return;
        }
        let mut routed = Vec::new();
        {
            let clock = self.adapters.clock.as_deref_mut().unwrap();
            for &net in &clk_nets {
                let used = clock.route_clk(
                    self.design,
                    self.device,
                    net,
                    self.config.symmetric_clk_routing,
                );
                routed.push((net, used));
            }
        }
        for (net, used) in routed {
            for node in used {
                self.preserve_node(node, net);
            }
            self.preserve_net(net);
        }
    }

    fn route_static_nets(&mut self) {
        if self.static_targets.is_empty() {
            return;
        }
        tools::invert_gnd_pins_to_vcc(self.design, self.device);

        // The nodes reserved for the static sinks themselves are now fair
        // game for the static router.
        let static_targets = self.static_targets.clone();
        for (_, sinks) in &static_targets {
            for &pin in sinks {
                if let Some(node) = helper::spi_connected_node(self.design, self.device, pin) {
                    self.graph.unpreserve(node);
                }
            }
        }

        if self.adapters.statics.is_none() {
            self.sink.emit(Diagnostic::warning(
                DiagnosticCode::new(Category::Route, 14),
                format!(
                    "{} static nets present but no static-net router supplied",
                    static_targets.len()
                ),
            ));
            return;
        }

        let mut unavailable: HashSet<fabric_device::NodeId> =
            self.graph.preserved_nodes().into_iter().collect();
        unavailable.extend(self.graph.interned_nodes());
        let mut routed = Vec::new();
        {
            let statics = self.adapters.statics.as_deref_mut().unwrap();
            for (net, _) in static_targets {
                let spi_nodes = statics.route_static(self.design, self.device, net, &unavailable);
                for nodes in spi_nodes.values() {
                    unavailable.extend(nodes.iter().copied());
                }
                routed.push((net, spi_nodes));
            }
        }
        for (net, spi_nodes) in routed {
            for (pin, nodes) in spi_nodes {
                self.design.pins.get_mut(pin).routed = true;
                for node in nodes {
                    self.preserve_node(node, net);
                }
            }
        }
    }

    /// Seeds every connection's timing edges with a cheap estimate before
    /// the first iteration; swaps blocked output pins on the way.
    fn pre_routing_estimation(&mut self) {
        if !self.timing_driven {
            return;
        }
        for cid in self.indirect.clone() {
            let (mut source_rnode, net) = {
                let conn = &self.connections[cid.as_raw() as usize];
                (conn.source_rnode.unwrap(), conn.net)
            };
            let phys = self.nets[net.as_raw() as usize].net;
            if self
                .graph
                .children(self.device, source_rnode, Some(phys))
                .is_empty()
            {
                // Output pin is blocked.
                self.swap_output_pin(cid);
                source_rnode = self.connections[cid.as_raw() as usize]
                    .source_rnode
                    .unwrap();
            }
            let children = self.graph.children(self.device, source_rnode, Some(phys));
            let mut est: i32 = 10_000;
            for child in children {
                let child_delay = EST_BASE_DELAY_PS as i32 + self.graph.get(child).delay as i32;
                est = est.min(child_delay);
            }
            est += self.graph.get(source_rnode).delay as i32;
            let sink_pin = self.connections[cid.as_raw() as usize].sink;
            if let Some(timing) = self.adapters.timing.as_deref_mut() {
                timing.set_route_delay(sink_pin, est as f32);
            }
        }
        self.update_timing(false);
        self.diag(
            2,
            format!("estimated pre-routing max delay: {:.0} ps", self.max_delay),
        );
    }

    fn route_indirect_connections(&mut self) -> FabricResult<()> {
        self.sort_connections();
        self.present_factor = self.config.initial_present_factor;
        self.timing_weight = self.config.timing_weight;

        let mut outcome_break = false;
        for iteration in 1..=self.config.max_iterations {
            self.iteration = iteration;
            self.connections_routed_iteration = 0;
            if self.timing_driven {
                self.set_reroute_criticality();
            }
            for cid in self.sorted.clone() {
                if self.should_route(cid) {
                    self.route_connection(cid)?;
                }
            }
            if self.timing_driven {
                self.update_timing(true);
            }
            let overused = self.update_cost_factors();
            self.iterations.push(IterationReport {
                iteration,
                connections_routed: self.connections_routed_iteration,
                rnodes_created: self.graph.len(),
                overused,
                max_delay_ps: self.max_delay as i16,
            });
            if self.config.verbose {
                self.diag(
                    3,
                    format!(
                        "iteration {iteration}: {} connections routed, {} rnodes, \
                         {overused} overused",
                        self.connections_routed_iteration,
                        self.graph.len(),
                    ),
                );
            }
            if overused == 0 {
                let unrouted = self.unrouted_connections();
                if unrouted.is_empty() {
                    outcome_break = true;
                    break;
                } else if iteration == self.config.max_iterations - 1 {
                    self.sink.emit(Diagnostic::error(
                        DiagnosticCode::new(Category::Route, 15),
                        format!("{} unroutable connections", unrouted.len()),
                    ));
                }
            }
        }
        if !outcome_break {
            let unrouted = self.unrouted_connections().len();
            let overused = self.iterations.last().map(|it| it.overused).unwrap_or(0);
            self.sink.emit(Diagnostic::error(
                DiagnosticCode::new(Category::Route, 16),
                format!(
                    "routing terminated after {} iterations: {unrouted} unrouted \
                     connections, {overused} conflicting nodes",
                    self.iteration
                ),
            ));
        }
        Ok(())
    }

    fn route_direct_connections(&mut self) {
        for cid in self.direct.clone() {
            let (source, sink_pin) = {
                let conn = &self.connections[cid.as_raw() as usize];
                (conn.source, conn.sink)
            };
            let src_node = helper::spi_connected_node(self.design, self.device, source);
            let snk_node = helper::spi_connected_node(self.design, self.device, sink_pin);
            let (Some(src_node), Some(snk_node)) = (src_node, snk_node) else {
                continue;
            };
            let path = helper::find_path_between_nodes(self.device, src_node, snk_node);
            if path.is_empty() && src_node != snk_node {
                self.sink.emit(
                    Diagnostic::error(
                        DiagnosticCode::new(Category::Route, 17),
                        "failed to route direct connection",
                    )
                    .with_subject(self.design.pin_display(sink_pin)),
                );
            } else {
                self.connections[cid.as_raw() as usize].nodes = path;
                self.design.pins.get_mut(sink_pin).routed = true;
            }
        }
    }

    // --- The iteration body ---

    fn sort_connections(&mut self) {
        let mut sorted = self.indirect.clone();
        sorted.sort_by(|&a, &b| {
            let ca = &self.connections[a.as_raw() as usize];
            let cb = &self.connections[b.as_raw() as usize];
            let fa = self.nets[ca.net.as_raw() as usize].connections.len();
            let fb = self.nets[cb.net.as_raw() as usize].connections.len();
            fb.cmp(&fa).then(ca.hpwl.cmp(&cb.hpwl))
        });
        self.sorted = sorted;
    }

    fn should_route(&mut self, cid: ConnectionId) -> bool {
        if self.iteration == 1 {
            return true;
        }
        let conn = &self.connections[cid.as_raw() as usize];
        if conn.criticality > self.min_reroute_criticality {
            return true;
        }
        let congested = conn.congested(&self.graph);
        let unrouted = !self.design.pins.get(conn.sink).routed;
        if congested || unrouted {
            if self.config.enlarge_bounding_box {
                self.connections[cid.as_raw() as usize]
                    .enlarge_bbox(self.config.enlarge_bbox_h, self.config.enlarge_bbox_v);
            }
            true
        } else {
            false
        }
    }

    /// Caps the number of re-routed critical connections by raising the
    /// criticality floor when too many qualify.
    fn set_reroute_criticality(&mut self) {
        self.min_reroute_criticality = self.config.min_reroute_criticality;
        let cap =
            (self.indirect.len() as f32 * 0.01 * self.config.reroute_percentage) as usize;
        let mut critical: Vec<f32> = self
            .indirect
            .iter()
            .map(|&c| self.connections[c.as_raw() as usize].criticality)
            .filter(|&c| c > self.min_reroute_criticality)
            .collect();
        if critical.len() > cap {
            critical.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            self.min_reroute_criticality = critical[cap];
        }
    }

    fn route_connection(&mut self, cid: ConnectionId) -> FabricResult<()> {
        self.rip_up(cid);
        self.connections_routed += 1;
        self.connections_routed_iteration += 1;
        self.connections[cid.as_raw() as usize].reset_route();

        let (sink_rnode, weights) = {
            let conn = &self.connections[cid.as_raw() as usize];
            let weights = SearchWeights::for_connection(
                conn.criticality,
                self.config.share_exponent,
                self.config.wl_weight,
                self.timing_weight,
                self.present_factor,
                self.config.use_bounding_box,
                self.timing_driven,
            );
            (conn.sink_rnode.unwrap(), weights)
        };
        self.graph.get_mut(sink_rnode).is_target = true;

        let conn = &self.connections[cid.as_raw() as usize];
        let net = &self.nets[conn.net.as_raw() as usize];
        let success = self.search.run(
            &mut self.graph,
            self.device,
            self.adapters.estimator,
            conn,
            net,
            &weights,
        );

        self.graph.get_mut(sink_rnode).is_target = false;
        if success {
            self.save_routing(cid)?;
            self.search.reset_expansion(&mut self.graph);
            self.update_users_and_present_cost(cid);
            let sink_pin = self.connections[cid.as_raw() as usize].sink;
            self.design.pins.get_mut(sink_pin).routed = true;
            if self.timing_driven {
                self.update_route_delay(cid);
            }
        } else {
            self.search.reset_expansion(&mut self.graph);
            let sink_pin = self.connections[cid.as_raw() as usize].sink;
            self.design.pins.get_mut(sink_pin).routed = false;
            self.sink.emit(
                Diagnostic::warning(
                    DiagnosticCode::new(Category::Route, 18),
                    format!("unroutable connection in iteration {}", self.iteration),
                )
                .with_subject(self.design.pin_display(sink_pin)),
            );
            self.handle_unroutable_connection(cid);
        }
        Ok(())
    }

    fn save_routing(&mut self, cid: ConnectionId) -> FabricResult<()> {
        let (sink_rnode, source_rnode, sink_pin) = {
            let conn = &self.connections[cid.as_raw() as usize];
            (conn.sink_rnode.unwrap(), conn.source_rnode.unwrap(), conn.sink)
        };
        let mut route = Vec::new();
        let mut cur = Some(sink_rnode);
        while let Some(rnode) = cur {
            route.push(rnode);
            cur = self.graph.get(rnode).prev;
        }
        // A successful search always leaves a chain ending at the pushed
        // source; anything else is corrupt search state.
        if route.last() != Some(&source_rnode) {
            return Err(InternalError::BrokenRouteTrace {
                sink: self.design.pin_display(sink_pin),
            });
        }
        self.connections[cid.as_raw() as usize].rnodes = route;
        Ok(())
    }

    /// Releases a connection's current route from the congestion state.
    fn rip_up(&mut self, cid: ConnectionId) {
        let (route, source, old_source) = {
            let conn = &self.connections[cid.as_raw() as usize];
            let net = &self.nets[conn.net.as_raw() as usize];
            (conn.rnodes.clone(), conn.source, net.old_source)
        };
        let mut parent: Option<RnodeId> = None;
        for i in (0..route.len()).rev() {
            let rid = route[i];
            let rnode = self.graph.get_mut(rid);
            rnode.remove_user(source);
            if let Some(old) = old_source {
                rnode.remove_user(old);
            }
            if let Some(p) = parent {
                rnode.remove_parent(p);
            }
            parent = Some(rid);
            let present_factor = self.present_factor;
            self.graph.get_mut(rid).update_present_cost(present_factor);
        }
    }

    /// Records a fresh route on the congestion state.
    fn update_users_and_present_cost(&mut self, cid: ConnectionId) {
        let (route, source) = {
            let conn = &self.connections[cid.as_raw() as usize];
            (conn.rnodes.clone(), conn.source)
        };
        let mut parent: Option<RnodeId> = None;
        for i in (0..route.len()).rev() {
            let rid = route[i];
            let rnode = self.graph.get_mut(rid);
            rnode.add_user(source);
            if let Some(p) = parent {
                rnode.add_parent(p);
            }
            parent = Some(rid);
            let present_factor = self.present_factor;
            self.graph.get_mut(rid).update_present_cost(present_factor);
        }
    }

    fn update_route_delay(&mut self, cid: ConnectionId) {
        let route = self.connections[cid.as_raw() as usize].rnodes.clone();
        let mut delay = 0.0f32;
        for i in (0..route.len()).rev() {
            let rnode = self.graph.get(route[i]);
            let mut extra = 0;
            if i + 1 < route.len() {
                let parent = self.graph.get(route[i + 1]);
                let parent_long = self.device.intent_code(parent.node).is_long();
                if let Some(estimator) = self.adapters.estimator {
                    extra = estimator.extra_delay(self.device, rnode.node, parent_long);
                }
            }
            delay += rnode.delay as f32 + extra as f32;
        }
        let sink_pin = self.connections[cid.as_raw() as usize].sink;
        if let Some(timing) = self.adapters.timing.as_deref_mut() {
            timing.set_route_delay(sink_pin, delay);
        }
    }

    fn update_timing(&mut self, grow_weight: bool) {
        let Some(timing) = self.adapters.timing.as_deref_mut() else {
            return;
        };
        if grow_weight {
            self.timing_weight = (self.timing_weight * self.config.timing_multiplier).min(1.0);
        }
        let (max_delay, _critical_vertex) = timing.arrival_require_times();
        self.max_delay = max_delay;
        for &cid in &self.indirect {
            let conn = &mut self.connections[cid.as_raw() as usize];
            conn.criticality = timing.criticality(
                conn.sink,
                MAX_CRITICALITY,
                self.config.criticality_exponent,
                max_delay,
            );
        }
    }

    fn update_cost_factors(&mut self) -> usize {
        if self.iteration == 1 {
            self.present_factor = self.config.initial_present_factor;
        } else {
            self.present_factor *= self.config.present_multiplier;
        }
        cost::update_costs(
            &mut self.graph,
            self.present_factor,
            self.config.historical_factor,
        )
        .len()
    }

    fn unrouted_connections(&self) -> Vec<ConnectionId> {
        self.indirect
            .iter()
            .copied()
            .filter(|&c| {
                let sink = self.connections[c.as_raw() as usize].sink;
                !self.design.pins.get(sink).routed
            })
            .collect()
    }

    // --- Unroutable-connection handling ---

    fn handle_unroutable_connection(&mut self, cid: ConnectionId) {
        if self.iteration == 1 {
            let has_alt = self.swap_output_pin(cid);
            if !has_alt && self.config.soft_preserve {
                self.unroute_reserved_nets(cid);
            }
        } else if self.iteration == 2 && self.config.soft_preserve {
            self.unroute_reserved_nets(cid);
        }
    }

    /// Replaces the net's source pin with its legal alternative output
    /// and re-targets all the net's connections.
    fn swap_output_pin(&mut self, cid: ConnectionId) -> bool {
        let wrap_id = self.connections[cid.as_raw() as usize].net;
        let phys = self.nets[wrap_id.as_raw() as usize].net;
        let Some(alt_name) = tools::legal_alternative_output_pin(self.design, self.device, phys)
        else {
            self.diag(4, "no alternative source to swap".into());
            return false;
        };
        let old_source = self.design.nets.get(phys).source;
        let Some(alt_pin) =
            tools::route_alternative_output_site_pin(self.design, self.device, phys, &alt_name)
        else {
            return false;
        };
        tools::swap_source(self.design, phys);
        self.diag(
            5,
            format!(
                "swapped source of net '{}' to {}",
                self.design.nets.get(phys).name,
                self.design.pin_display(alt_pin)
            ),
        );

        let src_pin_node = helper::spi_connected_node(self.design, self.device, alt_pin);
        let projected =
            src_pin_node.and_then(|n| helper::project_output_to_int(self.device, n));
        let Some(projected) = projected else {
            return false;
        };
        let (source_rnode, created) =
            self.graph
                .intern(self.device, projected, RnodeType::PinfeedO);
        if created {
            self.set_rnode_delay(source_rnode);
        }

        let wrapper = &mut self.nets[wrap_id.as_raw() as usize];
        wrapper.source_changed = true;
        wrapper.old_source = old_source;
        for cid2 in wrapper.connections.clone() {
            let conn = &mut self.connections[cid2.as_raw() as usize];
            if conn.direct {
                continue;
            }
            conn.source = alt_pin;
            conn.source_rnode = Some(source_rnode);
        }
        true
    }

    /// Soft-preserve rip-up: releases preserved nets crowding the failed
    /// connection's endpoints and turns them into routing targets.
    fn unroute_reserved_nets(&mut self, cid: ConnectionId) -> usize {
        let (sink_rnode, source_rnode) = {
            let conn = &self.connections[cid.as_raw() as usize];
            (conn.sink_rnode.unwrap(), conn.source_rnode.unwrap())
        };
        let mut to_route: BTreeSet<PhysNetId> = BTreeSet::new();
        let sink_node = self.graph.get(sink_rnode).node;
        let source_node = self.graph.get(source_rnode).node;
        for node in self
            .device
            .uphill_nodes(sink_node)
            .into_iter()
            .chain(self.device.downhill_nodes(source_node))
        {
            let Some(owner) = self.graph.preserved_net(node) else {
                continue;
            };
            let n = self.design.nets.get(owner);
            if n.clock || n.is_static() {
                continue;
            }
            to_route.insert(owner);
        }
        if to_route.is_empty() {
            return 0;
        }
        self.diag(6, format!("unrouting {} preserved nets", to_route.len()));

        for net in to_route.iter().copied() {
            let freed = helper::nodes_of_net(self.design, self.device, net);
            for &node in &freed {
                self.graph.unpreserve(node);
            }
            if self.initialize_net(net).is_err() {
                self.sink.emit(
                    Diagnostic::error(
                        DiagnosticCode::new(Category::Route, 19),
                        "failed to re-initialize a ripped-up preserved net",
                    )
                    .with_subject(self.design.nets.get(net).name.clone()),
                );
                continue;
            }
            // Make the freed nodes visible to parents that already
            // expanded their children.
            for &node in &freed {
                let (rid, created) = self.graph.intern(self.device, node, RnodeType::Wire);
                if created {
                    self.set_rnode_delay(rid);
                }
                for uphill in self.device.uphill_nodes(node) {
                    if self.device.is_route_thru(uphill, node) {
                        continue;
                    }
                    if let Some(parent) = self.graph.find(uphill) {
                        self.graph.add_child_if_expanded(parent, rid);
                    }
                }
            }
        }
        self.sort_connections();
        to_route.len()
    }

    // --- Post-route processing ---

    /// Finalizes node lists and legalizes nets with multi-driver nodes.
    /// Returns the sinks of connections whose routes were rewritten.
    fn post_route_process(&mut self) -> Vec<SitePinId> {
        self.assign_nodes_to_connections();
        self.fix_routes()
    }

    fn assign_nodes_to_connections(&mut self) {
        for cid in self.indirect.clone() {
            let (sink_rnode, source_rnode, sink_pin, source_pin, route) = {
                let conn = &self.connections[cid.as_raw() as usize];
                (
                    conn.sink_rnode.unwrap(),
                    conn.source_rnode.unwrap(),
                    conn.sink,
                    conn.source,
                    conn.rnodes.clone(),
                )
            };
            let mut nodes = Vec::new();
            let sink_pin_node =
                helper::spi_connected_node(self.design, self.device, sink_pin);
            if let Some(sink_pin_node) = sink_pin_node {
                let path = helper::find_path_between_nodes(
                    self.device,
                    self.graph.get(sink_rnode).node,
                    sink_pin_node,
                );
                if path.len() >= 2 {
                    nodes.extend(&path[..path.len() - 1]);
                }
            }
            for &rid in &route {
                nodes.push(self.graph.get(rid).node);
            }
            let source_pin_node =
                helper::spi_connected_node(self.design, self.device, source_pin);
            if let Some(source_pin_node) = source_pin_node {
                let path = helper::find_path_between_nodes(
                    self.device,
                    source_pin_node,
                    self.graph.get(source_rnode).node,
                );
                if path.len() >= 2 {
                    nodes.extend(&path[1..]);
                }
            }
            self.connections[cid.as_raw() as usize].nodes = nodes;
        }
    }

    fn fix_routes(&mut self) -> Vec<SitePinId> {
        let mut fixed_sinks = Vec::new();
        for wrap_idx in 0..self.nets.len() {
            let conns = self.nets[wrap_idx].connections.clone();
            let illegal = conns.iter().any(|&c| {
                let conn = &self.connections[c.as_raw() as usize];
                !conn.direct && conn.uses_multi_driver_rnodes(&self.graph)
            });
            if !illegal {
                continue;
            }
            let mut routes = Vec::new();
            let mut route_conns = Vec::new();
            for &c in &conns {
                if self.connections[c.as_raw() as usize].direct {
                    continue;
                }
                self.rip_up(c);
                routes.push(self.connections[c.as_raw() as usize].nodes.clone());
                route_conns.push(c);
            }
            let graph = &self.graph;
            let delay_of = |node: fabric_device::NodeId| {
                graph
                    .find(node)
                    .map(|r| graph.get(r).delay as f32)
                    .unwrap_or(0.0)
            };
            let mut legalizer = RouteLegalizer::new(&routes, &delay_of);
            legalizer.finalize_routes(self.device, self.adapters.estimator, &mut routes);
            for (i, c) in route_conns.iter().enumerate() {
                self.connections[c.as_raw() as usize].nodes = routes[i].clone();
                fixed_sinks.push(self.connections[c.as_raw() as usize].sink);
            }
        }
        fixed_sinks
    }

    /// Assigns PIPs to every routed net and audits design-wide PIP usage.
    fn assign_pips(&mut self) -> usize {
        for wrap_idx in 0..self.nets.len() {
            let phys = self.nets[wrap_idx].net;
            let mut net_pips: BTreeSet<Pip> = BTreeSet::new();
            for &cid in &self.nets[wrap_idx].connections.clone() {
                let nodes = &self.connections[cid.as_raw() as usize].nodes;
                let (pips, missing) = helper::pips_from_reversed_nodes(self.device, nodes);
                for (driver, load) in missing {
                    self.sink.emit(
                        Diagnostic::error(
                            DiagnosticCode::new(Category::Route, 20),
                            format!(
                                "no PIP connects {} to {}",
                                self.device.node_name(driver),
                                self.device.node_name(load)
                            ),
                        )
                        .with_subject(self.design.nets.get(phys).name.clone()),
                    );
                }
                net_pips.extend(pips);
            }
            self.design.nets.get_mut(phys).pips = net_pips.into_iter().collect();
        }
        self.check_pips_usage()
    }

    fn check_pips_usage(&mut self) -> usize {
        let mut usage: HashMap<Pip, BTreeSet<PhysNetId>> = HashMap::new();
        for (net, n) in self.design.nets.iter() {
            for &pip in &n.pips {
                usage.entry(pip).or_default().insert(net);
            }
        }
        let mut conflicts = 0;
        for (pip, users) in usage {
            if users.len() > 1 {
                conflicts += 1;
                if conflicts <= 10 {
                    let names: Vec<String> = users
                        .iter()
                        .map(|&n| self.design.nets.get(n).name.clone())
                        .collect();
                    self.sink.emit(Diagnostic::error(
                        DiagnosticCode::new(Category::Route, 21),
                        format!(
                            "PIP {} -> {} used by {} nets: {}",
                            self.device.node_name(pip.start),
                            self.device.node_name(pip.end),
                            names.len(),
                            names.join(", ")
                        ),
                    ));
                }
            }
        }
        conflicts
    }

    // --- Final reporting ---

    fn finish(&mut self, pip_conflicts: usize) -> RouteReport {
        let mut total_wirelength = 0u64;
        let mut total_int_nodes = 0u64;
        let mut node_usage: BTreeMap<fabric_device::IntentCode, NodeTypeUsage> = BTreeMap::new();
        for wrapper in &self.nets {
            let mut net_nodes: HashSet<fabric_device::NodeId> = HashSet::new();
            for &cid in &wrapper.connections {
                net_nodes.extend(&self.connections[cid.as_raw() as usize].nodes);
            }
            for node in net_nodes {
                if !self.device.is_int_tile(node) {
                    continue;
                }
                total_int_nodes += 1;
                let length = self.device.length_of(node) as u64;
                total_wirelength += length;
                let entry = node_usage.entry(self.device.intent_code(node)).or_default();
                entry.nodes += 1;
                entry.length += length;
            }
        }

        let unrouted = self.unrouted_connections().len();
        let overused = self.iterations.last().map(|it| it.overused).unwrap_or(0);
        let outcome = if overused > 0 {
            RouteOutcome::ConflictsRemaining(overused)
        } else if unrouted > 0 || pip_conflicts > 0 {
            RouteOutcome::UnroutableRemaining(unrouted)
        } else {
            RouteOutcome::Converged
        };

        RouteReport {
            outcome,
            iterations: std::mem::take(&mut self.iterations),
            targets: self.targets,
            total_wirelength,
            total_int_nodes,
            node_usage,
            rnodes_created: self.graph.len(),
            average_children: self.graph.average_children(),
            nodes_pushed: self.search.pushed,
            nodes_popped: self.search.popped,
            nodes_evaluated: self.search.evaluated,
            connections_routed: self.connections_routed,
            pip_conflicts,
        }
    }
}
