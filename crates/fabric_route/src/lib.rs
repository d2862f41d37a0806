//! Negotiated congestion-aware routing for placed designs.
//!
//! The router turns logical nets into concrete physical routes over the
//! device's routing-resource graph using PathFinder-style negotiation:
//! every iteration rips up and re-routes the connections that are
//! congested, unrouted, or critical, while present- and
//! historical-congestion costs steer them apart. Clock and static nets go
//! through their dedicated collaborators first and stay preserved; routes
//! are legalized into single-driver DAGs and emitted as per-net PIP sets.
//!
//! # Usage
//!
//! ```ignore
//! use fabric_route::{route_design, RouterAdapters, RouterConfig};
//!
//! let report = route_design(&mut design, &device, &RouterConfig::default(),
//!                           RouterAdapters::none(), &sink)?;
//! assert!(report.is_clean());
//! ```

pub mod adapters;
pub mod config;
pub mod cost;
pub mod fixer;
pub mod graph;
pub mod helper;
pub mod netwrap;
pub mod report;
pub mod rnode;
pub mod router;
pub mod search;

pub use adapters::{
    ClockRouter, DelayEstimator, RouterAdapters, StaticNetRouter, TimingModel, UniformDelay,
};
pub use config::{RouterConfig, MAX_CRITICALITY};
pub use fixer::RouteLegalizer;
pub use graph::RoutingGraph;
pub use netwrap::{BBox, Connection, NetWrapper};
pub use report::{IterationReport, RouteOutcome, RouteReport, RouteTargets};
pub use rnode::{ConnectionId, NetWrapId, Rnode, RnodeId, RnodeType};
pub use router::route_design;
pub use search::PathSearch;

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_design::{Design, PhysNetId, SitePinId};
    use fabric_device::{DeviceGraph, MeshDevice, NodeId};
    use fabric_diagnostics::DiagnosticSink;
    use std::collections::{BTreeMap, HashMap, HashSet};

    fn wl_config() -> RouterConfig {
        RouterConfig {
            timing_driven: false,
            ..RouterConfig::default()
        }
    }

    fn add_net(
        design: &mut Design,
        name: &str,
        source: (&str, &str),
        sinks: &[(&str, &str)],
    ) -> PhysNetId {
        let net = design.create_net(name);
        let site = design
            .site_named(source.0)
            .unwrap_or_else(|| design.create_site(source.0, "SLICE"));
        design.create_pin(net, site, source.1, true);
        for (site_name, pin) in sinks {
            let site = design
                .site_named(site_name)
                .unwrap_or_else(|| design.create_site(*site_name, "SLICE"));
            design.create_pin(net, site, *pin, false);
        }
        net
    }

    fn assert_pips_form_routes(design: &Design, mesh: &MeshDevice, net: PhysNetId) {
        // Each sink pin node must be reachable from the source pin node
        // over activated PIPs only.
        let n = design.nets.get(net);
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for pip in &n.pips {
            adjacency.entry(pip.start).or_default().push(pip.end);
        }
        let source = n.source.unwrap();
        let start = helper::spi_connected_node(design, mesh, source).unwrap();
        let mut reachable = HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if !reachable.insert(node) {
                continue;
            }
            if let Some(nexts) = adjacency.get(&node) {
                stack.extend(nexts.iter().copied());
            }
        }
        for sink in design.sink_pins(net) {
            let node = helper::spi_connected_node(design, mesh, sink).unwrap();
            assert!(
                reachable.contains(&node),
                "sink {} unreachable over the net's PIPs",
                design.pin_display(sink)
            );
        }
    }

    #[test]
    fn routes_small_design_to_convergence() {
        let mesh = MeshDevice::new(6, 6);
        let mut design = Design::new("d");
        let n0 = add_net(
            &mut design,
            "n0",
            ("SLICE_X0Y0", "AQ"),
            &[("SLICE_X3Y3", "A1"), ("SLICE_X2Y3", "B2")],
        );
        let n1 = add_net(
            &mut design,
            "n1",
            ("SLICE_X1Y0", "BQ"),
            &[("SLICE_X4Y2", "C3")],
        );

        let sink = DiagnosticSink::new();
        let report = route_design(
            &mut design,
            &mesh,
            &wl_config(),
            RouterAdapters::none(),
            &sink,
        )
        .unwrap();

        assert_eq!(report.outcome, RouteOutcome::Converged);
        assert!(report.is_clean());
        assert_eq!(report.targets.wire_nets, 2);
        assert_eq!(report.targets.connections, 3);
        assert!(report.total_wirelength > 0);
        for net in [n0, n1] {
            assert!(design.nets.get(net).has_pips());
            for pin in design.sink_pins(net) {
                assert!(design.pins.get(pin).routed);
            }
            assert_pips_form_routes(&design, &mesh, net);
        }
    }

    #[test]
    fn fanout_shares_the_source_stub() {
        let mesh = MeshDevice::new(6, 6);
        let mut design = Design::new("d");
        let net = add_net(
            &mut design,
            "fan",
            ("SLICE_X2Y2", "AQ"),
            &[
                ("SLICE_X0Y2", "A1"),
                ("SLICE_X4Y2", "A1"),
                ("SLICE_X2Y4", "A1"),
            ],
        );

        let sink = DiagnosticSink::new();
        let report = route_design(
            &mut design,
            &mesh,
            &wl_config(),
            RouterAdapters::none(),
            &sink,
        )
        .unwrap();
        assert!(report.is_clean());
        assert_pips_form_routes(&design, &mesh, net);

        // No PIP appears twice within the net.
        let pips = &design.nets.get(net).pips;
        let unique: HashSet<_> = pips.iter().collect();
        assert_eq!(unique.len(), pips.len());
    }

    #[test]
    fn congestion_negotiation_separates_nets() {
        // Four nets leaving the same source tile for the same sink tile:
        // more demand on the corridor wires than any of them can carry,
        // resolvable only by negotiating detours.
        let mesh = MeshDevice::new(8, 8);
        let mut design = Design::new("d");
        let mut nets = Vec::new();
        for (i, letter) in ['A', 'B', 'C', 'D'].into_iter().enumerate() {
            nets.push(add_net(
                &mut design,
                &format!("bus{i}"),
                ("SLICE_X0Y3", &format!("{letter}Q")),
                &[("SLICE_X6Y3", &format!("{letter}1"))],
            ));
        }

        let sink = DiagnosticSink::new();
        let report = route_design(
            &mut design,
            &mesh,
            &wl_config(),
            RouterAdapters::none(),
            &sink,
        )
        .unwrap();
        assert!(report.is_clean(), "outcome: {:?}", report.outcome);

        // PIP exclusivity across nets.
        let mut seen: HashMap<fabric_device::Pip, PhysNetId> = HashMap::new();
        for &net in &nets {
            for &pip in &design.nets.get(net).pips {
                if let Some(&other) = seen.get(&pip) {
                    panic!(
                        "PIP shared between nets {} and {}",
                        design.nets.get(other).name,
                        design.nets.get(net).name
                    );
                }
                seen.insert(pip, net);
            }
        }
    }

    #[test]
    fn routing_is_deterministic() {
        let run = || {
            let mesh = MeshDevice::new(6, 6);
            let mut design = Design::new("d");
            for i in 0..3 {
                let src = format!("SLICE_X0Y{i}");
                let dst = format!("SLICE_X4Y{}", 4 - i);
                add_net(&mut design, &format!("n{i}"), (&src, "AQ"), &[(&dst, "A1")]);
            }
            let sink = DiagnosticSink::new();
            route_design(
                &mut design,
                &mesh,
                &wl_config(),
                RouterAdapters::none(),
                &sink,
            )
            .unwrap();
            let mut all: Vec<(String, Vec<(u32, u32)>)> = Vec::new();
            for (_, net) in design.nets.iter() {
                all.push((
                    net.name.clone(),
                    net.pips
                        .iter()
                        .map(|p| (p.start.as_raw(), p.end.as_raw()))
                        .collect(),
                ));
            }
            all
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn reroute_of_converged_design_is_stable() {
        let mesh = MeshDevice::new(6, 6);
        let mut design = Design::new("d");
        add_net(
            &mut design,
            "n0",
            ("SLICE_X0Y0", "AQ"),
            &[("SLICE_X3Y3", "A1")],
        );
        let sink = DiagnosticSink::new();
        let cfg = wl_config();
        route_design(&mut design, &mesh, &cfg, RouterAdapters::none(), &sink).unwrap();
        let first: Vec<_> = design
            .nets
            .iter()
            .map(|(_, n)| n.pips.clone())
            .collect();
        route_design(&mut design, &mesh, &cfg, RouterAdapters::none(), &sink).unwrap();
        let second: Vec<_> = design
            .nets
            .iter()
            .map(|(_, n)| n.pips.clone())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn driverless_and_loadless_nets_are_preserved() {
        let mesh = MeshDevice::new(4, 4);
        let mut design = Design::new("d");
        let loadless = design.create_net("loadless");
        let site = design.create_site("SLICE_X0Y0", "SLICE");
        design.create_pin(loadless, site, "CQ", true);
        let driverless = design.create_net("driverless");
        design.create_pin(driverless, site, "D1", false);

        let sink = DiagnosticSink::new();
        let report = route_design(
            &mut design,
            &mesh,
            &wl_config(),
            RouterAdapters::none(),
            &sink,
        )
        .unwrap();
        assert_eq!(report.targets.wire_nets, 0);
        assert_eq!(report.targets.not_needing_routing, 2);
        assert_eq!(report.outcome, RouteOutcome::Converged);
    }

    struct StubTiming {
        delays: HashMap<SitePinId, f32>,
    }

    impl TimingModel for StubTiming {
        fn set_route_delay(&mut self, sink: SitePinId, delay_ps: f32) {
            self.delays.insert(sink, delay_ps);
        }

        fn arrival_require_times(&mut self) -> (f32, String) {
            let max = self.delays.values().cloned().fold(1.0f32, f32::max);
            (max, "stub".into())
        }

        fn criticality(
            &mut self,
            sink: SitePinId,
            max_criticality: f32,
            exponent: f32,
            max_delay_ps: f32,
        ) -> f32 {
            let delay = self.delays.get(&sink).copied().unwrap_or(0.0);
            ((delay / max_delay_ps).powf(exponent) * max_criticality).min(max_criticality)
        }
    }

    #[test]
    fn timing_driven_run_reports_delays() {
        let mesh = MeshDevice::new(6, 6);
        let mut design = Design::new("d");
        add_net(
            &mut design,
            "n0",
            ("SLICE_X0Y0", "AQ"),
            &[("SLICE_X4Y4", "A1")],
        );
        add_net(
            &mut design,
            "n1",
            ("SLICE_X1Y0", "BQ"),
            &[("SLICE_X2Y1", "B1")],
        );

        let estimator = UniformDelay;
        let mut timing = StubTiming {
            delays: HashMap::new(),
        };
        let adapters = RouterAdapters {
            estimator: Some(&estimator),
            timing: Some(&mut timing),
            clock: None,
            statics: None,
        };
        let sink = DiagnosticSink::new();
        let report = route_design(
            &mut design,
            &mesh,
            &RouterConfig::default(),
            adapters,
            &sink,
        )
        .unwrap();
        assert!(report.is_clean());
        assert!(report.iterations.last().unwrap().max_delay_ps > 0);
        // The long connection accumulated more delay than the short one.
        let delays: Vec<f32> = timing.delays.values().cloned().collect();
        assert_eq!(delays.len(), 2);
        assert!(delays.iter().cloned().fold(0.0f32, f32::max) > 200.0);
    }

    #[test]
    fn missing_timing_adapters_downgrade_gracefully() {
        let mesh = MeshDevice::new(4, 4);
        let mut design = Design::new("d");
        add_net(
            &mut design,
            "n0",
            ("SLICE_X0Y0", "AQ"),
            &[("SLICE_X2Y2", "A1")],
        );
        let sink = DiagnosticSink::new();
        // timing_driven defaults to true; without adapters the router
        // falls back and still converges.
        let report = route_design(
            &mut design,
            &mesh,
            &RouterConfig::default(),
            RouterAdapters::none(),
            &sink,
        )
        .unwrap();
        assert!(report.is_clean());
        assert!(!sink.has_errors());
    }

    struct StubStatics;

    impl StaticNetRouter for StubStatics {
        fn route_static(
            &mut self,
            design: &mut Design,
            device: &dyn DeviceGraph,
            net: PhysNetId,
            unavailable: &HashSet<NodeId>,
        ) -> BTreeMap<SitePinId, Vec<NodeId>> {
            // Claim each sink's input mux; a real static router walks the
            // fabric from tie-off sources.
            let mut out = BTreeMap::new();
            for pin in design.sink_pins(net) {
                let node = helper::spi_connected_node(design, device, pin).unwrap();
                let imux = device.uphill_nodes(node)[0];
                assert!(!unavailable.contains(&imux));
                out.insert(pin, vec![imux, node]);
            }
            out
        }
    }

    #[test]
    fn static_nets_route_first_and_stay_preserved() {
        let mesh = MeshDevice::new(4, 4);
        let mut design = Design::new("d");
        let gnd = design.gnd_net();
        let site = design.create_site("SLICE_X1Y1", "SLICE");
        design.create_pin(gnd, site, "G1", false);
        add_net(
            &mut design,
            "n0",
            ("SLICE_X0Y0", "AQ"),
            &[("SLICE_X2Y2", "A1")],
        );

        let mut statics = StubStatics;
        let adapters = RouterAdapters {
            estimator: None,
            timing: None,
            clock: None,
            statics: Some(&mut statics),
        };
        let sink = DiagnosticSink::new();
        let report = route_design(&mut design, &mesh, &wl_config(), adapters, &sink).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.targets.static_nets, 1);
        for pin in design.sink_pins(gnd) {
            assert!(design.pins.get(pin).routed);
        }
        // The signal net stays off the GND sink's input mux.
        let gnd_imux = {
            let pin = design.sink_pins(gnd)[0];
            let node = helper::spi_connected_node(&design, &mesh, pin).unwrap();
            mesh.uphill_nodes(node)[0]
        };
        let signal = design.net_named("n0").unwrap();
        for pip in &design.nets.get(signal).pips {
            assert_ne!(pip.end, gnd_imux);
            assert_ne!(pip.start, gnd_imux);
        }
    }

    #[test]
    fn soft_preserve_rips_up_blocking_net() {
        let mesh = MeshDevice::new(4, 4);
        let mut design = Design::new("d");
        // The blocker owns every input mux of the sink tile, so the
        // victim cannot finish without ripping it up.
        let blocker = design.create_net("blocker");
        let bsite = design.create_site("SLICE_X2Y2", "SLICE");
        design.create_pin(blocker, bsite, "HQ", true);
        let victim_sink_node = mesh.find_node("SLICE_X2Y2.A1").unwrap();
        let victim_imux = mesh.uphill_nodes(victim_sink_node)[0];
        // Present the blocker as an already-routed net: one pin, plus a
        // PIP touching the victim's input mux, so its preserved nodes
        // cover the sink's uphill.
        let bounce = mesh.find_node("INT_X2Y2/BOUNCE").unwrap();
        design
            .nets
            .get_mut(blocker)
            .pips
            .push(fabric_device::Pip::new(bounce, victim_imux));

        add_net(
            &mut design,
            "victim",
            ("SLICE_X0Y0", "AQ"),
            &[("SLICE_X2Y2", "A1")],
        );

        let sink = DiagnosticSink::new();
        let cfg = RouterConfig {
            soft_preserve: true,
            ..wl_config()
        };
        let report = route_design(&mut design, &mesh, &cfg, RouterAdapters::none(), &sink).unwrap();
        let victim = design.net_named("victim").unwrap();
        for pin in design.sink_pins(victim) {
            assert!(design.pins.get(pin).routed, "victim sink must route");
        }
        assert!(report.is_clean(), "outcome: {:?}", report.outcome);
    }
}
