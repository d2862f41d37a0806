//! Read-only device abstractions for the fabric routing and ECO engine.
//!
//! The engine never builds a device database; it consumes one through the
//! [`DeviceGraph`] trait: an implicit graph of routing-resource nodes
//! (identified by [`NodeId`]) with uphill/downhill adjacency, PIP lookup,
//! intent codes and INT-tile coordinates, plus per-site-type definitions
//! ([`SiteTypeDef`]) describing BELs, sitewires, site pins, and site PIPs.
//!
//! A synthetic [`mesh::MeshDevice`] is provided for tests and examples; real
//! device databases live behind the same trait in external crates.

pub mod graph;
pub mod ids;
pub mod intent;
pub mod mesh;
pub mod site;

pub use graph::{DeviceGraph, Pip};
pub use ids::NodeId;
pub use intent::IntentCode;
pub use mesh::MeshDevice;
pub use site::{BelClass, BelDef, BelPinDef, BelPinRef, PinDir, SitePinDef, SitePipDef, SiteTypeDef};
