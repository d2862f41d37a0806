//! Structured diagnostics for the fabric routing and ECO engine.
//!
//! The engine never prints directly: anything a user should see is emitted
//! as a [`Diagnostic`] into a [`DiagnosticSink`]. Diagnostics reference
//! design objects (nets, pins, cells, nodes) by name rather than source
//! locations, since the input is a placed design, not source text.

mod code;
mod diagnostic;
mod severity;
mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use severity::Severity;
pub use sink::DiagnosticSink;
