//! Result and internal-invariant error types for the fabric engine.

/// The standard result type for fallible internal operations.
///
/// `Ok` contains the result value (which may be partial or degraded after
/// error recovery). `Err` is an [`InternalError`]: a broken invariant of
/// the engine or of the design state handed to it, not a user-facing
/// condition. User-facing conditions are reported through
/// [`DiagnosticSink`](../fabric_diagnostics) and the operation still
/// returns `Ok`.
pub type FabricResult<T> = Result<T, InternalError>;

/// A broken internal invariant of the routing engine.
///
/// None of these can occur on a well-formed placed design; when one does,
/// the engine aborts the operation with context rather than routing on
/// corrupt state.
#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    /// A net reached connection initialization without a source pin,
    /// after classification already required one.
    #[error("net '{net}' has no source pin to route from")]
    DriverlessNet {
        /// The offending net.
        net: String,
    },

    /// A COUT output only reaches CIN; a net leaving COUT for any other
    /// pin must carry an alternate source, and this one does not.
    #[error("no alternate source for the COUT-CIN connection of net '{net}'")]
    MissingAlternateSource {
        /// The net whose source must be swapped.
        net: String,
    },

    /// A site pin instance resolved to no routing-resource node in the
    /// device.
    #[error("{pin} is not wired to any device node")]
    UnconnectedSitePin {
        /// Display name of the pin instance.
        pin: String,
    },

    /// Projecting a source pin toward the interconnect fabric walked off
    /// the device without ever reaching an INT tile.
    #[error("no projected interconnect node for the source of net '{net}'")]
    UnprojectableSource {
        /// The net whose source failed to project.
        net: String,
    },

    /// A freshly routed connection's back-pointer chain did not lead
    /// back to its source rnode.
    #[error("route for sink {sink} does not trace back to its source rnode")]
    BrokenRouteTrace {
        /// Display name of the connection's sink pin.
        sink: String,
    },
}
