//! ECO error kinds.
//!
//! Invalid input and policy refusals surface immediately, before any
//! partial mutation where possible; structural inconsistencies abort
//! loudly rather than patching a corrupt physical net.

/// The result type of the ECO operators.
pub type EcoResult<T> = Result<T, EcoError>;

/// Everything an ECO operator can refuse to do.
#[derive(Debug, thiserror::Error)]
pub enum EcoError {
    /// A hierarchical pin path did not resolve.
    #[error("unable to find pin '{0}'")]
    PinNotFound(String),

    /// A hierarchical cell path did not resolve.
    #[error("unable to find cell '{0}'")]
    CellNotFound(String),

    /// A hierarchical net path did not resolve.
    #[error("unable to find net '{0}'")]
    NetNotFound(String),

    /// A pin that must be connected is not.
    #[error("pin '{0}' is not connected to a net")]
    PinNotConnected(String),

    /// A second output pin was requested for one net.
    #[error("more than one source pin found on net '{0}'")]
    MultipleSources(String),

    /// A referenced leaf pin has no physical cell behind it.
    #[error("cell corresponding to pin '{0}' not found")]
    MissingPhysicalCell(String),

    /// A shared site pin also serves a pin resolving to a different
    /// parent net (refused unless the instance name is allow-listed).
    #[error(
        "site pin {site_pin} cannot be used to connect to logical pin '{pin}' since it is \
         also connected to pin '{other}'"
    )]
    SharedSitePin {
        /// Display name of the contested site pin.
        site_pin: String,
        /// The pin being connected.
        pin: String,
        /// The other pin already serviced by the site pin.
        other: String,
    },

    /// Intra-site routing could not be established.
    #[error("failed to route intra-site connection {0}")]
    IntraSiteRoute(String),

    /// Intra-site routing could not be removed.
    #[error("failed to unroute intra-site connection {0}")]
    IntraSiteUnroute(String),

    /// No site pin can service the pin.
    #[error("unable to route pin '{0}' out of its site")]
    NoSiteExit(String),

    /// The physical state contradicts the logical netlist.
    #[error("structural inconsistency: {0}")]
    Structural(String),
}
