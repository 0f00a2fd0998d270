//! Directive translation errors.

use arcstr::ArcStr;
use thiserror::Error as ThisError;

/// The result type returned by directive translation.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible translation errors.
#[derive(ThisError, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// A probed net or instance exists at no level of the hierarchy.
    #[error("unknown {kind} `{name}` in {directive} directive")]
    UnknownProbe {
        /// The schematic-level name as given.
        name: ArcStr,
        /// Whether a net or an instance was expected.
        kind: ProbeKind,
        /// The directive that referenced the name.
        directive: &'static str,
    },
    /// A current probe on an instance netlisted as a subcircuit.
    #[error("cannot probe the current of `{instance}`: it is netlisted as subcircuit `{element}`")]
    SubcircuitCurrent {
        /// The schematic-level instance path.
        instance: ArcStr,
        /// The element name in the netlist.
        element: ArcStr,
    },
    /// A swept parameter is not a symbolic top-level parameter.
    #[error("cannot sweep `{0}`: not a symbolic top-level parameter")]
    UnknownParameter(ArcStr),
    /// A sweep with no values, or a range that never reaches its end.
    #[error("invalid sweep of `{param}`: {reason}")]
    InvalidSweep {
        /// The swept parameter.
        param: ArcStr,
        /// Why the sweep is invalid.
        reason: &'static str,
    },
}

/// What an [`Error::UnknownProbe`] was looking for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProbeKind {
    /// A net.
    Net,
    /// A device instance.
    Instance,
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Net => write!(f, "net"),
            Self::Instance => write!(f, "instance"),
        }
    }
}
