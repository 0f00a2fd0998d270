//! Flattening of hierarchical schematics into SPICE netlists.
//!
//! The [`Compiler`] walks a schematic depth first, resolving each instance
//! through a [`celllib::Resolver`]. Subcircuits are expanded in place with
//! their instance path as a prefix, and every primitive instance becomes a
//! [`FlatNetlistNode`]. Nets joined by shorts or by port connections across
//! hierarchy boundaries are merged into a single global net, named after the
//! shallowest net in the merged set.
//!
//! The [`NetNameMap`] produced alongside the netlist maps every global net and
//! device back to where it was declared, so that errors reported by a
//! simulator can be shown against the schematic.
#![warn(missing_docs)]

use arcstr::ArcStr;
use indexmap::{IndexMap, IndexSet};
use schir::{InstancePath, PrimitiveDevice, Value};
use serde::{Deserialize, Serialize};

mod compiler;
pub mod error;
pub mod lint;
pub mod netlist;
mod netmap;
mod shorts;

pub use compiler::Compiler;
pub use error::{Error, Result};
pub use lint::LintReport;
pub use netlist::{Include, LineOrigin, NetlistOptions, SourceMap, SpiceText};
pub use netmap::{DeviceOrigin, LocationKind, NetAlias, NetNameMap, NetOrigin, SchematicLocation};


/// A primitive device in a flattened netlist.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FlatNetlistNode {
    /// The instance path joined with `.`, e.g. `amp1.m1`.
    pub name: ArcStr,
    /// The instance path of the device.
    pub path: InstancePath,
    /// The primitive cell that was instantiated.
    pub cell: ArcStr,
    /// The resolved device model.
    pub device: PrimitiveDevice,
    /// Global net ids, in the port order of the cell.
    pub nets: Vec<ArcStr>,
    /// Evaluated parameter values.
    pub params: IndexMap<ArcStr, Value>,
}

impl FlatNetlistNode {
    /// The element name of the device in SPICE netlists.
    pub fn element(&self) -> ArcStr {
        self.device.element(&self.name)
    }
}

/// The result of flattening a top cell.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct FlatNetlist {
    /// The name of the top cell.
    pub top: ArcStr,
    /// Devices in walk order.
    pub nodes: Vec<FlatNetlistNode>,
    /// The mapping between global ids and schematic names.
    pub nets: NetNameMap,
    /// Top-level parameters left symbolic, with their default values.
    pub params: IndexMap<ArcStr, Value>,
    /// Non-fatal connectivity issues.
    pub lint: LintReport,
}

impl FlatNetlist {
    /// Splits the netlist into its devices and net name map.
    pub fn into_parts(self) -> (Vec<FlatNetlistNode>, NetNameMap) {
        (self.nodes, self.nets)
    }
}

/// Options controlling flattening.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Overrides for the parameters of the top cell.
    #[serde(default)]
    pub params: IndexMap<ArcStr, ArcStr>,
    /// Top-level parameters to leave for the simulator to evaluate.
    ///
    /// These are emitted as `.param` statements so that they can be swept,
    /// and are visible from every level of the hierarchy.
    #[serde(default)]
    pub symbolic: IndexSet<ArcStr>,
    /// Top-level net names merged into global ground (`0`), compared
    /// ignoring case.
    ///
    /// A top-level net named `0` is always ground, whether listed or not.
    #[serde(default = "default_ground")]
    pub ground: Vec<ArcStr>,
}

fn default_ground() -> Vec<ArcStr> {
    vec![arcstr::literal!("0"), arcstr::literal!("gnd")]
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            params: IndexMap::new(),
            symbolic: IndexSet::new(),
            ground: default_ground(),
        }
    }
}

impl CompileOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides a parameter of the top cell.
    pub fn param(mut self, name: impl Into<ArcStr>, value: impl Into<ArcStr>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Leaves a top-level parameter symbolic.
    pub fn symbolic(mut self, name: impl Into<ArcStr>) -> Self {
        self.symbolic.insert(name.into());
        self
    }

    /// Whether `net` names global ground.
    pub fn is_ground(&self, net: &str) -> bool {
        net == "0" || self.ground.iter().any(|g| g.eq_ignore_ascii_case(net))
    }
}
