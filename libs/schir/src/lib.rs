//! Schematic intermediate representation (SchIR).
//!
//! A hierarchical representation of schematic cells, the instances placed in
//! them, and the nets that connect those instances.
//!
//! Cells are either primitive devices (resistors, transistors, raw subcircuit
//! references, etc.) or subcircuits with an internal [`Schematic`]. Instances
//! refer to cells by symbol name rather than by identity, so that a schematic
//! can be stored as a standalone document and resolved against a library later.
//!
//! Parameter values are stored as expression strings and parsed with
//! [`Expr::parse`]. Evaluation happens during flattening, once the scope of
//! the enclosing instance is known.
#![warn(missing_docs)]

use std::fmt::{Display, Formatter};
use std::ops::Deref;

use arcstr::ArcStr;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

mod expr;

pub use expr::{BinOp, EvalError, Expr, ParseError, Scope, Value};

#[cfg(test)]
pub(crate) mod tests;

/// A reference from an instance to the cell it instantiates.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellRef {
    /// The library namespace containing the cell.
    pub namespace: ArcStr,
    /// The symbol name of the cell.
    pub name: ArcStr,
    /// The requested document version.
    ///
    /// [`None`] lets the resolver pick a version, provided it is unambiguous.
    #[serde(default)]
    pub version: Option<ArcStr>,
}

impl CellRef {
    /// Creates a reference to an unversioned cell.
    pub fn new(namespace: impl Into<ArcStr>, name: impl Into<ArcStr>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: None,
        }
    }

    /// Pins this reference to the given version.
    pub fn with_version(mut self, version: impl Into<ArcStr>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl Display for CellRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

/// Port directions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Input.
    Input,
    /// Output.
    Output,
    /// Input or output.
    #[default]
    InOut,
}

/// A port of a cell.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Port {
    /// The name of the port.
    pub name: ArcStr,
    /// The direction of the port.
    #[serde(default)]
    pub direction: Direction,
}

impl Port {
    /// Creates a bidirectional port.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::InOut,
        }
    }
}

/// A declared cell parameter.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    /// The default value expression.
    ///
    /// Parameters without a default must be assigned by every instance.
    #[serde(default)]
    pub default: Option<ArcStr>,
}

impl ParamDecl {
    /// A parameter with the given default expression.
    pub fn with_default(default: impl Into<ArcStr>) -> Self {
        Self {
            default: Some(default.into()),
        }
    }

    /// A parameter that every instance must assign.
    pub fn required() -> Self {
        Self { default: None }
    }
}

/// An enumeration of supported primitive device kinds.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// A 2-terminal resistor.
    Resistor,
    /// A 2-terminal capacitor.
    Capacitor,
    /// A 2-terminal inductor.
    Inductor,
    /// A diode.
    Diode,
    /// An independent voltage source.
    Vsource,
    /// An independent current source.
    Isource,
    /// An n-channel MOSFET.
    Nmos,
    /// A p-channel MOSFET.
    Pmos,
    /// An NPN bipolar transistor.
    Npn,
    /// A PNP bipolar transistor.
    Pnp,
    /// A raw instance of a subcircuit defined outside the library.
    Subckt {
        /// The name of the subcircuit being instantiated.
        cell: ArcStr,
        /// The ports of the subcircuit, as an ordered list.
        ports: Vec<ArcStr>,
    },
}

impl DeviceKind {
    /// The SPICE element prefix of this kind of device.
    pub fn prefix(&self) -> char {
        match self {
            DeviceKind::Resistor => 'R',
            DeviceKind::Capacitor => 'C',
            DeviceKind::Inductor => 'L',
            DeviceKind::Diode => 'D',
            DeviceKind::Vsource => 'V',
            DeviceKind::Isource => 'I',
            DeviceKind::Nmos | DeviceKind::Pmos => 'M',
            DeviceKind::Npn | DeviceKind::Pnp => 'Q',
            DeviceKind::Subckt { .. } => 'X',
        }
    }

    /// The ports of this kind of device, in netlist order.
    pub fn ports(&self) -> Vec<ArcStr> {
        match self {
            DeviceKind::Resistor
            | DeviceKind::Capacitor
            | DeviceKind::Inductor
            | DeviceKind::Diode
            | DeviceKind::Vsource
            | DeviceKind::Isource => ["p", "n"].into_iter().map(ArcStr::from).collect(),
            DeviceKind::Nmos | DeviceKind::Pmos => ["d", "g", "s", "b"]
                .into_iter()
                .map(ArcStr::from)
                .collect(),
            DeviceKind::Npn | DeviceKind::Pnp => {
                ["c", "b", "e"].into_iter().map(ArcStr::from).collect()
            }
            DeviceKind::Subckt { ports, .. } => ports.clone(),
        }
    }
}

/// Replaces the default statement emitted for a primitive device.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SpiceOverride {
    /// The statement used to instantiate the device.
    ///
    /// May contain `{name}`, `{ports}` and `{properties}` placeholders.
    pub reference: ArcStr,
    /// A declaration emitted once before any device statement.
    ///
    /// May contain a `{corner}` placeholder.
    #[serde(default)]
    pub declaration: Option<ArcStr>,
}

/// A primitive device cell body.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveDevice {
    /// The kind of device, which determines the model tag and port order.
    pub kind: DeviceKind,
    /// A simulator-specific statement template.
    #[serde(default)]
    pub spice: Option<SpiceOverride>,
}

impl PrimitiveDevice {
    /// The element name of an instance called `name` in SPICE netlists.
    ///
    /// A template names its element with the first token of the statement,
    /// so `X{name} ...` makes `m1` the subcircuit instance `Xm1`.
    pub fn element(&self, name: &str) -> ArcStr {
        let template = self
            .spice
            .as_ref()
            .and_then(|spice| spice.reference.split_whitespace().next());
        match template {
            Some(first) => first.replace("{name}", name).into(),
            None => ArcStr::from(format!("{}{}", self.kind.prefix(), name)),
        }
    }
}

impl From<DeviceKind> for PrimitiveDevice {
    fn from(kind: DeviceKind) -> Self {
        Self { kind, spice: None }
    }
}

/// The contents of a cell.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum CellContents {
    /// A leaf cell netlisted as a single device statement.
    Primitive(PrimitiveDevice),
    /// A subcircuit with an internal schematic.
    Schematic(Schematic),
}

/// A cell, the unit of reuse in a library.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    name: ArcStr,
    ports: Vec<Port>,
    #[serde(default)]
    params: IndexMap<ArcStr, ParamDecl>,
    contents: CellContents,
}

impl Cell {
    /// Creates a primitive cell whose ports are those of the device kind.
    pub fn primitive(name: impl Into<ArcStr>, device: impl Into<PrimitiveDevice>) -> Self {
        let device = device.into();
        let ports = device.kind.ports().into_iter().map(Port::new).collect();
        Self {
            name: name.into(),
            ports,
            params: IndexMap::new(),
            contents: CellContents::Primitive(device),
        }
    }

    /// Creates a subcircuit cell with no ports.
    ///
    /// Ports are added with [`Cell::add_port`]; each must name an internal net.
    pub fn subcircuit(name: impl Into<ArcStr>, schematic: Schematic) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
            params: IndexMap::new(),
            contents: CellContents::Schematic(schematic),
        }
    }

    /// The name of the cell.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The ports of the cell, in declaration order.
    #[inline]
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    /// Looks up a port by name.
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Adds a bidirectional port.
    pub fn add_port(&mut self, name: impl Into<ArcStr>) -> &mut Self {
        self.ports.push(Port::new(name));
        self
    }

    /// Adds a port with the given direction.
    pub fn add_port_with_direction(
        &mut self,
        name: impl Into<ArcStr>,
        direction: Direction,
    ) -> &mut Self {
        self.ports.push(Port {
            name: name.into(),
            direction,
        });
        self
    }

    /// Declares a parameter.
    ///
    /// Defaults may refer to parameters declared before this one.
    pub fn add_param(&mut self, name: impl Into<ArcStr>, decl: ParamDecl) -> &mut Self {
        self.params.insert(name.into(), decl);
        self
    }

    /// The declared parameters, in declaration order.
    #[inline]
    pub fn params(&self) -> &IndexMap<ArcStr, ParamDecl> {
        &self.params
    }

    /// The contents of the cell.
    #[inline]
    pub fn contents(&self) -> &CellContents {
        &self.contents
    }

    /// The internal schematic, if this cell is a subcircuit.
    pub fn schematic(&self) -> Option<&Schematic> {
        match &self.contents {
            CellContents::Schematic(s) => Some(s),
            CellContents::Primitive(_) => None,
        }
    }

    /// The primitive device, if this is a leaf cell.
    pub fn primitive_device(&self) -> Option<&PrimitiveDevice> {
        match &self.contents {
            CellContents::Primitive(p) => Some(p),
            CellContents::Schematic(_) => None,
        }
    }

    /// Whether two cells expose the same ports and parameters.
    ///
    /// Versions of a cell with the same interface can be substituted for
    /// one another without changing how their instances are connected.
    pub fn same_interface(&self, other: &Cell) -> bool {
        self.ports.iter().map(|p| &p.name).eq(other.ports.iter().map(|p| &p.name))
            && self.params.keys().eq(other.params.keys())
    }
}

/// An instance of a cell placed in a schematic.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    name: ArcStr,
    cell: CellRef,
    #[serde(default)]
    connections: IndexMap<ArcStr, ArcStr>,
    #[serde(default)]
    params: IndexMap<ArcStr, ArcStr>,
}

impl Instance {
    /// Creates an unconnected instance of the given cell.
    pub fn new(name: impl Into<ArcStr>, cell: CellRef) -> Self {
        Self {
            name: name.into(),
            cell,
            connections: IndexMap::new(),
            params: IndexMap::new(),
        }
    }

    /// Connects a port of the instance to a net of the parent schematic.
    pub fn connect(&mut self, port: impl Into<ArcStr>, net: impl Into<ArcStr>) -> &mut Self {
        self.connections.insert(port.into(), net.into());
        self
    }

    /// Overrides a parameter of the instantiated cell.
    ///
    /// The value is an expression evaluated in the scope of the parent.
    pub fn set_param(&mut self, name: impl Into<ArcStr>, value: impl Into<ArcStr>) -> &mut Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// The name of the instance.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The cell this instance refers to.
    #[inline]
    pub fn cell(&self) -> &CellRef {
        &self.cell
    }

    /// Port to net connections.
    #[inline]
    pub fn connections(&self) -> &IndexMap<ArcStr, ArcStr> {
        &self.connections
    }

    /// Parameter override expressions.
    #[inline]
    pub fn params(&self) -> &IndexMap<ArcStr, ArcStr> {
        &self.params
    }
}

/// The internal graph of a subcircuit.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Schematic {
    #[serde(default)]
    nets: IndexSet<ArcStr>,
    #[serde(default)]
    instances: IndexMap<ArcStr, Instance>,
    #[serde(default)]
    shorts: Vec<(ArcStr, ArcStr)>,
}

impl Schematic {
    /// Creates an empty schematic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a net, returning its name.
    pub fn add_net(&mut self, name: impl Into<ArcStr>) -> ArcStr {
        let name = name.into();
        self.nets.insert(name.clone());
        name
    }

    /// Adds an instance.
    ///
    /// An instance with the same name replaces the existing one.
    pub fn add_instance(&mut self, instance: Instance) -> &mut Self {
        self.instances.insert(instance.name.clone(), instance);
        self
    }

    /// Asserts that two nets are the same conductor.
    pub fn short(&mut self, a: impl Into<ArcStr>, b: impl Into<ArcStr>) -> &mut Self {
        self.shorts.push((a.into(), b.into()));
        self
    }

    /// The declared nets, in declaration order.
    #[inline]
    pub fn nets(&self) -> impl Iterator<Item = &ArcStr> {
        self.nets.iter()
    }

    /// Whether a net is declared in this schematic.
    #[inline]
    pub fn has_net(&self, name: &str) -> bool {
        self.nets.contains(name)
    }

    /// The instances, in insertion order.
    #[inline]
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    /// Looks up an instance by name.
    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.get(name)
    }

    /// Zero-impedance connections between pairs of nets.
    #[inline]
    pub fn shorts(&self) -> &[(ArcStr, ArcStr)] {
        &self.shorts
    }

    /// The instance ports attached to a net, as `(instance, port)` pairs.
    pub fn net_connections<'a>(&'a self, net: &'a str) -> impl Iterator<Item = (&'a ArcStr, &'a ArcStr)> {
        self.instances.values().flat_map(move |inst| {
            inst.connections
                .iter()
                .filter(move |(_, n)| n.as_str() == net)
                .map(move |(port, _)| (&inst.name, port))
        })
    }
}

/// A path of instance names from the top cell to a node in the hierarchy.
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InstancePath(Vec<ArcStr>);

impl InstancePath {
    /// The path of the top cell.
    pub fn top() -> Self {
        Self(Vec::new())
    }

    /// Returns a new path extended by one instance name.
    pub fn child(&self, name: impl Into<ArcStr>) -> Self {
        let mut path = self.0.clone();
        path.push(name.into());
        Self(path)
    }

    /// Whether this is the path of the top cell.
    #[inline]
    pub fn is_top(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of instances between the top cell and this node.
    #[inline]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Joins `name` onto the path with `.` separators.
    ///
    /// At the top level the name is returned unchanged.
    pub fn qualify(&self, name: &str) -> ArcStr {
        if self.0.is_empty() {
            ArcStr::from(name)
        } else {
            ArcStr::from(format!("{}.{}", self, name))
        }
    }
}

impl Deref for InstancePath {
    type Target = [ArcStr];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<ArcStr>> for InstancePath {
    fn from(value: Vec<ArcStr>) -> Self {
        Self(value)
    }
}

impl FromIterator<ArcStr> for InstancePath {
    fn from_iter<T: IntoIterator<Item = ArcStr>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for InstancePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "<top>")
        } else {
            write!(f, "{}", self.0.iter().join("."))
        }
    }
}
