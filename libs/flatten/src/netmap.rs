//! Mapping between flattened names and schematic-level names.

use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use indexmap::{IndexMap, IndexSet};
use schir::{DeviceKind, InstancePath};
use serde::{Deserialize, Serialize};

/// A net as declared at one level of the hierarchy.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetAlias {
    /// The cell whose schematic declares the net.
    pub level: ArcStr,
    /// The net name within that schematic.
    pub local: ArcStr,
    /// The path of the instance of `level` that contains the net.
    pub path: InstancePath,
}

impl NetAlias {
    /// The net name qualified by its instance path.
    pub fn qualified(&self) -> ArcStr {
        self.path.qualify(&self.local)
    }
}

/// The origin of a global net.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetOrigin {
    /// The declaration that gave the global net its name.
    pub origin: NetAlias,
    /// Every other declaration merged into the global net.
    pub aliases: Vec<NetAlias>,
}

/// The origin of a flattened device.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceOrigin {
    /// The element name in the netlist, including the device prefix.
    pub element: ArcStr,
    /// The device kind.
    pub kind: DeviceKind,
    /// The primitive cell that was instantiated.
    pub cell: ArcStr,
    /// The cell whose schematic contains the instance.
    pub parent: ArcStr,
    /// The instance path of the device.
    pub path: InstancePath,
}

/// What a [`SchematicLocation`] points at.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LocationKind {
    /// A net.
    Net,
    /// A device instance.
    Device,
}

/// A schematic-level location recovered from a flattened identifier.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SchematicLocation {
    /// Whether the location is a net or a device.
    pub kind: LocationKind,
    /// The instance path containing the net, or the path of the device itself.
    pub path: InstancePath,
    /// The cell whose schematic contains the net or instance.
    pub level: ArcStr,
    /// The net or instance name within that schematic.
    pub name: ArcStr,
}

impl Display for SchematicLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            LocationKind::Net => write!(
                f,
                "net `{}` in cell `{}` (at `{}`)",
                self.name, self.level, self.path
            ),
            LocationKind::Device => write!(
                f,
                "instance `{}` in cell `{}` (at `{}`)",
                self.name, self.level, self.path
            ),
        }
    }
}

/// Maps flattened identifiers back to the schematic.
///
/// Outlives compilation: the streaming client uses it to report simulator
/// errors against schematic names.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetNameMap {
    nets: IndexMap<ArcStr, NetOrigin>,
    names: IndexMap<ArcStr, ArcStr>,
    devices: IndexMap<ArcStr, DeviceOrigin>,
    params: IndexSet<ArcStr>,
}

impl NetNameMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_net(&mut self, global: ArcStr, alias: NetAlias) {
        self.names.insert(alias.qualified(), global.clone());
        match self.nets.get_mut(&global) {
            Some(origin) => origin.aliases.push(alias),
            None => {
                self.nets.insert(
                    global,
                    NetOrigin {
                        origin: alias,
                        aliases: Vec::new(),
                    },
                );
            }
        }
    }

    pub(crate) fn add_device(&mut self, name: ArcStr, origin: DeviceOrigin) {
        self.devices.insert(name, origin);
    }

    pub(crate) fn add_param(&mut self, name: ArcStr) {
        self.params.insert(name);
    }

    /// The global net ids, in first-seen order.
    pub fn nets(&self) -> impl Iterator<Item = (&ArcStr, &NetOrigin)> {
        self.nets.iter()
    }

    /// The number of global nets.
    pub fn num_nets(&self) -> usize {
        self.nets.len()
    }

    /// The origin of a global net.
    pub fn origin(&self, global: &str) -> Option<&NetOrigin> {
        self.nets.get(global)
    }

    /// Resolves a schematic-level net name to its global id.
    ///
    /// Accepts a net name qualified by its instance path (`amp1.bias`), or a
    /// global id.
    pub fn resolve_net(&self, name: &str) -> Option<&ArcStr> {
        self.names
            .get(name)
            .or_else(|| self.nets.get_key_value(name).map(|(k, _)| k))
    }

    /// The flattened devices, keyed by instance path, in walk order.
    pub fn devices(&self) -> impl Iterator<Item = (&ArcStr, &DeviceOrigin)> {
        self.devices.iter()
    }

    /// Looks up a device by instance path (`amp1.m1`).
    pub fn device(&self, name: &str) -> Option<&DeviceOrigin> {
        self.devices.get(name)
    }

    /// Looks up a device by its netlist element name, ignoring case.
    pub fn device_by_element(&self, element: &str) -> Option<(&ArcStr, &DeviceOrigin)> {
        self.devices
            .iter()
            .find(|(_, d)| d.element.eq_ignore_ascii_case(element))
    }

    /// Top-level parameters left symbolic in the netlist.
    pub fn params(&self) -> impl Iterator<Item = &ArcStr> {
        self.params.iter()
    }

    /// Whether a top-level parameter was left symbolic.
    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains(name)
    }

    /// Finds the schematic location referred to by a flattened identifier.
    ///
    /// The identifier may be a global net id, a device element name or a
    /// device instance path. Simulators often lowercase identifiers, so
    /// matching falls back to ignoring case.
    pub fn locate(&self, reference: &str) -> Option<SchematicLocation> {
        let reference = reference.trim();
        let net = self.nets.get(reference).or_else(|| {
            self.nets
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(reference))
                .map(|(_, v)| v)
        });
        if let Some(net) = net {
            return Some(SchematicLocation {
                kind: LocationKind::Net,
                path: net.origin.path.clone(),
                level: net.origin.level.clone(),
                name: net.origin.local.clone(),
            });
        }
        let device = self
            .devices
            .get(reference)
            .or_else(|| self.device_by_element(reference).map(|(_, d)| d))?;
        Some(device.location())
    }
}

impl DeviceOrigin {
    /// The schematic location of this device.
    pub fn location(&self) -> SchematicLocation {
        SchematicLocation {
            kind: LocationKind::Device,
            path: self.path.clone(),
            level: self.parent.clone(),
            name: self.path.last().cloned().unwrap_or_default(),
        }
    }
}
