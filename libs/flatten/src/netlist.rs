//! SPICE netlist text for flattened schematics.
//!
//! The writer records which device every line came from, so that line
//! numbers reported by a simulator can be traced back to instance paths.

use std::io::{Result, Write};
use std::path::PathBuf;

use arcstr::ArcStr;
use indexmap::IndexSet;
use itertools::Itertools;
use rust_decimal::Decimal;
use schir::{DeviceKind, Value};
use serde::{Deserialize, Serialize};

use crate::{FlatNetlist, FlatNetlistNode};

/// A netlist include statement.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Include {
    /// The path to include.
    pub path: PathBuf,
    /// The section of the provided file to include.
    #[serde(default)]
    pub section: Option<ArcStr>,
}

impl<T: Into<PathBuf>> From<T> for Include {
    fn from(value: T) -> Self {
        Self {
            path: value.into(),
            section: None,
        }
    }
}

impl Include {
    /// Creates a new [`Include`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from(path)
    }

    /// Returns a new [`Include`] with the given section.
    pub fn section(mut self, section: impl Into<ArcStr>) -> Self {
        self.section = Some(section.into());
        self
    }
}

/// Options for the text of a netlist.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetlistOptions {
    /// The title line. Defaults to the name of the top cell.
    #[serde(default)]
    pub title: Option<ArcStr>,
    /// Substituted for `{corner}` in model declarations.
    #[serde(default = "default_corner")]
    pub corner: ArcStr,
    /// The simulation temperature in degrees Celsius.
    #[serde(default)]
    pub temperature: Option<Decimal>,
    /// Model files to include.
    #[serde(default)]
    pub includes: Vec<Include>,
    /// Raw statements appended after the devices.
    #[serde(default)]
    pub extra: Vec<ArcStr>,
}

fn default_corner() -> ArcStr {
    arcstr::literal!("tt")
}

impl Default for NetlistOptions {
    fn default() -> Self {
        Self {
            title: None,
            corner: default_corner(),
            temperature: None,
            includes: Vec::new(),
            extra: Vec::new(),
        }
    }
}

/// What produced a line of netlist text.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum LineOrigin {
    /// The title line.
    Title,
    /// A temperature statement.
    Temperature,
    /// An include statement.
    Include,
    /// A `.param` statement for a symbolic top-level parameter.
    Param(ArcStr),
    /// A model declaration required by a device.
    Declaration,
    /// A device statement, identified by the device's instance path.
    Device(ArcStr),
    /// A raw statement supplied by the caller.
    Extra,
}

/// Maps 1-based line numbers of netlist text to what produced them.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    lines: Vec<LineOrigin>,
}

impl SourceMap {
    /// The origin of a line, counting from 1.
    pub fn origin(&self, line: usize) -> Option<&LineOrigin> {
        line.checked_sub(1).and_then(|i| self.lines.get(i))
    }

    /// The instance path of the device written on `line`, if any.
    pub fn device_at(&self, line: usize) -> Option<&ArcStr> {
        match self.origin(line)? {
            LineOrigin::Device(name) => Some(name),
            _ => None,
        }
    }

    /// The line a device was written on.
    pub fn line_of(&self, device: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|o| matches!(o, LineOrigin::Device(name) if name == device))
            .map(|i| i + 1)
    }

    /// The number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if no lines were written.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Netlist text along with its source map.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SpiceText {
    /// The netlist, without a terminating `.end`.
    pub text: String,
    /// The origin of each line of `text`.
    pub source_map: SourceMap,
}

impl SpiceText {
    /// Renders a flattened netlist.
    pub fn new(netlist: &FlatNetlist, options: &NetlistOptions) -> Self {
        let mut buf = Vec::new();
        // Writing to a `Vec` cannot fail.
        let source_map = write_netlist(netlist, options, &mut buf).unwrap_or_default();
        Self {
            text: String::from_utf8_lossy(&buf).into_owned(),
            source_map,
        }
    }

    /// The complete simulator input: the netlist, the given analysis
    /// statements, and `.end`.
    pub fn deck(&self, directives: &str) -> String {
        let mut deck = self.text.clone();
        deck.push_str(directives);
        if !directives.is_empty() && !directives.ends_with('\n') {
            deck.push('\n');
        }
        deck.push_str(".end\n");
        deck
    }
}

struct LineWriter<'a, W> {
    out: &'a mut W,
    lines: Vec<LineOrigin>,
}

impl<W: Write> LineWriter<'_, W> {
    fn line(&mut self, origin: LineOrigin, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text)?;
        self.lines.push(origin);
        Ok(())
    }
}

/// Writes the netlist text of `netlist` to `out`.
pub fn write_netlist<W: Write>(
    netlist: &FlatNetlist,
    options: &NetlistOptions,
    out: &mut W,
) -> Result<SourceMap> {
    let mut w = LineWriter {
        out,
        lines: Vec::new(),
    };

    let title = options.title.as_ref().unwrap_or(&netlist.top);
    w.line(LineOrigin::Title, &format!("* {}", title))?;

    if let Some(temp) = options.temperature {
        w.line(LineOrigin::Temperature, &format!(".temp {}", temp.normalize()))?;
    }

    for include in options.includes.iter().sorted().dedup() {
        let text = match &include.section {
            Some(section) => format!(".lib {:?} {}", include.path, section),
            None => format!(".include {:?}", include.path),
        };
        w.line(LineOrigin::Include, &text)?;
    }

    for (name, value) in netlist.params.iter() {
        w.line(
            LineOrigin::Param(name.clone()),
            &format!(".param {}={}", name, value),
        )?;
    }

    let declarations: IndexSet<String> = netlist
        .nodes
        .iter()
        .filter_map(|node| node.device.spice.as_ref()?.declaration.as_ref())
        .map(|decl| decl.replace("{corner}", &options.corner))
        .collect();
    for decl in declarations {
        w.line(LineOrigin::Declaration, &decl)?;
    }

    for node in netlist.nodes.iter() {
        w.line(LineOrigin::Device(node.name.clone()), &device_statement(node))?;
    }

    for extra in options.extra.iter() {
        w.line(LineOrigin::Extra, extra)?;
    }

    Ok(SourceMap { lines: w.lines })
}

/// Parameters printed positionally or verbatim rather than as `name=value`.
const VALUE: &str = "value";
const MODEL: &str = "model";
const SPICE: &str = "spice";

fn properties(node: &FlatNetlistNode) -> String {
    node.params
        .iter()
        .filter(|(key, _)| ![VALUE, MODEL, SPICE].contains(&key.as_str()))
        .sorted_by_key(|(key, _)| *key)
        .map(|(key, value)| format!("{key}={value}"))
        .join(" ")
}

fn device_statement(node: &FlatNetlistNode) -> String {
    if let Some(spice) = &node.device.spice {
        return spice
            .reference
            .replace("{name}", &node.name)
            .replace("{ports}", &node.nets.iter().join(" "))
            .replace("{properties}", &properties(node));
    }

    let mut parts: Vec<String> = vec![node.element().to_string()];
    parts.extend(node.nets.iter().map(|n| n.to_string()));
    if let DeviceKind::Subckt { cell, .. } = &node.device.kind {
        parts.push(cell.to_string());
    }
    for key in [VALUE, MODEL] {
        if let Some(value) = node.params.get(key) {
            parts.push(value.to_string());
        }
    }
    let props = properties(node);
    if !props.is_empty() {
        parts.push(props);
    }
    if let Some(Value::Text(raw)) = node.params.get(SPICE) {
        parts.push(raw.to_string());
    }
    parts.join(" ")
}
