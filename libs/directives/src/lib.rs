//! Translation of analysis intents into simulator directives.
//!
//! Directives name nets and instances the way they appear in the schematic,
//! e.g. `amp1.bias` or `amp1.m1`. [`translate`] rewrites those names to the
//! global ids of a flattened netlist using its [`NetNameMap`], and renders
//! the result in the syntax of a simulator [`Dialect`].
#![warn(missing_docs)]

use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use flatten::NetNameMap;
use indexmap::IndexMap;
use itertools::Itertools;
use rust_decimal::Decimal;
use schir::DeviceKind;
use serde::{Deserialize, Serialize};

pub mod dialect;
pub mod error;

pub use dialect::{Dialect, Ngspice, Xyce};
pub use error::{Error, ProbeKind, Result};


/// Sweeps with more points than this are rejected.
pub const MAX_SWEEP_POINTS: usize = 10_000;

/// A quantity to record during an analysis.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Probe {
    /// The voltage of a net.
    Voltage(ArcStr),
    /// The current through a device instance.
    Current(ArcStr),
}

impl Probe {
    /// Probes the voltage of `net`.
    pub fn voltage(net: impl Into<ArcStr>) -> Self {
        Self::Voltage(net.into())
    }

    /// Probes the current through `instance`.
    pub fn current(instance: impl Into<ArcStr>) -> Self {
        Self::Current(instance.into())
    }
}

impl Display for Probe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voltage(net) => write!(f, "v({net})"),
            Self::Current(inst) => write!(f, "i({inst})"),
        }
    }
}

/// Point spacing of a frequency sweep.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Spacing {
    /// Points per decade.
    #[default]
    Dec,
    /// Points per octave.
    Oct,
    /// Total points, linearly spaced.
    Lin,
}

impl Display for Spacing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dec => write!(f, "dec"),
            Self::Oct => write!(f, "oct"),
            Self::Lin => write!(f, "lin"),
        }
    }
}

/// A transient analysis.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tran {
    /// Maximum time step (sec).
    pub step: Decimal,
    /// Stop time (sec).
    pub stop: Decimal,
    /// Start time (sec).
    ///
    /// Defaults to 0.
    #[serde(default)]
    pub start: Option<Decimal>,
    /// Quantities to record.
    #[serde(default)]
    pub probes: Vec<Probe>,
}

/// An AC small-signal analysis.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Ac {
    /// Point spacing.
    #[serde(default)]
    pub spacing: Spacing,
    /// Number of points, interpreted according to `spacing`.
    pub points: usize,
    /// Start frequency (Hz).
    pub fstart: Decimal,
    /// Stop frequency (Hz).
    pub fstop: Decimal,
    /// Quantities to record.
    #[serde(default)]
    pub probes: Vec<Probe>,
}

/// A DC operating point analysis.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Op {
    /// Quantities to record.
    #[serde(default)]
    pub probes: Vec<Probe>,
}

/// A DC sweep of an independent source.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Dc {
    /// The instance path of the swept source.
    pub source: ArcStr,
    /// Start value.
    pub start: Decimal,
    /// Stop value.
    pub stop: Decimal,
    /// Increment.
    pub step: Decimal,
    /// Quantities to record.
    #[serde(default)]
    pub probes: Vec<Probe>,
}

/// A noise analysis.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Noise {
    /// The output net.
    pub output: ArcStr,
    /// The reference net for a differential output.
    #[serde(default)]
    pub reference: Option<ArcStr>,
    /// The instance path of the input source.
    pub source: ArcStr,
    /// Point spacing.
    #[serde(default)]
    pub spacing: Spacing,
    /// Number of points.
    pub points: usize,
    /// Start frequency (Hz).
    pub fstart: Decimal,
    /// Stop frequency (Hz).
    pub fstop: Decimal,
}

/// A DC transfer function analysis.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// The output net.
    pub output: ArcStr,
    /// The instance path of the input source.
    pub source: ArcStr,
}

/// The values taken by a swept parameter.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepValues {
    /// An explicit list of values.
    List(Vec<Decimal>),
    /// Values from `start` towards `stop` in increments of `step`.
    Range {
        /// First value.
        start: Decimal,
        /// Last value, inclusive if reached exactly.
        stop: Decimal,
        /// Increment, negative for descending ranges.
        step: Decimal,
    },
}

impl SweepValues {
    /// Checks that the sweep has at least one and at most
    /// [`MAX_SWEEP_POINTS`] values.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        match self {
            Self::List(values) if values.is_empty() => Err("no values given"),
            Self::List(values) if values.len() > MAX_SWEEP_POINTS => Err("too many values"),
            Self::List(_) => Ok(()),
            Self::Range { start, stop, step } => {
                if step.is_zero() {
                    return Err("step is zero");
                }
                if stop != start && (stop > start) == step.is_sign_negative() {
                    return Err("step moves away from the stop value");
                }
                if self.points().len() > MAX_SWEEP_POINTS {
                    return Err("too many values");
                }
                Ok(())
            }
        }
    }

    /// Every value of the sweep, in order.
    ///
    /// Ranges are truncated after [`MAX_SWEEP_POINTS`] + 1 values.
    pub fn points(&self) -> Vec<Decimal> {
        match self {
            Self::List(values) => values.iter().map(|v| v.normalize()).collect(),
            Self::Range { start, stop, step } => {
                let mut points = Vec::new();
                let mut value = *start;
                while points.len() <= MAX_SWEEP_POINTS {
                    let within = if step.is_sign_negative() {
                        value >= *stop
                    } else {
                        value <= *stop
                    };
                    if !within {
                        break;
                    }
                    points.push(value.normalize());
                    match value.checked_add(*step) {
                        Some(next) if next != value => value = next,
                        _ => break,
                    }
                }
                points
            }
        }
    }
}

/// A sweep of a symbolic top-level parameter around nested directives.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParamSweep {
    /// The swept parameter.
    pub param: ArcStr,
    /// The values taken by the parameter.
    pub values: SweepValues,
    /// The analyses run for every value.
    pub body: Vec<Directive>,
}

/// An analysis intent.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    /// A transient analysis.
    Tran(Tran),
    /// An AC analysis.
    Ac(Ac),
    /// An operating point analysis.
    Op(Op),
    /// A DC sweep.
    Dc(Dc),
    /// A noise analysis.
    Noise(Noise),
    /// A DC transfer function analysis.
    Transfer(Transfer),
    /// A parameter sweep.
    ParamSweep(ParamSweep),
}

macro_rules! directive_from {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Directive {
                fn from(value: $variant) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

directive_from!(Tran, Ac, Op, Dc, Noise, Transfer, ParamSweep);

/// The kind of analysis a save statement belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AnalysisKind {
    /// Transient.
    Tran,
    /// AC small-signal.
    Ac,
    /// Operating point.
    Op,
    /// DC sweep.
    Dc,
}

impl Directive {
    /// A short name for log messages and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tran(_) => "tran",
            Self::Ac(_) => "ac",
            Self::Op(_) => "op",
            Self::Dc(_) => "dc",
            Self::Noise(_) => "noise",
            Self::Transfer(_) => "tf",
            Self::ParamSweep(_) => "param sweep",
        }
    }
}

/// A probe rewritten to flattened names.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum SaveTarget {
    /// The voltage of a global net.
    Voltage(ArcStr),
    /// The current through a netlist element.
    Current(ArcStr),
}

/// Maps the names of simulator output vectors to the probes that produced
/// them.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProbeMap {
    vectors: IndexMap<ArcStr, ArcStr>,
}

impl ProbeMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `vector` holds the values of `probe`.
    pub fn insert(&mut self, vector: impl Into<ArcStr>, probe: impl Into<ArcStr>) {
        self.vectors.insert(vector.into(), probe.into());
    }

    /// The probe name for a simulator vector.
    ///
    /// Simulators differ in how they case vector names, so lookups fall back
    /// to ignoring case.
    pub fn rename(&self, vector: &str) -> Option<&ArcStr> {
        self.find(vector).map(|(_, probe)| probe)
    }

    /// The insertion index and probe name for a simulator vector, matched
    /// the same way as [`ProbeMap::rename`].
    pub fn find(&self, vector: &str) -> Option<(usize, &ArcStr)> {
        if let Some((index, _, probe)) = self.vectors.get_full(vector) {
            return Some((index, probe));
        }
        self.vectors
            .iter()
            .enumerate()
            .find(|(_, (k, _))| k.eq_ignore_ascii_case(vector))
            .map(|(index, (_, probe))| (index, probe))
    }

    /// Iterates over `(vector, probe)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &ArcStr)> {
        self.vectors.iter()
    }

    /// The number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns `true` if no vectors are mapped.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Translated directives.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DirectiveText {
    /// Directive statements, one per line, in input order.
    pub text: String,
    /// The schematic probe behind every saved vector.
    pub probes: ProbeMap,
}

/// Translates `directives` for a netlist flattened into `map`.
pub fn translate(
    directives: &[Directive],
    map: &NetNameMap,
    dialect: &dyn Dialect,
) -> Result<DirectiveText> {
    let mut translator = Translator {
        map,
        dialect,
        probes: ProbeMap::new(),
    };
    let mut lines = Vec::new();
    for directive in directives {
        lines.extend(translator.directive(directive)?);
    }
    tracing::debug!(
        directives = directives.len(),
        vectors = translator.probes.len(),
        "translated directives"
    );
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    Ok(DirectiveText {
        text,
        probes: translator.probes,
    })
}

struct Translator<'a> {
    map: &'a NetNameMap,
    dialect: &'a dyn Dialect,
    probes: ProbeMap,
}

impl Translator<'_> {
    fn directive(&mut self, directive: &Directive) -> Result<Vec<String>> {
        let name = directive.name();
        let mut lines = Vec::new();
        match directive {
            Directive::Tran(tran) => {
                self.save(AnalysisKind::Tran, &tran.probes, name, &mut lines)?;
                let mut line = format!(".tran {} {}", num(tran.step), num(tran.stop));
                if let Some(start) = tran.start {
                    line.push_str(&format!(" {}", num(start)));
                }
                lines.push(line);
            }
            Directive::Ac(ac) => {
                self.save(AnalysisKind::Ac, &ac.probes, name, &mut lines)?;
                lines.push(format!(
                    ".ac {} {} {} {}",
                    ac.spacing,
                    ac.points,
                    num(ac.fstart),
                    num(ac.fstop)
                ));
            }
            Directive::Op(op) => {
                self.save(AnalysisKind::Op, &op.probes, name, &mut lines)?;
                lines.push(".op".to_string());
            }
            Directive::Dc(dc) => {
                self.save(AnalysisKind::Dc, &dc.probes, name, &mut lines)?;
                let source = self.element(&dc.source, name)?;
                lines.push(format!(
                    ".dc {} {} {} {}",
                    source,
                    num(dc.start),
                    num(dc.stop),
                    num(dc.step)
                ));
            }
            Directive::Noise(noise) => {
                let mut output = self.net(&noise.output, name)?.to_string();
                if let Some(reference) = &noise.reference {
                    output = format!("{},{}", output, self.net(reference, name)?);
                }
                let source = self.element(&noise.source, name)?;
                lines.push(format!(
                    ".noise v({}) {} {} {} {} {}",
                    output,
                    source,
                    noise.spacing,
                    noise.points,
                    num(noise.fstart),
                    num(noise.fstop)
                ));
            }
            Directive::Transfer(tf) => {
                let output = self.net(&tf.output, name)?;
                let source = self.element(&tf.source, name)?;
                lines.push(format!(".tf v({}) {}", output, source));
            }
            Directive::ParamSweep(sweep) => {
                if !self.map.has_param(&sweep.param) {
                    return Err(Error::UnknownParameter(sweep.param.clone()));
                }
                sweep
                    .values
                    .validate()
                    .map_err(|reason| Error::InvalidSweep {
                        param: sweep.param.clone(),
                        reason,
                    })?;
                let mut body = Vec::new();
                for inner in sweep.body.iter() {
                    body.extend(self.directive(inner)?);
                }
                lines.extend(self.dialect.param_sweep(&sweep.param, &sweep.values, body));
            }
        }
        Ok(lines)
    }

    fn save(
        &mut self,
        analysis: AnalysisKind,
        probes: &[Probe],
        directive: &'static str,
        lines: &mut Vec<String>,
    ) -> Result<()> {
        let mut targets = Vec::with_capacity(probes.len());
        for probe in probes.iter().unique() {
            let target = match probe {
                Probe::Voltage(net) => SaveTarget::Voltage(self.net(net, directive)?.clone()),
                Probe::Current(inst) => {
                    let element = self.element(inst, directive)?;
                    if is_subcircuit(&element) {
                        return Err(Error::SubcircuitCurrent {
                            instance: inst.clone(),
                            element,
                        });
                    }
                    SaveTarget::Current(element)
                }
            };
            self.probes
                .insert(self.dialect.vector(&target), probe.to_string());
            targets.push(target);
        }
        if let Some(line) = self.dialect.save(analysis, &targets) {
            lines.push(line);
        }
        Ok(())
    }

    fn net(&self, name: &str, directive: &'static str) -> Result<&ArcStr> {
        self.map
            .resolve_net(name)
            .ok_or_else(|| Error::UnknownProbe {
                name: name.into(),
                kind: ProbeKind::Net,
                directive,
            })
    }

    fn element(&self, instance: &str, directive: &'static str) -> Result<ArcStr> {
        self.map
            .device(instance)
            .map(|d| d.element.clone())
            .ok_or_else(|| Error::UnknownProbe {
                name: instance.into(),
                kind: ProbeKind::Instance,
                directive,
            })
    }
}

fn num(value: Decimal) -> Decimal {
    value.normalize()
}

/// Subcircuit instances have no device quantities of their own, even when
/// their cell is a primitive rendered through a template.
fn is_subcircuit(element: &str) -> bool {
    matches!(element.chars().next(), Some('X' | 'x'))
}

fn device_quantities(kind: &DeviceKind) -> &'static [&'static str] {
    match kind {
        DeviceKind::Resistor | DeviceKind::Capacitor | DeviceKind::Inductor | DeviceKind::Vsource => {
            &["i"]
        }
        DeviceKind::Nmos | DeviceKind::Pmos => &["gm", "id", "vdsat"],
        DeviceKind::Npn | DeviceKind::Pnp => &["gm", "ic", "ib"],
        DeviceKind::Isource | DeviceKind::Diode | DeviceKind::Subckt { .. } => &[],
    }
}

/// The ngspice vectors worth saving for a netlist when no probes are given.
///
/// Lists every non-ground net declared at the top level, followed by the
/// interesting quantities of each device (`@rr1[i]`, `@mamp1.m1[gm]`, ...).
/// Names are lowercased, as ngspice reports them.
pub fn default_vectors(map: &NetNameMap) -> Vec<ArcStr> {
    let nets = map
        .nets()
        .filter(|(global, origin)| origin.origin.path.is_top() && global.as_str() != "0")
        .map(|(global, _)| ArcStr::from(global.to_lowercase()));
    let devices = map.devices().flat_map(|(_, device)| {
        let element = device.element.to_lowercase();
        let quantities: &[&str] = if is_subcircuit(&element) {
            &[]
        } else {
            device_quantities(&device.kind)
        };
        quantities
            .iter()
            .map(move |q| arcstr::format!("@{}[{}]", element, q))
    });
    nets.chain(devices).collect()
}
