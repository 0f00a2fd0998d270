//! Simulator-specific directive syntax.

use arcstr::ArcStr;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{AnalysisKind, SaveTarget, SweepValues};

/// The parts of directive syntax that differ between simulators.
pub trait Dialect: Send + Sync {
    /// The simulator name.
    fn name(&self) -> &'static str;

    /// A statement saving `targets` during an analysis, if any is needed.
    fn save(&self, analysis: AnalysisKind, targets: &[SaveTarget]) -> Option<String>;

    /// The name under which the simulator reports the values of `target`.
    fn vector(&self, target: &SaveTarget) -> ArcStr;

    /// Wraps already translated `body` statements in a sweep of `param`.
    ///
    /// `values` has been validated.
    fn param_sweep(&self, param: &str, values: &SweepValues, body: Vec<String>) -> Vec<String>;
}

/// The ngspice dialect.
///
/// Parameter sweeps become a `.control` loop that alters the parameter and
/// reruns the nested analyses.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Ngspice;

impl Ngspice {
    fn target(target: &SaveTarget) -> ArcStr {
        match target {
            SaveTarget::Voltage(net) => arcstr::format!("v({})", net),
            SaveTarget::Current(element) => arcstr::format!("@{}[i]", element),
        }
    }
}

impl Dialect for Ngspice {
    fn name(&self) -> &'static str {
        "ngspice"
    }

    fn save(&self, _analysis: AnalysisKind, targets: &[SaveTarget]) -> Option<String> {
        if targets.is_empty() {
            return None;
        }
        Some(format!(".save {}", targets.iter().map(Self::target).join(" ")))
    }

    fn vector(&self, target: &SaveTarget) -> ArcStr {
        Self::target(target).to_lowercase().into()
    }

    fn param_sweep(&self, param: &str, values: &SweepValues, body: Vec<String>) -> Vec<String> {
        let var = format!("sweep_{param}");
        let mut lines = vec![
            ".control".to_string(),
            format!("foreach {} {}", var, values.points().iter().join(" ")),
            format!("  alterparam {} = ${}", param, var),
            "  reset".to_string(),
        ];
        for line in body {
            // Nested sweeps are already loops; only the outermost block
            // needs the control markers.
            if line == ".control" || line == ".endc" {
                continue;
            }
            let command = line.strip_prefix('.').unwrap_or(&line);
            lines.push(format!("  {}", command));
        }
        lines.push("end".to_string());
        lines.push(".endc".to_string());
        lines
    }
}

/// The Xyce dialect.
///
/// Results are requested with `.print` statements and parameters are swept
/// with `.step`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Xyce;

impl Dialect for Xyce {
    fn name(&self) -> &'static str {
        "xyce"
    }

    fn save(&self, analysis: AnalysisKind, targets: &[SaveTarget]) -> Option<String> {
        if targets.is_empty() {
            return None;
        }
        let kind = match analysis {
            AnalysisKind::Tran => "tran",
            AnalysisKind::Ac => "ac",
            AnalysisKind::Op | AnalysisKind::Dc => "dc",
        };
        Some(format!(
            ".print {} {}",
            kind,
            targets
                .iter()
                .map(|t| match t {
                    SaveTarget::Voltage(net) => format!("v({net})"),
                    SaveTarget::Current(element) => format!("i({element})"),
                })
                .join(" ")
        ))
    }

    fn vector(&self, target: &SaveTarget) -> ArcStr {
        match target {
            SaveTarget::Voltage(net) => arcstr::format!("V({})", net.to_uppercase()),
            SaveTarget::Current(element) => arcstr::format!("I({})", element.to_uppercase()),
        }
    }

    fn param_sweep(&self, param: &str, values: &SweepValues, body: Vec<String>) -> Vec<String> {
        let step = match values {
            SweepValues::List(values) => format!(
                ".step {} list {}",
                param,
                values.iter().map(|v| v.normalize()).join(" ")
            ),
            SweepValues::Range { start, stop, step } => format!(
                ".step {} {} {} {}",
                param,
                start.normalize(),
                stop.normalize(),
                step.normalize()
            ),
        };
        std::iter::once(step).chain(body).collect()
    }
}
