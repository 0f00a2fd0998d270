//! Connectivity checks on flattened netlists.
//!
//! Looks for issues such as floating nets and nets with a single connection.
//! None of these prevent simulation.

use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::netmap::NetNameMap;
use crate::FlatNetlistNode;

/// An enumeration of possible severity levels.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    /// An informational message.
    Info,
    /// A warning.
    #[default]
    Warning,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// The cause of a lint issue.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Cause {
    /// A net that is declared but not connected to any device.
    Floating,
    /// A net connected to exactly one device terminal.
    ///
    /// Example: the output of an amplifier that drives nothing.
    SingleConnection,
}

impl Display for Cause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Floating => write!(f, "floating net"),
            Self::SingleConnection => write!(f, "net has a single connection"),
        }
    }
}

/// An issue found in a flattened netlist.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct LintIssue {
    cause: Cause,
    severity: Severity,
    net: ArcStr,
}

impl LintIssue {
    /// Creates a new issue and logs it immediately.
    ///
    /// The log level will be selected according to the given severity.
    fn new_and_log(cause: Cause, net: ArcStr, severity: Severity) -> Self {
        let result = Self {
            cause,
            severity,
            net,
        };
        match severity {
            Severity::Info => tracing::event!(Level::INFO, issue = ?result.cause, "{}", result),
            Severity::Warning => tracing::event!(Level::WARN, issue = ?result.cause, "{}", result),
        }
        result
    }

    /// The underlying cause of this issue.
    #[inline]
    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// The severity of this issue.
    #[inline]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The global id of the affected net.
    #[inline]
    pub fn net(&self) -> &ArcStr {
        &self.net
    }
}

impl Display for LintIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.cause, self.net)
    }
}

/// The issues found in a flattened netlist.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LintReport {
    issues: Vec<LintIssue>,
}

impl LintReport {
    /// Checks every global net of a flattened netlist.
    pub(crate) fn analyze(nodes: &[FlatNetlistNode], nets: &NetNameMap) -> Self {
        let mut degree: IndexMap<&str, usize> =
            nets.nets().map(|(name, _)| (name.as_str(), 0)).collect();
        for node in nodes {
            for net in node.nets.iter() {
                *degree.entry(net.as_str()).or_default() += 1;
            }
        }

        let mut issues = Vec::new();
        for (net, degree) in degree {
            if net == "0" {
                continue;
            }
            match degree {
                0 => issues.push(LintIssue::new_and_log(
                    Cause::Floating,
                    net.into(),
                    Severity::Warning,
                )),
                1 => issues.push(LintIssue::new_and_log(
                    Cause::SingleConnection,
                    net.into(),
                    Severity::Info,
                )),
                _ => {}
            }
        }
        Self { issues }
    }

    /// Returns an iterator over all issues.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &LintIssue> {
        self.issues.iter()
    }

    /// The number of issues.
    #[inline]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns `true` if there are no issues.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns `true` if any issue is a warning.
    pub fn has_warning(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Warning)
    }
}

impl Display for LintReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for issue in self.issues.iter() {
            writeln!(f, "{}", issue)?;
        }
        Ok(())
    }
}
