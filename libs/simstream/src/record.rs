//! Typed records streamed back from a simulation.

use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use flatten::SchematicLocation;
use indexmap::IndexMap;
use num::complex::Complex64;
use serde::{Deserialize, Serialize};

/// The value of a probe at one point.
///
/// Small-signal analyses such as `ac` and `noise` produce complex values.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleValue {
    /// A real value.
    Real(f64),
    /// A complex value.
    Complex(Complex64),
}

impl SampleValue {
    /// The real part.
    pub fn re(&self) -> f64 {
        match self {
            Self::Real(v) => *v,
            Self::Complex(c) => c.re,
        }
    }

    /// The value as a complex number.
    pub fn to_complex(&self) -> Complex64 {
        match self {
            Self::Real(v) => Complex64::new(*v, 0.0),
            Self::Complex(c) => *c,
        }
    }

    /// The magnitude.
    pub fn magnitude(&self) -> f64 {
        self.to_complex().norm()
    }

    /// The phase in degrees, between -180 and 180.
    pub fn phase_deg(&self) -> f64 {
        self.to_complex().arg().to_degrees()
    }

    /// Returns `true` for [`SampleValue::Complex`].
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Complex(_))
    }
}

impl From<f64> for SampleValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<Complex64> for SampleValue {
    fn from(value: Complex64) -> Self {
        Self::Complex(value)
    }
}

impl Display for SampleValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real(v) => write!(f, "{}", v),
            Self::Complex(c) => write!(f, "{}", c),
        }
    }
}

/// One value per probe at a single point of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// The analysis the sample belongs to, e.g. `tran`.
    pub analysis: ArcStr,
    /// The independent variable: time, frequency or swept value.
    pub x: f64,
    /// Probe values, keyed by probe name.
    ///
    /// Sent as a sequence of pairs so that the order survives the wire.
    #[serde(with = "indexmap::map::serde_seq")]
    pub values: IndexMap<ArcStr, SampleValue>,
}

impl Sample {
    /// The value of a probe, if present.
    pub fn value(&self, probe: &str) -> Option<SampleValue> {
        self.values.get(probe).copied()
    }
}

/// Severity of a log record.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational output.
    Info,
    /// A warning.
    Warning,
    /// An error message that did not stop the simulation.
    Error,
}

/// The kind of an error record.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// An error reported by the simulator.
    Simulator,
    /// A sample arrived after a later sample of the same analysis had
    /// already been delivered, and was dropped.
    OutOfOrderSample,
}

/// An error that occurred mid-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The kind of error.
    pub kind: ErrorKind,
    /// A human-readable message.
    pub message: String,
    /// The flattened identifier the error refers to, if any.
    pub reference: Option<ArcStr>,
    /// The schematic location of `reference`, filled in by the client.
    #[serde(default)]
    pub location: Option<SchematicLocation>,
}

/// How a session ended.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum FinalStatus {
    /// Every analysis ran to completion.
    Completed,
    /// The simulation failed.
    Failed(String),
    /// The session was cancelled.
    Cancelled,
}

/// A record of a simulation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultRecord {
    /// Overall progress as a fraction between 0 and 1.
    Progress(f64),
    /// A sample.
    Sample(Sample),
    /// Simulator output.
    Log {
        /// The severity of the message.
        severity: Severity,
        /// The message.
        message: String,
    },
    /// A non-fatal error.
    Error(ErrorRecord),
    /// The end of the session. Always the last record.
    Done(FinalStatus),
}

impl ResultRecord {
    /// Returns `true` for [`ResultRecord::Sample`].
    pub fn is_sample(&self) -> bool {
        matches!(self, Self::Sample(_))
    }

    /// Returns `true` for [`ResultRecord::Done`].
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// The sample carried by this record, if any.
    pub fn as_sample(&self) -> Option<&Sample> {
        match self {
            Self::Sample(sample) => Some(sample),
            _ => None,
        }
    }
}

impl From<Sample> for ResultRecord {
    fn from(value: Sample) -> Self {
        Self::Sample(value)
    }
}

impl From<ErrorRecord> for ResultRecord {
    fn from(value: ErrorRecord) -> Self {
        Self::Error(value)
    }
}
