//! Library resolution errors.

use arcstr::ArcStr;

use crate::Version;

/// The result type returned by resolution.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible resolution errors.
#[derive(thiserror::Error, Debug, Clone)]
#[allow(missing_docs)]
pub enum Error {
    /// No document matches the reference.
    #[error("no cell `{name}` in namespace `{namespace}`{}", fmt_version(.version))]
    NotFound {
        namespace: ArcStr,
        name: ArcStr,
        version: Option<Version>,
    },
    /// The reference did not pin a version and several versions qualify.
    #[error(
        "cell `{namespace}/{name}` has multiple incompatible versions ({}); specify one",
        .candidates.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
    )]
    AmbiguousVersion {
        namespace: ArcStr,
        name: ArcStr,
        candidates: Vec<Version>,
    },
    /// The namespace is not a dot-separated list of identifiers.
    #[error("invalid namespace `{0}`")]
    InvalidNamespace(ArcStr),
    /// The document store failed.
    #[error("document store error: {0}")]
    Store(#[from] StoreError),
}

/// A failure reported by a [`DocumentStore`](crate::DocumentStore).
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct StoreError {
    /// What went wrong.
    pub message: String,
}

impl StoreError {
    /// Creates a new [`StoreError`].
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

fn fmt_version(version: &Option<Version>) -> String {
    match version {
        Some(v) => format!(" at version `{}`", v.as_str()),
        None => String::new(),
    }
}
