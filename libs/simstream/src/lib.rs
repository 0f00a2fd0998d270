//! A streaming client for simulation servers.
//!
//! A [`SimClient`] submits a rendered netlist and its directives as a
//! [`Submission`], then returns a [`Session`] that yields typed
//! [`ResultRecord`]s as the server produces them. Sample values are renamed
//! from simulator vectors to the schematic probes that requested them, and
//! identifiers in errors are mapped back to schematic locations.
//!
//! Each session is driven by a single task that owns the connection. The
//! task hands records to the consumer through a bounded buffer, pausing the
//! server or dropping the oldest samples when the consumer falls behind,
//! according to the configured [`OverflowPolicy`].
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
mod intake;
pub mod ordering;
pub mod protocol;
pub mod record;
pub mod session;

pub use client::{SimClient, Submission};
pub use config::{ClientConfig, ClientConfigBuilder, OverflowPolicy, RetentionPolicy};
pub use error::{Error, Result};
pub use ordering::ReorderPolicy;
pub use record::{ErrorKind, ErrorRecord, FinalStatus, ResultRecord, Sample, SampleValue, Severity};
pub use session::{History, Session, SessionState};

#[cfg(test)]
pub(crate) mod tests;
