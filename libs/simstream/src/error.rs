//! Simulation session errors.

use flatten::SchematicLocation;
use thiserror::Error as ThisError;

/// The result type returned by the streaming client.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible session errors.
#[derive(ThisError, Debug)]
pub enum Error {
    /// The server could not be reached, or never accepted the submission.
    #[error("simulation server at {addr} unavailable: {reason}")]
    ServerUnavailable {
        /// The configured server address.
        addr: String,
        /// What went wrong.
        reason: String,
    },
    /// The server refused the netlist or directives.
    #[error("simulator rejected the submission: {message}{}", fmt_location(.location))]
    RejectedPayload {
        /// The simulator's message.
        message: String,
        /// The offending line of the submitted deck, if reported.
        line: Option<usize>,
        /// The schematic location of the problem, if it could be recovered.
        location: Option<SchematicLocation>,
    },
    /// The connection dropped or went idle while running.
    #[error("connection to session {session} lost after record {last_record}: {reason}")]
    ConnectionLost {
        /// The session id assigned by the server.
        session: u64,
        /// The sequence number of the last processed record, 0 if none.
        last_record: u64,
        /// What went wrong.
        reason: String,
    },
    /// The simulation finished with a failure status.
    #[error("session {session} failed after record {last_record}: {message}")]
    SimulationFailed {
        /// The session id assigned by the server.
        session: u64,
        /// The sequence number of the final record.
        last_record: u64,
        /// The failure reported by the server.
        message: String,
    },
    /// The server sent a message that is not valid at this point.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Error encoding a message.
    #[error(transparent)]
    Encode(#[from] flexbuffers::SerializationError),
    /// Error decoding a message.
    #[error(transparent)]
    Decode(#[from] flexbuffers::DeserializationError),
}

fn fmt_location(location: &Option<SchematicLocation>) -> String {
    match location {
        Some(location) => format!(" ({})", location),
        None => String::new(),
    }
}
