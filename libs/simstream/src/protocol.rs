//! The wire protocol spoken with simulation servers.
//!
//! Messages travel over TCP as length-delimited frames, each holding one
//! flexbuffers-encoded [`ClientMessage`] or [`ServerMessage`].

use bytes::{Bytes, BytesMut};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::Result;
use crate::record::ResultRecord;

/// A framed connection to a simulation server.
pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

/// Wraps a TCP stream in the protocol's framing.
pub fn framed(stream: TcpStream) -> Transport {
    Framed::new(stream, LengthDelimitedCodec::new())
}

/// Messages sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Starts a simulation session.
    Submit {
        /// The complete simulator input, ending in `.end`.
        deck: String,
        /// Server-specific options, such as the simulator to use.
        options: IndexMap<String, String>,
    },
    /// Asks the server to stop the session.
    Cancel,
    /// Asks the server to stop sending records until resumed.
    Pause,
    /// Lifts a previous pause.
    Resume,
}

/// Messages sent from the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// The submission was accepted.
    Accepted {
        /// The id of the new session.
        session: u64,
    },
    /// The submission was refused.
    Rejected {
        /// The simulator's message.
        message: String,
        /// The offending line of the deck, counting from 1.
        line: Option<usize>,
        /// The offending identifier, as it appears in the deck.
        reference: Option<String>,
    },
    /// A result record.
    Record {
        /// Sequence number, starting from 1.
        seq: u64,
        /// The record, with simulator vector names and identifiers.
        record: ResultRecord,
    },
    /// The server has stopped the session after a cancel request.
    CancelAck,
}

/// Sends one message.
pub async fn send<S, T>(sink: &mut S, message: &T) -> Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
    T: Serialize,
{
    let bytes = flexbuffers::to_vec(message)?;
    sink.send(Bytes::from(bytes)).await?;
    Ok(())
}

/// Receives one message, or `None` once the peer has closed the connection.
pub async fn recv<S, T>(stream: &mut S) -> Result<Option<T>>
where
    S: Stream<Item = std::io::Result<BytesMut>> + Unpin,
    T: DeserializeOwned,
{
    match stream.next().await {
        Some(frame) => {
            let frame = frame?;
            Ok(Some(flexbuffers::from_slice(&frame)?))
        }
        None => Ok(None),
    }
}
