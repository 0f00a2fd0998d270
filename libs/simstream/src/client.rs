//! Submission of simulations to a server.

use std::sync::Arc;

use directives::DirectiveText;
use flatten::{FlatNetlist, NetNameMap, NetlistOptions, SchematicLocation, SourceMap, SpiceText};
use indexmap::IndexMap;
use tokio::net::TcpStream;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::ordering::Reorderer;
use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::session::{Driver, Session, SessionState, Shared};

/// Everything needed to start a simulation.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The netlist and its source map.
    pub netlist: SpiceText,
    /// The translated analysis statements.
    pub directives: DirectiveText,
    /// Maps flattened ids back to schematic names.
    pub net_map: NetNameMap,
    /// Server-specific options, passed through unchanged.
    pub options: IndexMap<String, String>,
}

impl Submission {
    /// Renders `netlist` and bundles it with its translated directives.
    pub fn new(netlist: &FlatNetlist, options: &NetlistOptions, directives: DirectiveText) -> Self {
        Self {
            netlist: SpiceText::new(netlist, options),
            directives,
            net_map: netlist.nets.clone(),
            options: IndexMap::new(),
        }
    }

    /// Sets a server option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The complete simulator input.
    pub fn deck(&self) -> String {
        self.netlist.deck(&self.directives.text)
    }
}

/// A client for a simulation server.
#[derive(Debug, Clone, Default)]
pub struct SimClient {
    config: Arc<ClientConfig>,
}

impl SimClient {
    /// Creates a new client.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The client's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Submits a simulation and returns the running session.
    ///
    /// Fails with [`Error::ServerUnavailable`] if the server cannot be
    /// reached or does not answer within the accept timeout, and with
    /// [`Error::RejectedPayload`] if it refuses the submission.
    pub async fn submit(&self, submission: Submission) -> Result<Session> {
        let config = &self.config;
        let shared = Arc::new(Shared::new(config.intake_capacity));
        shared.transition(SessionState::Submitting);

        let unavailable = |reason: String| Error::ServerUnavailable {
            addr: config.addr.clone(),
            reason,
        };

        let stream = match tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(config.addr.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(unavailable(e.to_string())),
            Err(_) => {
                return Err(unavailable(format!(
                    "no connection within {} ms",
                    config.connect_timeout.as_millis()
                )))
            }
        };
        let mut transport = protocol::framed(stream);

        let deck = submission.deck();
        tracing::debug!(
            addr = %config.addr,
            lines = deck.lines().count(),
            vectors = submission.directives.probes.len(),
            "submitting simulation"
        );
        protocol::send(
            &mut transport,
            &ClientMessage::Submit {
                deck,
                options: submission.options.clone(),
            },
        )
        .await?;

        let answer = match tokio::time::timeout(
            config.accept_timeout,
            protocol::recv::<_, ServerMessage>(&mut transport),
        )
        .await
        {
            Ok(answer) => answer?,
            Err(_) => {
                return Err(unavailable(format!(
                    "submission not answered within {} ms",
                    config.accept_timeout.as_millis()
                )))
            }
        };

        let session = match answer {
            Some(ServerMessage::Accepted { session }) => session,
            Some(ServerMessage::Rejected {
                message,
                line,
                reference,
            }) => {
                let location = locate_rejection(
                    &submission.netlist.source_map,
                    &submission.net_map,
                    &message,
                    line,
                    reference.as_deref(),
                );
                let error = Error::RejectedPayload {
                    message,
                    line,
                    location,
                };
                tracing::warn!("{}", error);
                return Err(error);
            }
            Some(other) => {
                return Err(Error::Protocol(format!(
                    "expected a submission answer, got {:?}",
                    other
                )))
            }
            None => return Err(unavailable("connection closed before accepting".to_string())),
        };

        tracing::info!(session, "simulation accepted");
        shared.transition(SessionState::Running);
        let driver = Driver {
            transport,
            shared: shared.clone(),
            session,
            net_map: submission.net_map,
            probes: submission.directives.probes,
            reorderer: Reorderer::new(config.reorder),
            overflow: config.overflow,
            idle_timeout: config.idle_timeout,
            cancel_grace: config.cancel_grace,
            last_record: 0,
        };
        Ok(Session::start(
            session,
            shared,
            driver,
            config.retention,
            config.cancel_grace,
        ))
    }
}

/// Recovers the schematic location of a rejected submission.
///
/// Tries, in order: the reported deck line, the reported identifier, and
/// any identifier-like token of the message.
pub(crate) fn locate_rejection(
    source_map: &SourceMap,
    net_map: &NetNameMap,
    message: &str,
    line: Option<usize>,
    reference: Option<&str>,
) -> Option<SchematicLocation> {
    let by_line = line
        .and_then(|line| source_map.device_at(line))
        .and_then(|device| net_map.device(device))
        .map(|device| device.location());
    by_line
        .or_else(|| reference.and_then(|r| net_map.locate(r)))
        .or_else(|| {
            message
                .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                .map(|token| token.trim_matches('.'))
                .filter(|token| !token.is_empty())
                .find_map(|token| net_map.locate(token))
        })
}
