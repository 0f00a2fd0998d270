//! Running simulation sessions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use directives::ProbeMap;
use flatten::NetNameMap;
use futures_util::Stream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{OverflowPolicy, RetentionPolicy};
use crate::error::Error;
use crate::intake::Intake;
use crate::ordering::Reorderer;
use crate::protocol::{self, ClientMessage, ServerMessage, Transport};
use crate::record::{FinalStatus, ResultRecord, Sample};

/// The lifecycle of a session.
///
/// `Idle → Submitting → Running → {Completed, Failed, Cancelled}`.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Nothing submitted yet.
    Idle,
    /// Waiting for the server to accept the submission.
    Submitting,
    /// Records are streaming.
    Running,
    /// The server reported successful completion.
    Completed,
    /// The simulation failed or the connection was lost.
    Failed(Arc<Error>),
    /// The session was cancelled.
    Cancelled,
}

impl SessionState {
    /// Returns `true` once the session can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    fn allows(&self, next: &SessionState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Submitting) => true,
            (Self::Submitting, Self::Running | Self::Failed(_)) => true,
            (Self::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

/// State shared between a session handle and its receive loop.
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<SessionState>,
    pub(crate) intake: Intake,
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    pub(crate) fn new(intake_capacity: usize) -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            intake: Intake::new(intake_capacity),
            cancel: CancellationToken::new(),
        }
    }

    /// Moves to `next` if the lifecycle allows it.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.allows(&next) {
            tracing::trace!(from = state.name(), to = next.name(), "ignoring state change");
            return false;
        }
        tracing::debug!(from = state.name(), to = next.name(), "session state change");
        *state = next;
        true
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state.lock().unwrap().clone()
    }
}

/// The records delivered by a session, kept for replay.
#[derive(Debug, Clone, Default)]
pub struct History {
    records: VecDeque<ResultRecord>,
    samples: usize,
    discarded: u64,
    retention: RetentionPolicy,
}

impl History {
    pub(crate) fn new(retention: RetentionPolicy) -> Self {
        Self {
            retention,
            ..Default::default()
        }
    }

    pub(crate) fn push(&mut self, record: ResultRecord) {
        if record.is_sample() {
            self.samples += 1;
        }
        self.records.push_back(record);
        if let Some(max) = self.retention.max_samples {
            while self.samples > max {
                let Some(oldest) = self.records.iter().position(ResultRecord::is_sample) else {
                    break;
                };
                self.records.remove(oldest);
                self.samples -= 1;
                self.discarded += 1;
            }
        }
    }

    /// Every retained record, in delivery order.
    pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records.iter()
    }

    /// The retained samples, in delivery order.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.records.iter().filter_map(ResultRecord::as_sample)
    }

    /// The number of retained records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been delivered or retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The number of samples discarded by the retention policy.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

/// A running simulation.
///
/// Records are consumed once, through [`Session::next`] or
/// [`Session::into_stream`]; delivered records remain available through
/// [`Session::history`]. Dropping an unfinished session cancels it.
pub struct Session {
    id: u64,
    shared: Arc<Shared>,
    driver: Option<JoinHandle<()>>,
    history: History,
    cancel_grace: Duration,
}

impl Session {
    pub(crate) fn start(
        id: u64,
        shared: Arc<Shared>,
        driver: Driver,
        retention: RetentionPolicy,
        cancel_grace: Duration,
    ) -> Self {
        use tracing::Instrument;
        let span = tracing::info_span!("session", id);
        Self {
            id,
            shared,
            driver: Some(tokio::spawn(driver.run().instrument(span))),
            history: History::new(retention),
            cancel_grace,
        }
    }

    /// The id assigned by the server.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The next record, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<ResultRecord> {
        let record = self.shared.intake.recv().await?;
        self.history.push(record.clone());
        Some(record)
    }

    /// Consumes the session as a stream of records.
    pub fn into_stream(self) -> impl Stream<Item = ResultRecord> {
        futures_util::stream::unfold(self, |mut session| async move {
            let record = session.next().await?;
            Some((record, session))
        })
    }

    /// Consumes every remaining record and returns the final state.
    pub async fn wait(&mut self) -> SessionState {
        while self.next().await.is_some() {}
        self.state()
    }

    /// Cancels the session.
    ///
    /// Returns once the server acknowledges or the grace period elapses,
    /// whichever comes first. Records not yet consumed are discarded.
    pub async fn cancel(&mut self) -> SessionState {
        let state = self.state();
        if state.is_terminal() {
            return state;
        }
        tracing::info!(session = self.id, "cancelling session");
        self.shared.cancel.cancel();
        // The receive loop's own handshake starts after this timer, so a
        // silent server is always cut off here.
        if let Some(mut driver) = self.driver.take() {
            if tokio::time::timeout(self.cancel_grace, &mut driver).await.is_err() {
                tracing::warn!(session = self.id, "receive loop did not stop; aborting");
                driver.abort();
            }
        }
        self.shared.transition(SessionState::Cancelled);
        self.shared.intake.abandon();
        self.state()
    }

    /// Records delivered so far, subject to the retention policy.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The number of samples evicted because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.shared.intake.dropped()
    }

    /// The number of records waiting to be consumed.
    pub fn pending(&self) -> usize {
        self.shared.intake.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            self.shared.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

enum End {
    Done(FinalStatus),
    Cancelled,
}

/// The receive loop of a session.
pub(crate) struct Driver {
    pub(crate) transport: Transport,
    pub(crate) shared: Arc<Shared>,
    pub(crate) session: u64,
    pub(crate) net_map: NetNameMap,
    pub(crate) probes: ProbeMap,
    pub(crate) reorderer: Reorderer,
    pub(crate) overflow: OverflowPolicy,
    pub(crate) idle_timeout: Duration,
    pub(crate) cancel_grace: Duration,
    pub(crate) last_record: u64,
}

impl Driver {
    async fn run(mut self) {
        match self.receive().await {
            Ok(End::Done(status)) => {
                let next = match status {
                    FinalStatus::Completed => SessionState::Completed,
                    FinalStatus::Cancelled => SessionState::Cancelled,
                    FinalStatus::Failed(message) => {
                        SessionState::Failed(Arc::new(Error::SimulationFailed {
                            session: self.session,
                            last_record: self.last_record,
                            message,
                        }))
                    }
                };
                tracing::info!(records = self.last_record, state = next.name(), "session finished");
                self.shared.transition(next);
                self.shared.intake.close();
            }
            Ok(End::Cancelled) => {
                self.handshake().await;
                self.shared.transition(SessionState::Cancelled);
                self.shared.intake.abandon();
            }
            Err(reason) => {
                for record in self.reorderer.flush() {
                    tokio::select! {
                        biased;
                        _ = self.shared.cancel.cancelled() => break,
                        _ = self.shared.intake.push(record) => {}
                    }
                }
                let error = Error::ConnectionLost {
                    session: self.session,
                    last_record: self.last_record,
                    reason,
                };
                tracing::warn!("{}", error);
                self.shared.transition(SessionState::Failed(Arc::new(error)));
                self.shared.intake.close();
            }
        }
    }

    async fn receive(&mut self) -> std::result::Result<End, String> {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.shared.cancel.cancelled() => return Ok(End::Cancelled),
                message = tokio::time::timeout(
                    self.idle_timeout,
                    protocol::recv::<_, ServerMessage>(&mut self.transport),
                ) => message,
            };
            let message = match message {
                Err(_) => {
                    return Err(format!(
                        "no message within {} ms",
                        self.idle_timeout.as_millis()
                    ))
                }
                Ok(Err(e)) => return Err(e.to_string()),
                Ok(Ok(None)) => return Err("connection closed by server".to_string()),
                Ok(Ok(Some(message))) => message,
            };

            match message {
                ServerMessage::Record { seq, record } => {
                    self.last_record = seq;
                    let status = match &record {
                        ResultRecord::Done(status) => Some(status.clone()),
                        _ => None,
                    };
                    let translated = self.translate(record);
                    for ready in self.order(translated) {
                        if !self.deliver(ready).await? {
                            return Ok(End::Cancelled);
                        }
                    }
                    if let Some(status) = status {
                        return Ok(End::Done(status));
                    }
                }
                ServerMessage::CancelAck => {
                    tracing::debug!("ignoring unsolicited cancel acknowledgement");
                }
                other => tracing::warn!(message = ?other, "ignoring unexpected message"),
            }
        }
    }

    /// Renames sample values to probe names and locates error references.
    fn translate(&self, record: ResultRecord) -> ResultRecord {
        match record {
            ResultRecord::Sample(mut sample) => {
                // Probed vectors follow the order of the probes, anything
                // else keeps its place at the end.
                let mut values: Vec<_> = sample
                    .values
                    .into_iter()
                    .map(|(vector, value)| match self.probes.find(&vector) {
                        Some((rank, name)) => (rank, name.clone(), value),
                        None => (usize::MAX, vector, value),
                    })
                    .collect();
                values.sort_by_key(|(rank, _, _)| *rank);
                sample.values = values
                    .into_iter()
                    .map(|(_, name, value)| (name, value))
                    .collect();
                ResultRecord::Sample(sample)
            }
            ResultRecord::Error(mut error) => {
                if error.location.is_none() {
                    error.location = error
                        .reference
                        .as_deref()
                        .and_then(|r| self.net_map.locate(r));
                }
                ResultRecord::Error(error)
            }
            other => other,
        }
    }

    fn order(&mut self, record: ResultRecord) -> Vec<ResultRecord> {
        match record {
            ResultRecord::Sample(sample) => self.reorderer.push(sample),
            ResultRecord::Done(status) => {
                let mut ready = self.reorderer.flush();
                ready.push(ResultRecord::Done(status));
                ready
            }
            other => vec![other],
        }
    }

    /// Hands a record to the consumer according to the overflow policy.
    ///
    /// Returns `false` if the session was cancelled while waiting.
    async fn deliver(&mut self, record: ResultRecord) -> std::result::Result<bool, String> {
        match self.overflow {
            OverflowPolicy::DropOldestSample => {
                let evicted = self.shared.intake.push_evicting(record);
                if evicted > 0 {
                    tracing::warn!(evicted, "consumer behind; dropped oldest samples");
                }
                Ok(true)
            }
            OverflowPolicy::FlowControl => {
                let record = match self.shared.intake.try_push(record) {
                    Ok(()) => return Ok(true),
                    Err(record) => record,
                };
                protocol::send(&mut self.transport, &ClientMessage::Pause)
                    .await
                    .map_err(|e| e.to_string())?;
                tracing::debug!("consumer behind; paused server");
                let shared = self.shared.clone();
                tokio::select! {
                    biased;
                    _ = shared.cancel.cancelled() => return Ok(false),
                    _ = shared.intake.push(record) => {}
                }
                protocol::send(&mut self.transport, &ClientMessage::Resume)
                    .await
                    .map_err(|e| e.to_string())?;
                tracing::debug!("resumed server");
                Ok(true)
            }
        }
    }

    /// Asks the server to stop and waits up to the grace period for it to
    /// acknowledge. Records received meanwhile are discarded.
    async fn handshake(&mut self) {
        if let Err(e) = protocol::send(&mut self.transport, &ClientMessage::Cancel).await {
            tracing::debug!(error = %e, "could not send cancel request");
            return;
        }
        let grace = self.cancel_grace;
        let transport = &mut self.transport;
        let acknowledged = async move {
            loop {
                match protocol::recv::<_, ServerMessage>(transport).await {
                    Ok(Some(ServerMessage::CancelAck)) => return true,
                    Ok(Some(ServerMessage::Record {
                        record: ResultRecord::Done(_),
                        ..
                    })) => return true,
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => return false,
                }
            }
        };
        match tokio::time::timeout(grace, acknowledged).await {
            Ok(true) => tracing::debug!("server acknowledged cancellation"),
            Ok(false) => tracing::debug!("connection closed during cancellation"),
            Err(_) => tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "no cancel acknowledgement within grace period"
            ),
        }
    }
}
