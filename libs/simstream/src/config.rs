//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ordering::ReorderPolicy;

/// The default simulation server address.
pub const ADDR_DEFAULT: &str = "127.0.0.1:5923";

/// The timeout for connecting to the simulation server.
pub const CONNECT_TIMEOUT_MS_DEFAULT: u64 = 5_000;

/// The timeout for the server to accept or reject a submission.
pub const ACCEPT_TIMEOUT_MS_DEFAULT: u64 = 10_000;

/// The longest a running session may go without a message from the server.
pub const IDLE_TIMEOUT_MS_DEFAULT: u64 = 30_000;

/// How long a cancelled session waits for the server's acknowledgement.
pub const CANCEL_GRACE_MS_DEFAULT: u64 = 2_000;

/// The default number of records buffered for the consumer.
pub const INTAKE_CAPACITY_DEFAULT: usize = 1024;

/// What to do when the consumer falls behind.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Ask the server to pause until the consumer catches up.
    #[default]
    FlowControl,
    /// Evict the oldest buffered samples. Log, error and done records are
    /// never evicted.
    DropOldestSample,
}

/// The default number of samples kept in a session's history.
pub const MAX_SAMPLES_DEFAULT: usize = 100_000;

/// How much of a session is kept for replay.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// The maximum number of samples kept. Older samples are discarded
    /// first; other records are always kept. Unlimited if `None`.
    pub max_samples: Option<usize>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_samples: Some(MAX_SAMPLES_DEFAULT),
        }
    }
}

impl RetentionPolicy {
    /// Keeps every sample.
    pub fn unlimited() -> Self {
        Self { max_samples: None }
    }
}

/// Configuration for a simulation client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub(crate) addr: String,
    pub(crate) connect_timeout: Duration,
    pub(crate) accept_timeout: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) cancel_grace: Duration,
    pub(crate) intake_capacity: usize,
    pub(crate) overflow: OverflowPolicy,
    pub(crate) reorder: ReorderPolicy,
    pub(crate) retention: RetentionPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigBuilder::new().build()
    }
}

impl ClientConfig {
    /// Creates a builder with every option at its default.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// The server address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The grace period granted to the server after a cancel request.
    pub fn cancel_grace(&self) -> Duration {
        self.cancel_grace
    }
}

/// A builder for [`ClientConfig`].
#[derive(Default, Clone, Debug)]
pub struct ClientConfigBuilder {
    addr: Option<String>,
    connect_timeout: Option<Duration>,
    accept_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    cancel_grace: Option<Duration>,
    intake_capacity: Option<usize>,
    overflow: Option<OverflowPolicy>,
    reorder: Option<ReorderPolicy>,
    retention: Option<RetentionPolicy>,
}

impl ClientConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server address, e.g. `127.0.0.1:5923`.
    pub fn addr(&mut self, addr: impl Into<String>) -> &mut Self {
        self.addr = Some(addr.into());
        self
    }

    /// Sets the timeout for establishing a connection.
    pub fn connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the timeout for the server to answer a submission.
    pub fn accept_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.accept_timeout = Some(timeout);
        self
    }

    /// Sets the longest silence tolerated from a running session.
    pub fn idle_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Sets how long a cancelled session waits for acknowledgement.
    pub fn cancel_grace(&mut self, grace: Duration) -> &mut Self {
        self.cancel_grace = Some(grace);
        self
    }

    /// Sets the number of records buffered for the consumer.
    pub fn intake_capacity(&mut self, capacity: usize) -> &mut Self {
        self.intake_capacity = Some(capacity);
        self
    }

    /// Sets the overflow policy.
    pub fn overflow(&mut self, policy: OverflowPolicy) -> &mut Self {
        self.overflow = Some(policy);
        self
    }

    /// Sets the reorder policy.
    pub fn reorder(&mut self, policy: ReorderPolicy) -> &mut Self {
        self.reorder = Some(policy);
        self
    }

    /// Sets the retention policy of the session history.
    pub fn retention(&mut self, policy: RetentionPolicy) -> &mut Self {
        self.retention = Some(policy);
        self
    }

    /// Builds the configuration.
    pub fn build(&self) -> ClientConfig {
        ClientConfig {
            addr: self
                .addr
                .clone()
                .unwrap_or_else(|| ADDR_DEFAULT.to_string()),
            connect_timeout: self
                .connect_timeout
                .unwrap_or(Duration::from_millis(CONNECT_TIMEOUT_MS_DEFAULT)),
            accept_timeout: self
                .accept_timeout
                .unwrap_or(Duration::from_millis(ACCEPT_TIMEOUT_MS_DEFAULT)),
            idle_timeout: self
                .idle_timeout
                .unwrap_or(Duration::from_millis(IDLE_TIMEOUT_MS_DEFAULT)),
            cancel_grace: self
                .cancel_grace
                .unwrap_or(Duration::from_millis(CANCEL_GRACE_MS_DEFAULT)),
            intake_capacity: self.intake_capacity.unwrap_or(INTAKE_CAPACITY_DEFAULT),
            overflow: self.overflow.unwrap_or_default(),
            reorder: self.reorder.unwrap_or_default(),
            retention: self.retention.unwrap_or_default(),
        }
    }
}
