use std::time::Duration;

use thiserror::Error;

use crate::{
    backlog::BacklogConfiguration,
    sender::Sender,
    transport::{Connector, TcpConnector},
};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 10051;
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_MAX_BACKLOG_TIME: Duration = Duration::from_secs(600);
const DEFAULT_MAX_PER_SEND: usize = 2048;

/// Errors that could occur while building a sender.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The trapper host was empty.
    #[error("trapper host must not be empty")]
    InvalidHost,

    /// The timeout was zero.
    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    /// The maximum number of items per send was zero.
    #[error("maximum items per send must be at least 1")]
    InvalidMaxPerSend,
}

/// Validated sender configuration.
#[derive(Clone, Debug)]
pub struct SenderConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) timeout: Duration,
    pub(crate) with_timestamps: bool,
    pub(crate) with_ns: bool,
    pub(crate) items_host: String,
    pub(crate) max_backlog_time: Duration,
    pub(crate) max_per_send: usize,
}

impl SenderConfig {
    /// Returns the trapper host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the trapper port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the round trip timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `true` if items and requests are stamped with a clock.
    pub fn with_timestamps(&self) -> bool {
        self.with_timestamps
    }

    /// Returns `true` if stamps include nanoseconds.
    pub fn with_ns(&self) -> bool {
        self.with_ns
    }

    /// Returns the host assigned to items that don't specify one.
    pub fn items_host(&self) -> &str {
        &self.items_host
    }

    /// Returns how long a failed item remains eligible for a retry.
    pub fn max_backlog_time(&self) -> Duration {
        self.max_backlog_time
    }

    /// Returns the maximum number of items sent per request.
    pub fn max_per_send(&self) -> usize {
        self.max_per_send
    }

    pub(crate) fn backlog_config(&self) -> BacklogConfiguration {
        BacklogConfiguration {
            items_host: self.items_host.clone(),
            with_timestamps: self.with_timestamps,
            with_ns: self.with_ns,
        }
    }
}

/// Builder for a [`Sender`].
pub struct SenderBuilder {
    host: String,
    port: u16,
    timeout: Duration,
    with_ns: bool,
    with_timestamps: bool,
    items_host: Option<String>,
    max_backlog_time: Duration,
    max_per_send: usize,
}

impl SenderBuilder {
    /// Creates a new `SenderBuilder` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host of the trapper to send items to.
    ///
    /// Defaults to `localhost`.
    #[must_use]
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port of the trapper to send items to.
    ///
    /// Defaults to 10051.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the timeout for a single send.
    ///
    /// The timeout covers the entire round trip: connecting, writing the request, and reading the response. When it
    /// is reached, the connection is dropped and the send fails.
    ///
    /// Defaults to 5 seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets whether or not to stamp items and requests with a clock.
    ///
    /// Items are stamped when added, not when sent, replacing any clock they were created with. Only items carrying a
    /// clock are put back into the backlog after a failed send.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_timestamps(mut self, with_timestamps: bool) -> Self {
        self.with_timestamps = with_timestamps;
        self
    }

    /// Sets whether or not stamps include nanoseconds.
    ///
    /// Enabling this also enables timestamps, regardless of [`SenderBuilder::with_timestamps`].
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_ns(mut self, with_ns: bool) -> Self {
        self.with_ns = with_ns;
        self
    }

    /// Set the host assigned to items that don't specify one.
    ///
    /// Defaults to the hostname of the local machine.
    #[must_use]
    pub fn with_items_host<H: Into<String>>(mut self, items_host: H) -> Self {
        self.items_host = Some(items_host.into());
        self
    }

    /// Set how long items remain eligible for a retry after a failed send.
    ///
    /// When a send fails, items from the batch stamped within this long before the send started are put back at the
    /// front of the backlog. Older ones are dropped.
    ///
    /// Defaults to 600 seconds.
    #[must_use]
    pub fn with_max_backlog_time(mut self, max_backlog_time: Duration) -> Self {
        self.max_backlog_time = max_backlog_time;
        self
    }

    /// Set the maximum number of items sent in a single request.
    ///
    /// Defaults to 2048.
    #[must_use]
    pub fn with_max_per_send(mut self, max_per_send: usize) -> Self {
        self.max_per_send = max_per_send;
        self
    }

    fn into_config(self) -> Result<SenderConfig, BuildError> {
        if self.host.is_empty() {
            return Err(BuildError::InvalidHost);
        }
        if self.timeout.is_zero() {
            return Err(BuildError::InvalidTimeout);
        }
        if self.max_per_send == 0 {
            return Err(BuildError::InvalidMaxPerSend);
        }

        let items_host = self.items_host.unwrap_or_else(local_hostname);

        Ok(SenderConfig {
            host: self.host,
            port: self.port,
            timeout: self.timeout,
            with_timestamps: self.with_timestamps || self.with_ns,
            with_ns: self.with_ns,
            items_host,
            max_backlog_time: self.max_backlog_time,
            max_per_send: self.max_per_send,
        })
    }

    /// Builds a sender that talks to the trapper over TCP.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, an error will be returned indicating the reason.
    pub fn build(self) -> Result<Sender<TcpConnector>, BuildError> {
        self.build_with_connector(TcpConnector)
    }

    /// Builds a sender that opens connections with the given connector.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, an error will be returned indicating the reason.
    pub fn build_with_connector<C: Connector>(self, connector: C) -> Result<Sender<C>, BuildError> {
        let config = self.into_config()?;
        Ok(Sender::new(config, connector))
    }
}

impl Default for SenderBuilder {
    fn default() -> Self {
        SenderBuilder {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            with_ns: false,
            with_timestamps: false,
            items_host: None,
            max_backlog_time: DEFAULT_MAX_BACKLOG_TIME,
            max_per_send: DEFAULT_MAX_PER_SEND,
        }
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}
