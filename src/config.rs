//! Session configuration

use crate::{
    backoff::ReconnectDelay,
    constants::{
        DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_ESL_PORT, DEFAULT_MAX_CONCURRENT_HANDLERS,
        DEFAULT_RECONNECTS, DEFAULT_RECONNECT_UNIT_MS, DEFAULT_TIMEOUT_MS, MAX_EVENT_QUEUE_SIZE,
    },
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Options for one event socket session.
///
/// Every field has a default, so a host application can deserialize a
/// partial section of its own configuration file:
///
/// ```
/// # use freeswitch_esl_session::SessionOptions;
/// let opts: SessionOptions = serde_json::from_str(r#"{
///     "address": "10.0.0.5:8021",
///     "password": "s3cret",
///     "event_filters": {"Call-Direction": ["inbound"]}
/// }"#).unwrap();
/// assert_eq!(opts.reconnects, 5);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// `host:port` of the switch's event socket.
    pub address: String,
    /// Event socket password.
    pub password: String,
    /// Dial attempts per connect.
    pub reconnects: usize,
    /// Growth of the pause between dial attempts.
    pub reconnect_delay: ReconnectDelay,
    /// One backoff unit.
    pub reconnect_unit_ms: u64,
    /// Upper bound on a single pause. 0 = uncapped.
    pub max_reconnect_interval_ms: u64,
    /// TCP connect timeout.
    pub connect_timeout_ms: u64,
    /// How long a command waits for its reply.
    pub command_timeout_ms: u64,
    /// Capacity of the queue between the reader and the dispatcher.
    pub event_queue_size: usize,
    /// Handlers allowed to run at once.
    pub max_concurrent_handlers: usize,
    /// Header → accepted values, sent as `filter` commands on every connect.
    pub event_filters: BTreeMap<String, Vec<String>>,
    /// Index handed to handlers with each event.
    pub conn_id: usize,
    /// Label used in log lines.
    pub alias: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", DEFAULT_ESL_PORT),
            password: "ClueCon".to_string(),
            reconnects: DEFAULT_RECONNECTS,
            reconnect_delay: ReconnectDelay::default(),
            reconnect_unit_ms: DEFAULT_RECONNECT_UNIT_MS,
            max_reconnect_interval_ms: 0,
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            event_queue_size: MAX_EVENT_QUEUE_SIZE,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            event_filters: BTreeMap::new(),
            conn_id: 0,
            alias: String::new(),
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("address", &self.address)
            .field("password", &"[REDACTED]")
            .field("reconnects", &self.reconnects)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("reconnect_unit_ms", &self.reconnect_unit_ms)
            .field("max_reconnect_interval_ms", &self.max_reconnect_interval_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .field("event_queue_size", &self.event_queue_size)
            .field("max_concurrent_handlers", &self.max_concurrent_handlers)
            .field("event_filters", &self.event_filters)
            .field("conn_id", &self.conn_id)
            .field("alias", &self.alias)
            .finish()
    }
}

impl SessionOptions {
    /// Options for `address` with `password`, everything else default.
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Set the number of dial attempts per connect.
    pub fn with_reconnects(mut self, reconnects: usize) -> Self {
        self.reconnects = reconnects;
        self
    }

    /// Add one accepted value for `header`.
    pub fn with_filter(mut self, header: impl Into<String>, value: impl Into<String>) -> Self {
        self.event_filters
            .entry(header.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Set the index handed to handlers.
    pub fn with_conn_id(mut self, conn_id: usize) -> Self {
        self.conn_id = conn_id;
        self
    }

    pub fn reconnect_unit(&self) -> Duration {
        Duration::from_millis(self.reconnect_unit_ms)
    }

    pub fn max_reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Name used in log lines: the alias, or the address when unset.
    pub fn label(&self) -> &str {
        if self.alias.is_empty() {
            &self.address
        } else {
            &self.alias
        }
    }
}
