//! Client configuration.
//!
//! This module defines the defaults and the validated [`ClientConfig`] used by
//! every session and primitive handle created through a
//! [`Client`](crate::Client).
//!
//! ## Key Concepts
//! - **Keep-alive**: each open session pings its partition on a fixed interval.
//! - **Request timeout**: bounds every unary RPC, including session RPCs.
//! - **Event buffering**: events waiting to be consumed by the application are
//!   held in a bounded queue. A full queue applies back-pressure to the stream
//!   task rather than dropping events.
//!
//! With the `cli` feature enabled, [`ClientArgs`] exposes the same settings as
//! `clap` arguments backed by `QUORIX_*` environment variables, so
//! applications can flatten them into their own command line.

use core::time::Duration;
use quorix_core::{Error, Result};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Interval between keep-alive requests of an open session.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Deadline applied to unary RPCs issued on behalf of a session.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Number of events buffered per watch before the stream task waits for the
/// application to catch up.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// Settings consumed by a single [`Session`](crate::session::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub keep_alive_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Runtime configuration shared by all primitives of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Namespace sent with every primitive identifier.
    pub namespace: String,
    /// Client identifier sent on session creation. Individual primitives may
    /// override it through
    /// [`PrimitiveOptions`](crate::primitive::PrimitiveOptions).
    pub client_id: Option<String>,
    pub keep_alive_interval: Duration,
    pub request_timeout: Duration,
    pub event_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            client_id: None,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the namespace is empty or any
    /// interval, timeout or buffer size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(invalid("namespace must not be empty"));
        }
        if self.keep_alive_interval.is_zero() {
            return Err(invalid("keep-alive interval must be greater than 0"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request timeout must be greater than 0"));
        }
        if self.event_buffer_size == 0 {
            return Err(invalid("event buffer size must be greater than 0"));
        }
        Ok(())
    }

    pub const fn session_config(&self) -> SessionConfig {
        SessionConfig {
            keep_alive_interval: self.keep_alive_interval,
            request_timeout: self.request_timeout,
        }
    }
}

fn invalid(reason: &str) -> Error {
    Error::InvalidConfig {
        reason: reason.to_string(),
    }
}

/// Fluent builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.config.keep_alive_interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::validate`].
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(feature = "cli")]
const DEFAULT_KEEP_ALIVE_MS: u64 = DEFAULT_KEEP_ALIVE_INTERVAL.as_millis() as u64;

#[cfg(feature = "cli")]
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = DEFAULT_REQUEST_TIMEOUT.as_millis() as u64;

/// Command-line and environment arguments for [`ClientConfig`].
///
/// Flatten into an application's parser with `#[command(flatten)]`.
#[cfg(feature = "cli")]
#[derive(clap::Args, Debug, Clone)]
pub struct ClientArgs {
    /// Namespace that scopes every primitive name.
    ///
    /// Environment variable: `QUORIX_NAMESPACE`
    #[arg(long, env = "QUORIX_NAMESPACE", default_value_t = String::from(DEFAULT_NAMESPACE))]
    pub namespace: String,

    /// Client identifier reported when sessions are created.
    ///
    /// Environment variable: `QUORIX_CLIENT_ID`
    #[arg(long, env = "QUORIX_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Milliseconds between session keep-alive requests.
    ///
    /// Environment variable: `QUORIX_KEEP_ALIVE_MS`
    #[arg(long, env = "QUORIX_KEEP_ALIVE_MS", default_value_t = DEFAULT_KEEP_ALIVE_MS)]
    pub keep_alive_ms: u64,

    /// Deadline in milliseconds for unary requests.
    ///
    /// Environment variable: `QUORIX_REQUEST_TIMEOUT_MS`
    #[arg(long, env = "QUORIX_REQUEST_TIMEOUT_MS", default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    /// Events buffered per watch before back-pressure applies.
    ///
    /// Environment variable: `QUORIX_EVENT_BUFFER_SIZE`
    #[arg(long, env = "QUORIX_EVENT_BUFFER_SIZE", default_value_t = DEFAULT_EVENT_BUFFER_SIZE)]
    pub event_buffer_size: usize,
}

#[cfg(feature = "cli")]
impl TryFrom<ClientArgs> for ClientConfig {
    type Error = Error;

    fn try_from(args: ClientArgs) -> Result<Self> {
        let config = Self {
            namespace: args.namespace,
            client_id: args.client_id,
            keep_alive_interval: Duration::from_millis(args.keep_alive_ms),
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            event_buffer_size: args.event_buffer_size,
        };
        config.validate()?;
        Ok(config)
    }
}
