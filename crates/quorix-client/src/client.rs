//! Entry point tying partitions, configuration and primitives together.

use crate::{
    config::ClientConfig,
    counter::Counter,
    list::List,
    partition::Partitions,
    primitive::{PrimitiveName, PrimitiveOptions},
    session::{LoggingObserver, SessionObserver},
};
use quorix_core::Result;
use std::sync::Arc;
use tonic::transport::Channel;

/// A client over a fixed set of partitions.
///
/// Creating primitive handles performs no I/O: each handle opens its session
/// on the first operation. Every handle owns its own session.
#[derive(Clone)]
pub struct Client {
    partitions: Partitions<Channel>,
    config: ClientConfig,
    observer: Arc<dyn SessionObserver>,
}

impl core::fmt::Debug for Client {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("partitions", &self.partitions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client over `partitions`, one channel per partition in
    /// partition order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](quorix_core::Error::InvalidConfig) if
    /// `config` does not validate.
    pub fn new(partitions: Vec<Channel>, config: ClientConfig) -> Result<Self> {
        config.validate()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            partitions = partitions.len(),
            namespace = %config.namespace,
            "Creating client"
        );

        Ok(Self {
            partitions: Partitions::new(partitions),
            config,
            observer: Arc::new(LoggingObserver),
        })
    }

    /// Replaces the observer notified of keep-alive and stream failures.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns a handle to the list called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](quorix_core::Error::InvalidArgument)
    /// if `name` is empty or the client has no partitions.
    pub fn list(&self, name: &str, options: PrimitiveOptions) -> Result<List> {
        let partition = self.partitions.route(name)?;
        Ok(List::new(
            self.name(name),
            partition,
            options,
            &self.config,
            Arc::clone(&self.observer),
        ))
    }

    /// Returns a handle to the counter called `name`.
    ///
    /// # Errors
    ///
    /// See [`list`](Self::list).
    pub fn counter(&self, name: &str, options: PrimitiveOptions) -> Result<Counter> {
        let partition = self.partitions.route(name)?;
        Ok(Counter::new(
            self.name(name),
            partition,
            options,
            &self.config,
            Arc::clone(&self.observer),
        ))
    }

    fn name(&self, name: &str) -> PrimitiveName {
        PrimitiveName::new(self.config.namespace.clone(), name)
    }
}
