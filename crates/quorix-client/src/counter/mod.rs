//! Replicated 64-bit counter.

mod session;

pub use session::CounterSession;

use crate::{
    config::ClientConfig,
    partition::Partition,
    primitive::{Primitive, PrimitiveName, PrimitiveOptions, request},
    session::{Session, SessionObserver},
};
use core::time::Duration;
use quorix_core::{
    Result,
    proto::counter::{
        DecrementRequest, GetRequest, IncrementRequest, SetRequest,
        counter_service_client::CounterServiceClient,
    },
};
use std::sync::Arc;
use tonic::transport::Channel;

/// Handle to a replicated counter.
#[derive(Debug, Clone)]
pub struct Counter {
    name: PrimitiveName,
    client: CounterServiceClient<Channel>,
    session: Session<CounterSession>,
    request_timeout: Duration,
}

impl Counter {
    pub(crate) fn new(
        name: PrimitiveName,
        partition: Partition<Channel>,
        options: PrimitiveOptions,
        config: &ClientConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let client = CounterServiceClient::new(partition.connection);
        let client_id = options
            .client_id
            .or_else(|| config.client_id.clone())
            .unwrap_or_default();
        let handler = CounterSession::new(client.clone(), (&name).into(), client_id);
        let session = Session::new(
            partition.index,
            handler,
            config.session_config(),
            observer,
        );

        Self {
            name,
            client,
            session,
            request_timeout: config.request_timeout,
        }
    }

    pub fn session(&self) -> &Session<CounterSession> {
        &self.session
    }

    /// Returns the current value.
    ///
    /// # Errors
    ///
    /// Returns the session error or the backend status.
    pub async fn get(&self) -> Result<i64> {
        let header = self.session.current_header().await?;
        let message = GetRequest {
            header: Some(header),
        };
        let response = self
            .client
            .clone()
            .get(request(message, self.request_timeout))
            .await?
            .into_inner();
        self.session.record_response(response.header.as_ref());
        Ok(response.value)
    }

    /// Sets the value and returns the previous one.
    ///
    /// # Errors
    ///
    /// Returns the session error or the backend status.
    pub async fn set(&self, value: i64) -> Result<i64> {
        let header = self.session.next_header().await?;
        let message = SetRequest {
            header: Some(header),
            value,
        };
        let response = self
            .client
            .clone()
            .set(request(message, self.request_timeout))
            .await?
            .into_inner();
        self.session.record_response(response.header.as_ref());
        Ok(response.previous_value)
    }

    /// Adds `delta` and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns the session error or the backend status.
    pub async fn increment(&self, delta: i64) -> Result<i64> {
        let header = self.session.next_header().await?;
        let message = IncrementRequest {
            header: Some(header),
            delta,
        };
        let response = self
            .client
            .clone()
            .increment(request(message, self.request_timeout))
            .await?
            .into_inner();
        self.session.record_response(response.header.as_ref());
        Ok(response.next_value)
    }

    /// Subtracts `delta` and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns the session error or the backend status.
    pub async fn decrement(&self, delta: i64) -> Result<i64> {
        let header = self.session.next_header().await?;
        let message = DecrementRequest {
            header: Some(header),
            delta,
        };
        let response = self
            .client
            .clone()
            .decrement(request(message, self.request_timeout))
            .await?
            .into_inner();
        self.session.record_response(response.header.as_ref());
        Ok(response.next_value)
    }
}

impl Primitive for Counter {
    fn name(&self) -> &PrimitiveName {
        &self.name
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await
    }

    async fn delete(&self) -> Result<()> {
        self.session.delete().await
    }
}
