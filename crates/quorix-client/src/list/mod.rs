//! Replicated list of strings.
//!
//! Commands ([`append`](List::append), [`insert`](List::insert),
//! [`remove`](List::remove), [`clear`](List::clear)) claim a new sequence
//! number; queries ([`get`](List::get), [`size`](List::size),
//! [`items`](List::items)) reuse the last one so they observe the session's
//! own writes.
//!
//! [`listen`](List::listen) opens an event stream identified by the sequence
//! number of its request. A background task receives events and holds each one
//! back until every stream position it depends on has been reported by a
//! command response, so the session never sees its own change before the
//! command that made it has returned.

mod session;

pub use session::ListSession;

use crate::{
    config::ClientConfig,
    partition::Partition,
    primitive::{Primitive, PrimitiveName, PrimitiveOptions, WatchOptions, request},
    session::{Session, SessionObserver},
};
use core::time::Duration;
use quorix_core::{
    Error, Result, StreamId,
    proto::list::{
        AppendRequest, ClearRequest, EventRequest, EventResponse, EventType, GetRequest,
        InsertRequest, IterateRequest, IterateResponse, RemoveRequest, SizeRequest,
        list_service_client::ListServiceClient,
    },
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Streaming, transport::Channel};

/// Kind of change reported by a list event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEventType {
    Added,
    Removed,
}

impl From<EventType> for ListEventType {
    fn from(kind: EventType) -> Self {
        match kind {
            EventType::Added => ListEventType::Added,
            EventType::Removed => ListEventType::Removed,
        }
    }
}

/// A change to the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEvent {
    pub kind: ListEventType,
    pub value: String,
}

/// Handle to a replicated list.
///
/// Cheap to clone; clones share the same session.
#[derive(Debug, Clone)]
pub struct List {
    name: PrimitiveName,
    client: ListServiceClient<Channel>,
    session: Session<ListSession>,
    request_timeout: Duration,
    event_buffer_size: usize,
}

impl List {
    pub(crate) fn new(
        name: PrimitiveName,
        partition: Partition<Channel>,
        options: PrimitiveOptions,
        config: &ClientConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let client = ListServiceClient::new(partition.connection);
        let client_id = options
            .client_id
            .or_else(|| config.client_id.clone())
            .unwrap_or_default();
        let handler = ListSession::new(client.clone(), (&name).into(), client_id);
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
            event_buffer_size: config.event_buffer_size,
        }
    }

    /// The session this list issues requests on.
    pub fn session(&self) -> &Session<ListSession> {
        &self.session
    }

    /// Appends `value` to the end of the list.
    ///
    /// # Errors
    ///
    /// Returns the session error if the session cannot be opened, or the
    /// backend status.
    pub async fn append(&self, value: impl Into<String>) -> Result<()> {
        let header = self.session.next_header().await?;
        let message = AppendRequest {
            header: Some(header),
            value: value.into(),
        };
        let response = self
            .client
            .clone()
            .append(request(message, self.request_timeout))
            .await?
            .into_inner();
        self.session.record_response(response.header.as_ref());
        Ok(())
    }

    /// Inserts `value` at `index`, shifting later items.
    ///
    /// # Errors
    ///
    /// Returns an `OutOfRange` status if `index` exceeds the list size.
    pub async fn insert(&self, index: u32, value: impl Into<String>) -> Result<()> {
        let header = self.session.next_header().await?;
        let message = InsertRequest {
            header: Some(header),
            index,
            value: value.into(),
        };
        let response = self
            .client
            .clone()
            .insert(request(message, self.request_timeout))
            .await?
            .into_inner();
        self.session.record_response(response.header.as_ref());
        Ok(())
    }

    /// Returns the item at `index`.
    ///
    /// # Errors
    ///
    /// Returns an `OutOfRange` status if there is no such item.
    pub async fn get(&self, index: u32) -> Result<String> {
        let header = self.session.current_header().await?;
        let message = GetRequest {
            header: Some(header),
            index,
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

    /// Removes and returns the item at `index`.
    ///
    /// # Errors
    ///
    /// Returns an `OutOfRange` status if there is no such item.
    pub async fn remove(&self, index: u32) -> Result<String> {
        let header = self.session.next_header().await?;
        let message = RemoveRequest {
            header: Some(header),
            index,
        };
        let response = self
            .client
            .clone()
            .remove(request(message, self.request_timeout))
            .await?
            .into_inner();
        self.session.record_response(response.header.as_ref());
        Ok(response.value)
    }

    /// Returns the number of items.
    ///
    /// # Errors
    ///
    /// Returns the session error or the backend status.
    pub async fn size(&self) -> Result<usize> {
        let header = self.session.current_header().await?;
        let message = SizeRequest {
            header: Some(header),
        };
        let response = self
            .client
            .clone()
            .size(request(message, self.request_timeout))
            .await?
            .into_inner();
        self.session.record_response(response.header.as_ref());
        Ok(response.size as usize)
    }

    /// Removes every item.
    ///
    /// # Errors
    ///
    /// Returns the session error or the backend status.
    pub async fn clear(&self) -> Result<()> {
        let header = self.session.next_header().await?;
        let message = ClearRequest {
            header: Some(header),
        };
        let response = self
            .client
            .clone()
            .clear(request(message, self.request_timeout))
            .await?
            .into_inner();
        self.session.record_response(response.header.as_ref());
        Ok(())
    }

    /// Streams the current items in order.
    ///
    /// The stream ends after the last item. A receive failure is yielded as
    /// the final element.
    ///
    /// # Errors
    ///
    /// Returns the session error or the backend status if the iteration
    /// cannot be started.
    pub async fn items(&self) -> Result<ReceiverStream<Result<String>>> {
        let header = self.session.current_header().await?;
        let items = self
            .client
            .clone()
            .iterate(IterateRequest {
                header: Some(header),
            })
            .await?
            .into_inner();

        let (tx, rx) = mpsc::channel(self.event_buffer_size);
        tokio::spawn(forward_items(self.session.clone(), items, tx));
        Ok(ReceiverStream::new(rx))
    }

    /// Subscribes to changes.
    ///
    /// With [`WatchOptions::replay`] the current items are delivered as
    /// [`ListEventType::Added`] events first. Events caused by this session's
    /// own commands are delivered only after the command's response has been
    /// received. Dropping the returned stream ends the subscription.
    ///
    /// # Errors
    ///
    /// Returns the session error or the backend status if the subscription
    /// cannot be started.
    pub async fn listen(&self, options: WatchOptions) -> Result<ReceiverStream<ListEvent>> {
        let header = self.session.next_header().await?;
        let stream_id = header.sequence_number.unwrap_or_default();
        let events = self
            .client
            .clone()
            .events(EventRequest {
                header: Some(header),
                replay: options.replay,
            })
            .await?
            .into_inner();

        let buffer = options.buffer_size.unwrap_or(self.event_buffer_size).max(1);
        let (tx, rx) = mpsc::channel(buffer);
        tokio::spawn(forward_events(self.session.clone(), stream_id, events, tx));

        #[cfg(feature = "tracing")]
        tracing::debug!(list = %self.name, stream_id, "Listening for list events");

        Ok(ReceiverStream::new(rx))
    }
}

impl Primitive for List {
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

async fn forward_items(
    session: Session<ListSession>,
    mut items: Streaming<IterateResponse>,
    tx: mpsc::Sender<Result<String>>,
) {
    loop {
        let message = tokio::select! {
            () = tx.closed() => break,
            message = items.message() => message,
        };

        let item = match message {
            Ok(Some(response)) => {
                session.record_response(response.header.as_ref());
                Ok(response.value)
            }
            Ok(None) => break,
            Err(status) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    session_id = session.session_id(),
                    "Item stream receive failed: {}",
                    status
                );
                Err(Error::from(status))
            }
        };

        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}

/// Receives list events, gates them on stream positions and forwards them to
/// the subscriber. Ends when the subscriber goes away, the backend ends the
/// stream, the stream fails, or the session closes.
async fn forward_events(
    session: Session<ListSession>,
    stream_id: StreamId,
    mut events: Streaming<EventResponse>,
    tx: mpsc::Sender<ListEvent>,
) {
    loop {
        let message = tokio::select! {
            () = tx.closed() => break,
            message = events.message() => message,
        };

        let response = match message {
            Ok(Some(response)) => response,
            Ok(None) => break,
            Err(status) => {
                session.report_stream_failure(stream_id, &Error::from(status));
                break;
            }
        };

        if let Some(header) = response.header.as_ref() {
            let admitted = tokio::select! {
                () = tx.closed() => break,
                admitted = session.admit(header) => admitted,
            };
            if !admitted {
                #[cfg(feature = "tracing")]
                tracing::debug!(stream_id, "Dropping event on closed stream");
                break;
            }
        }

        let event = ListEvent {
            kind: response.kind().into(),
            value: response.value,
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }

    session.close_stream(stream_id);
}
