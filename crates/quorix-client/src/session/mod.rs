//! Client sessions against a single partition.
//!
//! A [`Session`] is the unit of ordering between a client and the replicated
//! state of one primitive. It owns:
//!
//! - the lifecycle state machine (`Uninitialized → Creating → Open → Closing →
//!   Closed`, with `Failed` reachable when creation fails or the backend
//!   forgets an open session),
//! - a [`Sequencer`] issuing request headers,
//! - a [`StreamSynchronizer`] gating event delivery,
//! - a background keep-alive task while open.
//!
//! Primitive-specific RPCs are injected through the [`SessionHandler`]
//! capability, so every primitive type shares the same session machinery.
//!
//! ## Structure
//!
//! - [`sequencer`] - request header issuance.
//! - [`stream`] - stream position tracking and waiting.
//! - `keep_alive` - the background keep-alive task.

mod keep_alive;
pub mod sequencer;
pub mod stream;

pub use crate::config::SessionConfig;
pub use sequencer::Sequencer;
pub use stream::{StreamSynchronizer, WaitOutcome};

use core::{fmt, future::Future};
use quorix_core::{
    Error, PartitionId, Result, SessionId, StreamId, StreamIndex, proto::headers::Header,
};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tonic::Code;

/// Session RPCs of one primitive type.
///
/// Implementations translate the three session operations into the
/// primitive's gRPC service calls. They are invoked with the header produced
/// by the session and must not retry on their own.
pub trait SessionHandler: Send + Sync + 'static {
    /// Creates a session. Returns the response header carrying the
    /// backend-assigned session id.
    fn create(&self, header: Header) -> impl Future<Output = Result<Header>> + Send;

    /// Signals that the session is still in use.
    fn keep_alive(&self, header: Header) -> impl Future<Output = Result<()>> + Send;

    /// Closes the session. With `delete` set the backend also removes the
    /// primitive's persisted state.
    fn close(&self, header: Header, delete: bool) -> impl Future<Output = Result<()>> + Send;
}

impl<H: SessionHandler> SessionHandler for Arc<H> {
    fn create(&self, header: Header) -> impl Future<Output = Result<Header>> + Send {
        (**self).create(header)
    }

    fn keep_alive(&self, header: Header) -> impl Future<Output = Result<()>> + Send {
        (**self).keep_alive(header)
    }

    fn close(&self, header: Header, delete: bool) -> impl Future<Output = Result<()>> + Send {
        (**self).close(header, delete)
    }
}

/// Extracts the header a `Create` response must carry.
///
/// # Errors
///
/// Returns [`Error::InvalidResponse`] if the header is missing.
pub(crate) fn created_header(header: Option<Header>) -> Result<Header> {
    header.ok_or_else(|| Error::InvalidResponse {
        reason: "create response carries no header".to_string(),
    })
}

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Creating,
    Open,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    /// `Closed` and `Failed` are final.
    pub const fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Creating => "creating",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Receives failures that do not surface to any caller.
///
/// Keep-alive failures leave the session open unless the backend reports the
/// session as not found, which fails it. Stream failures end the
/// stream silently from the application's point of view. Both are reported
/// here. Repeated failures are for the observer to act upon.
pub trait SessionObserver: Send + Sync {
    fn keep_alive_failed(&self, _session_id: SessionId, _error: &Error) {}

    fn stream_failed(&self, _session_id: SessionId, _stream_id: StreamId, _error: &Error) {}
}

/// Default observer: logs through `tracing` when the feature is enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl SessionObserver for LoggingObserver {
    fn keep_alive_failed(&self, _session_id: SessionId, _error: &Error) {
        #[cfg(feature = "tracing")]
        tracing::warn!(session_id = _session_id, "Keep-alive failed: {}", _error);
    }

    fn stream_failed(&self, _session_id: SessionId, _stream_id: StreamId, _error: &Error) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            session_id = _session_id,
            stream_id = _stream_id,
            "Stream receive failed: {}",
            _error
        );
    }
}

/// A lazily created session on one partition.
///
/// Cloning is cheap and yields another handle to the same session.
pub struct Session<H> {
    inner: Arc<Inner<H>>,
}

impl<H> Clone for Session<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H> fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("partition_id", &self.inner.sequencer.partition_id())
            .field("session_id", &self.inner.sequencer.session_id())
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

pub(crate) struct Inner<H> {
    handler: H,
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
    sequencer: Sequencer,
    streams: StreamSynchronizer,
    state: watch::Sender<SessionState>,
    // Serializes Create/Close/Delete so exactly one of them talks to the
    // backend per transition.
    transition: Mutex<()>,
    keep_alive: CancellationToken,
}

impl<H> Drop for Inner<H> {
    fn drop(&mut self) {
        self.keep_alive.cancel();
    }
}

impl<H: SessionHandler> Inner<H> {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Runs a session RPC under the request timeout.
    async fn call<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, request)
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(timeout)))
    }

    async fn keep_alive(&self) {
        if self.state() != SessionState::Open {
            return;
        }

        let header = self.current_header();
        let session_id = header.session_id;
        if let Err(e) = self.call(self.handler.keep_alive(header)).await {
            self.observer.keep_alive_failed(session_id, &e);
            if e.code() == Code::NotFound {
                self.expire().await;
            }
        }
    }

    /// The backend no longer knows the session: nothing can be recovered.
    async fn expire(&self) {
        let _guard = self.transition.lock().await;
        if self.state() != SessionState::Open {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            session_id = self.sequencer.session_id(),
            "Session expired on the backend"
        );

        self.set_state(SessionState::Failed);
        self.keep_alive.cancel();
        self.streams.close();
    }

    fn current_header(&self) -> Header {
        let mut header = self.sequencer.current_header();
        header.streams = self.streams.snapshot();
        header
    }
}

impl<H: SessionHandler> Session<H> {
    /// Creates a session handle. No request is sent until first use.
    pub fn new(
        partition_id: PartitionId,
        handler: H,
        config: SessionConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                handler,
                config,
                observer,
                sequencer: Sequencer::new(partition_id),
                streams: StreamSynchronizer::new(),
                state,
                transition: Mutex::new(()),
                keep_alive: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Subscribes to lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Returns the backend-assigned id once the session is open.
    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.sequencer.session_id()
    }

    pub fn partition_id(&self) -> PartitionId {
        self.inner.sequencer.partition_id()
    }

    /// Opens the session if it is not open yet.
    ///
    /// Concurrent callers share a single `Create` request. A failed creation
    /// moves the session to [`SessionState::Failed`]; the error is returned to
    /// the caller that triggered it and later calls fail with
    /// [`Error::SessionFailed`].
    ///
    /// # Errors
    ///
    /// Returns the handler's error on creation failure,
    /// [`Error::SessionClosed`] after close, or [`Error::SessionFailed`] after
    /// an earlier creation failure.
    pub async fn open(&self) -> Result<()> {
        if self.state() == SessionState::Open {
            return Ok(());
        }

        let _guard = self.inner.transition.lock().await;
        match self.state() {
            SessionState::Open => return Ok(()),
            SessionState::Closing | SessionState::Closed => return Err(Error::SessionClosed),
            SessionState::Failed => return Err(Error::SessionFailed),
            // `Creating` is only visible here if a previous `open` was dropped
            // mid-request.
            SessionState::Uninitialized | SessionState::Creating => {}
        }

        self.inner.set_state(SessionState::Creating);
        let header = self.inner.sequencer.empty_header();
        match self.inner.call(self.inner.handler.create(header)).await {
            Ok(response) => {
                if !response.has_session() {
                    self.fail();
                    return Err(Error::InvalidResponse {
                        reason: "create response carries no session id".to_string(),
                    });
                }

                self.inner.sequencer.assign(response.session_id);
                self.inner.streams.advance(&response.streams);
                self.inner.set_state(SessionState::Open);
                keep_alive::spawn(&self.inner, self.inner.keep_alive.clone());

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    session_id = response.session_id,
                    partition_id = self.partition_id(),
                    "Session opened"
                );
                Ok(())
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    partition_id = self.partition_id(),
                    "Session create failed: {}",
                    e
                );

                self.fail();
                Err(e)
            }
        }
    }

    fn fail(&self) {
        self.inner.set_state(SessionState::Failed);
        self.inner.streams.close();
    }

    /// Returns a header with the next sequence number, opening the session on
    /// first use. Use for commands and stream subscriptions.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn next_header(&self) -> Result<Header> {
        self.open().await?;
        let mut header = self.inner.sequencer.next_header();
        header.streams = self.inner.streams.snapshot();
        Ok(header)
    }

    /// Returns a header with the last issued sequence number, opening the
    /// session on first use. Use for queries.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn current_header(&self) -> Result<Header> {
        self.open().await?;
        Ok(self.inner.current_header())
    }

    /// Feeds a response header back into the session, advancing any stream
    /// positions it reports.
    pub fn record_response(&self, header: Option<&Header>) {
        if let Some(header) = header {
            self.inner.streams.advance(&header.streams);
        }
    }

    /// Waits until `stream_id` reaches `index`. See
    /// [`StreamSynchronizer::wait`].
    pub async fn wait_stream(&self, stream_id: StreamId, index: StreamIndex) -> WaitOutcome {
        self.inner.streams.wait(stream_id, index).await
    }

    /// Waits until `stream_id` reaches `index` or `cancel` fires.
    pub async fn wait_stream_cancellable(
        &self,
        stream_id: StreamId,
        index: StreamIndex,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        self.inner
            .streams
            .wait_cancellable(stream_id, index, cancel)
            .await
    }

    /// Returns `true` once an event carrying `header` may be delivered.
    /// `false` means the event must be dropped.
    pub async fn admit(&self, header: &Header) -> bool {
        self.inner.streams.admit(header).await
    }

    /// Ends a stream and releases events still waiting on it.
    pub fn close_stream(&self, stream_id: StreamId) {
        self.inner.streams.close_stream(stream_id);
    }

    /// Reports a failed stream to the observer.
    pub fn report_stream_failure(&self, stream_id: StreamId, error: &Error) {
        let session_id = self.session_id().unwrap_or_default();
        self.inner
            .observer
            .stream_failed(session_id, stream_id, error);
    }

    /// Closes the session. Idempotent: later calls return `Ok(())` without
    /// contacting the backend.
    ///
    /// A session still `Creating` because the caller of [`open`](Self::open)
    /// dropped its future is closed locally. If that `Create` reached the
    /// backend, the backend keeps the session until it expires it.
    ///
    /// # Errors
    ///
    /// Returns the handler's error. The session is `Closed` regardless, but the
    /// backend may not have released it.
    pub async fn close(&self) -> Result<()> {
        self.shutdown(false).await
    }

    /// Closes the session and deletes the primitive's backend state. Same
    /// idempotence as [`close`](Self::close); a delete after a close is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// See [`close`](Self::close).
    pub async fn delete(&self) -> Result<()> {
        self.shutdown(true).await
    }

    async fn shutdown(&self, delete: bool) -> Result<()> {
        let _guard = self.inner.transition.lock().await;
        match self.state() {
            SessionState::Closed | SessionState::Failed => return Ok(()),
            // No backend session is known to exist.
            SessionState::Uninitialized | SessionState::Creating => {
                self.inner.set_state(SessionState::Closed);
                self.inner.streams.close();
                return Ok(());
            }
            SessionState::Open | SessionState::Closing => {}
        }

        self.inner.set_state(SessionState::Closing);
        self.inner.keep_alive.cancel();

        let header = self.inner.current_header();
        let result = self.inner.call(self.inner.handler.close(header, delete)).await;

        self.inner.set_state(SessionState::Closed);
        self.inner.streams.close();

        #[cfg(feature = "tracing")]
        match &result {
            Ok(()) => {
                tracing::debug!(session_id = self.session_id(), delete, "Session closed");
            }
            Err(e) => {
                tracing::warn!(
                    session_id = self.session_id(),
                    delete,
                    "Session close failed: {}",
                    e
                );
            }
        }

        result
    }
}
