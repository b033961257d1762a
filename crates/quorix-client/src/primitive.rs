//! Types shared by every primitive handle.

use core::{fmt, future::Future, time::Duration};
use quorix_core::{Result, proto::headers::PrimitiveId};
use tonic::Request;

/// Fully qualified primitive name.
///
/// Routing uses only [`name`](Self::name); the namespace travels with the
/// create request so the backend can scope the primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimitiveName {
    pub namespace: String,
    pub name: String,
}

impl PrimitiveName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PrimitiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&PrimitiveName> for PrimitiveId {
    fn from(name: &PrimitiveName) -> Self {
        Self {
            namespace: name.namespace.clone(),
            name: name.name.clone(),
        }
    }
}

/// Operations common to all primitive handles.
pub trait Primitive {
    fn name(&self) -> &PrimitiveName;

    /// Closes the primitive's session. Idempotent.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;

    /// Closes the session and deletes the primitive's state. Idempotent.
    fn delete(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Options applied when a primitive handle is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimitiveOptions {
    /// Overrides the client-wide identifier reported on session creation.
    pub client_id: Option<String>,
}

impl PrimitiveOptions {
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Options for an event subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Deliver the current contents as events before live changes.
    pub replay: bool,
    /// Overrides the client's event buffer size for this subscription.
    pub buffer_size: Option<usize>,
}

impl WatchOptions {
    pub const fn with_replay(mut self, replay: bool) -> Self {
        self.replay = replay;
        self
    }

    pub const fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }
}

/// Wraps a unary request message with the configured deadline.
pub(crate) fn request<T>(message: T, timeout: Duration) -> Request<T> {
    let mut request = Request::new(message);
    request.set_timeout(timeout);
    request
}
