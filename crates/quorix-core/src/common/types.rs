//! # Session Identifiers and Header Helpers
//!
//! Type aliases for the identifiers carried in a
//! [`Header`](crate::proto::headers::Header), plus convenience methods on the
//! generated header messages.
//!
//! ## Identifiers
//!
//! - [`SessionId`] - assigned by the backend when a session is created; `0`
//!   means "not yet assigned".
//! - [`PartitionId`] - index of the partition serving the primitive.
//! - [`SequenceNumber`] - per-session request counter; starts at `0` and the
//!   first command is `1`.
//! - [`StreamId`] - identifies an event stream within a session. It equals
//!   the sequence number of the request that opened the stream.
//! - [`StreamIndex`] - position within a stream.

use crate::proto::headers::{Header, PrimitiveId, StreamHeader};
use core::fmt;

pub type SessionId = u64;
pub type PartitionId = u32;
pub type SequenceNumber = u64;
pub type StreamId = u64;
pub type StreamIndex = u64;

/// Session id value meaning "no session assigned yet".
pub const UNASSIGNED_SESSION: SessionId = 0;

impl Header {
    /// Builds a header that carries no session, sequence or stream data.
    pub fn empty(partition_id: PartitionId) -> Self {
        Self {
            session_id: UNASSIGNED_SESSION,
            partition_id,
            sequence_number: None,
            streams: Vec::new(),
        }
    }

    /// Returns `true` once the backend has assigned a session id.
    pub const fn has_session(&self) -> bool {
        self.session_id != UNASSIGNED_SESSION
    }

    /// Returns `true` if the header reports at least one stream position.
    pub fn has_streams(&self) -> bool {
        !self.streams.is_empty()
    }

    /// Looks up the reported position of `stream_id`.
    pub fn stream_index(&self, stream_id: StreamId) -> Option<StreamIndex> {
        self.streams
            .iter()
            .find(|stream| stream.stream_id == stream_id)
            .map(|stream| stream.last_index)
    }
}

impl StreamHeader {
    pub const fn new(stream_id: StreamId, last_index: StreamIndex) -> Self {
        Self {
            stream_id,
            last_index,
        }
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
