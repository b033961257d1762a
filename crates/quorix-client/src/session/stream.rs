//! Ordered delivery of stream events relative to command responses.
//!
//! Events and command responses travel on independent gRPC calls, so an event
//! produced by a session's own write can arrive before the response to that
//! write. The backend tags such an event with the stream index it depends on,
//! and tags the write's response with the index the stream has reached. The
//! [`StreamSynchronizer`] tracks the highest index reported per stream and lets
//! event consumers wait until their event's index has been reached.
//!
//! Each stream position lives in a [`watch`] channel: responses advance it
//! with `send_if_modified`, waiters suspend in `wait_for`. Closing a stream or
//! the whole session marks the cursor closed, which releases every waiter
//! without a position. A closed stream id is retired for the rest of the
//! session: late responses that still report it are ignored.

use parking_lot::Mutex;
use quorix_core::{
    StreamId, StreamIndex,
    proto::headers::{Header, StreamHeader},
};
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Result of waiting for a stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The stream reached the target. Carries the observed position, which
    /// may exceed the target.
    Ready(StreamIndex),
    /// The stream or its session closed first.
    Closed,
    /// The waiter was cancelled by its caller.
    Cancelled,
}

impl WaitOutcome {
    pub const fn is_ready(self) -> bool {
        matches!(self, WaitOutcome::Ready(_))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    index: StreamIndex,
    closed: bool,
}

#[derive(Debug, Default)]
struct Streams {
    cursors: HashMap<StreamId, watch::Sender<Cursor>>,
    retired: HashSet<StreamId>,
    closed: bool,
}

impl Streams {
    fn cursor(&mut self, stream_id: StreamId) -> &watch::Sender<Cursor> {
        self.cursors
            .entry(stream_id)
            .or_insert_with(|| watch::Sender::new(Cursor::default()))
    }
}

/// Per-session table of stream positions.
#[derive(Debug, Default)]
pub struct StreamSynchronizer {
    streams: Mutex<Streams>,
}

impl StreamSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances every stream reported in `headers` to the reported index.
    ///
    /// Positions never move backwards; stale reports are ignored. Reports for
    /// closed streams, or for any stream once the synchronizer is closed, are
    /// dropped.
    pub fn advance(&self, headers: &[StreamHeader]) {
        let mut streams = self.streams.lock();
        if streams.closed {
            return;
        }

        for header in headers {
            if streams.retired.contains(&header.stream_id) {
                continue;
            }
            streams.cursor(header.stream_id).send_if_modified(|cursor| {
                if header.last_index > cursor.index {
                    cursor.index = header.last_index;
                    true
                } else {
                    false
                }
            });
        }
    }

    /// Returns the highest index observed for `stream_id`.
    pub fn position(&self, stream_id: StreamId) -> Option<StreamIndex> {
        self.streams
            .lock()
            .cursors
            .get(&stream_id)
            .map(|cursor| cursor.borrow().index)
    }

    /// Returns every tracked stream position, ordered by stream id.
    pub fn snapshot(&self) -> Vec<StreamHeader> {
        let streams = self.streams.lock();
        let mut positions: Vec<StreamHeader> = streams
            .cursors
            .iter()
            .map(|(id, cursor)| StreamHeader::new(*id, cursor.borrow().index))
            .collect();
        positions.sort_unstable_by_key(|stream| stream.stream_id);
        positions
    }

    /// Suspends until `stream_id` reaches `index` or the stream closes.
    pub async fn wait(&self, stream_id: StreamId, index: StreamIndex) -> WaitOutcome {
        let mut rx = {
            let mut streams = self.streams.lock();
            if streams.closed || streams.retired.contains(&stream_id) {
                return WaitOutcome::Closed;
            }
            streams.cursor(stream_id).subscribe()
        };

        let cursor = match rx
            .wait_for(|cursor| cursor.closed || cursor.index >= index)
            .await
        {
            Ok(cursor) => *cursor,
            // Sender dropped: the stream was removed.
            Err(_) => return WaitOutcome::Closed,
        };

        if cursor.index >= index {
            WaitOutcome::Ready(cursor.index)
        } else {
            WaitOutcome::Closed
        }
    }

    /// Like [`wait`](Self::wait), but gives up when `cancel` fires.
    ///
    /// Cancellation only affects this waiter; other waiters on the same stream
    /// keep waiting.
    pub async fn wait_cancellable(
        &self,
        stream_id: StreamId,
        index: StreamIndex,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        tokio::select! {
            outcome = self.wait(stream_id, index) => outcome,
            () = cancel.cancelled() => WaitOutcome::Cancelled,
        }
    }

    /// Decides whether an event carrying `header` may be delivered.
    ///
    /// A header without stream positions is delivered immediately. Otherwise
    /// every listed stream must reach its index; `false` means the wait was
    /// released by a close and the event must be dropped.
    pub async fn admit(&self, header: &Header) -> bool {
        for stream in &header.streams {
            if !self.wait(stream.stream_id, stream.last_index).await.is_ready() {
                return false;
            }
        }
        true
    }

    /// Closes one stream and releases its waiters. The id stays retired, so
    /// it never reappears in [`snapshot`](Self::snapshot).
    pub fn close_stream(&self, stream_id: StreamId) {
        let cursor = {
            let mut streams = self.streams.lock();
            streams.retired.insert(stream_id);
            streams.cursors.remove(&stream_id)
        };
        if let Some(cursor) = cursor {
            cursor.send_modify(|cursor| cursor.closed = true);
        }
    }

    /// Closes every stream and refuses new waits.
    pub fn close(&self) {
        let mut streams = self.streams.lock();
        streams.closed = true;
        streams.retired.clear();
        for (_, cursor) in streams.cursors.drain() {
            cursor.send_modify(|cursor| cursor.closed = true);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.streams.lock().closed
    }
}
