use portable_atomic::{AtomicU64, Ordering};
use quorix_core::{
    PartitionId, SequenceNumber, SessionId, UNASSIGNED_SESSION, proto::headers::Header,
};

/// Issues request headers for one session on one partition.
///
/// Commands take [`next_header`](Self::next_header), which atomically claims
/// the next sequence number. Queries take
/// [`current_header`](Self::current_header), which reports the last claimed
/// number so the backend can answer at least as fresh as the session's own
/// writes.
///
/// Sequence numbers start at `1` and are claimed with a single `fetch_add`, so
/// concurrent callers never observe duplicates or gaps.
#[derive(Debug)]
pub struct Sequencer {
    partition_id: PartitionId,
    session_id: AtomicU64,
    sequence: AtomicU64,
}

impl Sequencer {
    pub const fn new(partition_id: PartitionId) -> Self {
        Self {
            partition_id,
            session_id: AtomicU64::new(UNASSIGNED_SESSION),
            sequence: AtomicU64::new(0),
        }
    }

    pub const fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Records the backend-assigned session id.
    pub fn assign(&self, session_id: SessionId) {
        self.session_id.store(session_id, Ordering::Release);
    }

    /// Returns the assigned session id, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self.session_id.load(Ordering::Acquire) {
            UNASSIGNED_SESSION => None,
            id => Some(id),
        }
    }

    /// Returns the last issued sequence number (`0` before any command).
    pub fn last_sequence(&self) -> SequenceNumber {
        self.sequence.load(Ordering::Acquire)
    }

    /// Claims the next sequence number and returns a header carrying it.
    pub fn next_header(&self) -> Header {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.header(sequence)
    }

    /// Returns a header carrying the last issued sequence number.
    pub fn current_header(&self) -> Header {
        self.header(self.last_sequence())
    }

    /// Header used before a session exists: no sequence number.
    pub fn empty_header(&self) -> Header {
        Header::empty(self.partition_id)
    }

    fn header(&self, sequence: SequenceNumber) -> Header {
        Header {
            session_id: self.session_id.load(Ordering::Acquire),
            partition_id: self.partition_id,
            sequence_number: Some(sequence),
            streams: Vec::new(),
        }
    }
}
