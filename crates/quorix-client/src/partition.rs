//! Deterministic routing of primitive names to partitions.
//!
//! Every client process must send a given primitive to the same partition
//! without coordinating with other clients. The partition is therefore a pure
//! function of the primitive name and the partition count: a stable 64-bit
//! `xxh3` hash of the name's UTF-8 bytes, reduced modulo the count.
//!
//! The mapping must not change between processes, architectures or compiler
//! releases, so the hash is fixed to unseeded `xxh3` rather than any std
//! hasher.

use quorix_core::{Error, PartitionId, Result};
use xxhash_rust::xxh3::xxh3_64;

/// Returns the partition index in `[0, partitions)` that serves `name`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `partitions` is zero or `name` is
/// empty, since no partition can be selected.
pub fn partition_index(name: &str, partitions: usize) -> Result<usize> {
    if partitions == 0 {
        return Err(Error::InvalidArgument {
            reason: "partition count must be greater than 0".to_string(),
        });
    }
    if name.is_empty() {
        return Err(Error::InvalidArgument {
            reason: "primitive name must not be empty".to_string(),
        });
    }

    Ok((xxh3_64(name.as_bytes()) % partitions as u64) as usize)
}

/// A routed partition: its index and a handle to its connection.
#[derive(Clone, Debug)]
pub struct Partition<C> {
    pub index: PartitionId,
    pub connection: C,
}

/// The externally supplied, read-only set of partition connections.
///
/// Connections are usually `tonic::transport::Channel`s, which are cheap to
/// clone and multiplex requests internally.
#[derive(Clone, Debug)]
pub struct Partitions<C> {
    connections: Vec<C>,
}

impl<C: Clone> Partitions<C> {
    pub const fn new(connections: Vec<C>) -> Self {
        Self { connections }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Selects the partition for `name`.
    ///
    /// # Errors
    ///
    /// See [`partition_index`].
    pub fn route(&self, name: &str) -> Result<Partition<C>> {
        let index = partition_index(name, self.connections.len())?;
        Ok(Partition {
            index: index as PartitionId,
            connection: self.connections[index].clone(),
        })
    }
}
