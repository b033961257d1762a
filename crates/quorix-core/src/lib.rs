#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// Generated protobuf messages and gRPC bindings.
///
/// Module nesting mirrors the protobuf packages so that cross-package
/// references emitted by `prost` (`super::headers::Header`) resolve.
pub mod proto {
    pub mod headers {
        tonic::include_proto!("quorix.headers");
    }

    pub mod list {
        tonic::include_proto!("quorix.list");
    }

    pub mod counter {
        tonic::include_proto!("quorix.counter");
    }
}
