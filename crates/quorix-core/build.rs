//! Generates the gRPC client and server bindings for the quorix protocol.
//!
//! The schema is split per package:
//!
//! - `proto/quorix/headers.proto` - session headers and primitive identifiers
//! - `proto/quorix/list.proto` - the list primitive service
//! - `proto/quorix/counter.proto` - the counter primitive service
//!
//! Generated modules are exposed through `quorix_core::proto`. Service modules
//! refer to header types as `super::headers::*`, so the module nesting in
//! `lib.rs` must mirror the package names.
//!
//! # Panics
//!
//! Panics if `protoc` is unavailable or the schema fails to compile. Build
//! scripts have no better channel for reporting the failure.
const PROTOS: &[&str] = &[
    "proto/quorix/headers.proto",
    "proto/quorix/list.proto",
    "proto/quorix/counter.proto",
];

fn main() {
    for proto in PROTOS {
        println!("cargo:rerun-if-changed={proto}");
    }

    tonic_prost_build::configure()
        .compile_protos(PROTOS, &["proto"])
        .unwrap();
}
