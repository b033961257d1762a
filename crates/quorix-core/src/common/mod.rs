//! Types shared between session clients and backends.
//!
//! - [`error`] - the unified [`Error`] type and its gRPC status mapping.
//! - [`types`] - identifier aliases and [`Header`](crate::proto::headers::Header)
//!   helpers.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
