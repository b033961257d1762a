#![doc = include_str!("../README.md")]

mod client;
pub mod config;
pub mod counter;
pub mod list;
pub mod partition;
pub mod primitive;
pub mod session;

pub use crate::client::*;
#[cfg(feature = "cli")]
pub use crate::config::ClientArgs;
pub use crate::config::{ClientConfig, ClientConfigBuilder};
pub use quorix_core::{Error, Result};
