//! eiscp-core: Core traits, types, and error definitions for eISCP
//! receiver control.
//!
//! This crate defines the abstractions the eISCP client is built on,
//! independent of any concrete socket implementation.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`Connector`] -- opens a fresh [`Transport`] on demand
//! - [`Zone`] -- zone identifier carried in every command
//! - [`Capabilities`] -- probed receiver capability snapshot
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use transport::{Connector, Transport};
pub use types::*;
