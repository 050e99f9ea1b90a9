//! Transport implementations for eISCP receiver control.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](eiscp_core::Transport) and [`Connector`](eiscp_core::Connector)
//! traits from `eiscp-core`:
//!
//! - [`TcpTransport`]: a TCP stream to a network receiver
//! - [`TcpConnector`]: opens a [`TcpTransport`] for a fixed `host:port`

pub mod tcp;

pub use tcp::{TcpConnector, TcpTransport};
