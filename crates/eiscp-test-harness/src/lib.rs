//! eiscp-test-harness: Test utilities and mock transports for the eISCP
//! crates.
//!
//! This crate provides [`MockTransport`] and [`MockConnector`] for
//! deterministic unit testing of the client without a receiver, and
//! [`MockTcpServer`] for end-to-end tests over a real TCP socket.

pub mod mock_stream;
pub mod mock_tcp;

pub use mock_stream::{ExchangeLog, IoEvent, MockConnector, MockTransport};
pub use mock_tcp::MockTcpServer;
