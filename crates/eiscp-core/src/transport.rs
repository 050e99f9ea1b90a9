//! Transport and connector traits for receiver communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to a receiver.
//! The eISCP client in the `eiscp` crate frames commands on top of a
//! `Transport` rather than directly on a socket, which lets the same client
//! drive a real TCP connection (`eiscp-transport`) or a scripted
//! `MockTransport` from `eiscp-test-harness`.
//!
//! A [`Connector`] knows how to open a fresh `Transport`. The client holds
//! one so that it can connect lazily before the first command.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a receiver.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the receiver.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying stream.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the receiver into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing arrives in time and
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost) if the
    /// peer closed the stream.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Factory for [`Transport`] connections to a single receiver.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection, giving up after `timeout`.
    ///
    /// Failures are reported as [`Error::Connect`](crate::error::Error::Connect).
    async fn connect(&self, timeout: Duration) -> Result<Box<dyn Transport>>;

    /// A label for the remote endpoint, used in log output.
    fn addr(&self) -> &str;
}
