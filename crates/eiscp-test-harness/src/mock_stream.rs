//! Mock transport for deterministic testing of the eISCP client.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/reply pairs. Replies can be bytes, silence (the receiver ignores
//! the request), or a write failure. Every write and read is appended to a
//! shared [`ExchangeLog`] so tests can check how exchanges were ordered even
//! after the transport has been moved into a client.
//!
//! [`MockConnector`] hands out pre-built transports in order, which lets
//! tests drive the client's lazy connect and reconnect-after-failure paths.
//!
//! # Example
//!
//! ```
//! use eiscp_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the client sends this frame, reply with that one.
//! mock.expect(b"request-frame", b"response-frame");
//! // This request gets no reply at all.
//! mock.expect_silent(b"ignored-query");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eiscp_core::error::{Error, Result};
use eiscp_core::transport::{Connector, Transport};

/// What the mock does once a matching request has been written.
#[derive(Debug, Clone)]
enum Reply {
    /// Queue these bytes for subsequent `receive()` calls.
    Bytes(Vec<u8>),
    /// Accept the write and never answer.
    Silent,
    /// Fail the write with [`Error::ConnectionLost`].
    FailWrite,
}

/// A pre-loaded request/reply pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    reply: Reply,
}

/// One observable I/O operation on a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoEvent {
    /// Bytes passed to `send()`.
    Write(Vec<u8>),
    /// Bytes returned from `receive()`.
    Read(Vec<u8>),
}

/// Shared, clonable record of the I/O performed by a [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub struct ExchangeLog {
    events: Arc<Mutex<Vec<IoEvent>>>,
}

impl ExchangeLog {
    fn push(&self, event: IoEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Snapshot of every event recorded so far, in order.
    pub fn events(&self) -> Vec<IoEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The event sequence with consecutive reads merged into one.
    ///
    /// A single response frame is usually read in several pieces (header,
    /// then payload); merging makes "write, then its whole response"
    /// appear as exactly two entries.
    pub fn exchanges(&self) -> Vec<IoEvent> {
        let mut merged: Vec<IoEvent> = Vec::new();
        for event in self.events() {
            if let IoEvent::Read(more) = &event {
                if let Some(IoEvent::Read(acc)) = merged.last_mut() {
                    acc.extend_from_slice(more);
                    continue;
                }
            }
            merged.push(event);
        }
        merged
    }

    /// All bytes written, one element per `send()` call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                IoEvent::Write(data) => Some(data),
                IoEvent::Read(_) => None,
            })
            .collect()
    }
}

/// A mock [`Transport`] for testing the client without a receiver.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is matched against the next expectation and its reply is queued
/// for `receive()` behind any bytes not read yet, as on a real socket. A
/// mismatch or an exhausted queue fails the write with [`Error::Protocol`].
#[derive(Debug)]
pub struct MockTransport {
    /// Ordered queue of expected request/reply pairs.
    expectations: VecDeque<Expectation>,
    /// The response data pending for the next `receive()` call.
    pending_response: Option<Vec<u8>>,
    /// Cursor into the pending response.
    response_cursor: usize,
    /// Whether the transport is "connected".
    connected: bool,
    /// Delay applied to every `receive()` that has data to deliver.
    latency: Duration,
    log: ExchangeLog,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending_response: None,
            response_cursor: 0,
            connected: true,
            latency: Duration::ZERO,
            log: ExchangeLog::default(),
        }
    }

    /// Add an expected request and the bytes to answer it with.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.push(request, Reply::Bytes(response.to_vec()));
    }

    /// Add an expected request that the "receiver" never answers.
    pub fn expect_silent(&mut self, request: &[u8]) {
        self.push(request, Reply::Silent);
    }

    /// Add an expected request whose write fails as if the peer vanished.
    pub fn expect_write_failure(&mut self, request: &[u8]) {
        self.push(request, Reply::FailWrite);
    }

    fn push(&mut self, request: &[u8], reply: Reply) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            reply,
        });
    }

    /// Delay each data-delivering `receive()` by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Handle to this transport's I/O log. Clones share the same log.
    pub fn log(&self) -> ExchangeLog {
        self.log.clone()
    }

    /// All data that has been sent through this transport.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.log.writes()
    }

    /// Set the connected state, e.g. to hand a client a stream that has
    /// already died.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.log.push(IoEvent::Write(data.to_vec()));

        let expectation = self.expectations.pop_front().ok_or_else(|| {
            Error::Protocol("no more expectations in mock transport".into())
        })?;

        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            )));
        }

        match expectation.reply {
            Reply::Bytes(response) => {
                let mut queued = match self.pending_response.take() {
                    Some(unread) => unread[self.response_cursor..].to_vec(),
                    None => Vec::new(),
                };
                queued.extend_from_slice(&response);
                self.pending_response = Some(queued);
                self.response_cursor = 0;
                Ok(())
            }
            Reply::Silent => Ok(()),
            Reply::FailWrite => {
                self.connected = false;
                Err(Error::ConnectionLost)
            }
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let Some(response) = self.pending_response.as_ref() else {
            return Err(Error::Timeout);
        };

        let remaining = &response[self.response_cursor..];
        if remaining.is_empty() {
            self.pending_response = None;
            self.response_cursor = 0;
            return Err(Error::Timeout);
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.log.push(IoEvent::Read(remaining[..n].to_vec()));
        self.response_cursor += n;
        if self.response_cursor >= response.len() {
            self.pending_response = None;
            self.response_cursor = 0;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// A [`Connector`] that hands out pre-built transports in order.
///
/// Once the queue is empty every further `connect()` fails with
/// [`Error::Connect`], which doubles as a "refusing" connector when
/// created empty.
pub struct MockConnector {
    transports: Mutex<VecDeque<Box<dyn Transport>>>,
    connects: Arc<AtomicUsize>,
}

impl MockConnector {
    /// Create a connector that yields `transports` one per `connect()`.
    pub fn new(transports: Vec<MockTransport>) -> Self {
        let transports = transports
            .into_iter()
            .map(|t| Box::new(t) as Box<dyn Transport>)
            .collect();
        MockConnector {
            transports: Mutex::new(transports),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Convenience for the common single-connection case.
    pub fn single(transport: MockTransport) -> Self {
        Self::new(vec![transport])
    }

    /// A connector whose every `connect()` fails.
    pub fn refusing() -> Self {
        Self::new(Vec::new())
    }

    /// Shared counter of `connect()` attempts, including failed ones.
    pub fn connect_count(&self) -> Arc<AtomicUsize> {
        self.connects.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _timeout: Duration) -> Result<Box<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self
            .transports
            .lock()
            .map_err(|_| Error::Connect("mock connector poisoned".into()))?
            .pop_front();
        next.ok_or_else(|| Error::Connect("connection refused: mock".into()))
    }

    fn addr(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_basic_send_receive() {
        let mut mock = MockTransport::new();
        mock.expect(b"ping", b"pong");

        mock.send(b"ping").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn mock_transport_wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(b"a", b"b");

        let result = mock.send(b"z").await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn mock_transport_no_expectations_errors() {
        let mut mock = MockTransport::new();
        assert!(matches!(mock.send(b"a").await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn mock_transport_silent_reply_times_out() {
        let mut mock = MockTransport::new();
        mock.expect_silent(b"q");

        mock.send(b"q").await.unwrap();
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn mock_transport_write_failure_disconnects() {
        let mut mock = MockTransport::new();
        mock.expect_write_failure(b"q");

        assert!(matches!(mock.send(b"q").await, Err(Error::ConnectionLost)));
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn mock_transport_partial_receive() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[0xAA, 0xBB, 0xCC, 0xDD]);
        mock.send(&[0x01]).await.unwrap();

        let mut buf = [0u8; 2];
        let n = mock.receive(&mut buf, Duration::from_millis(100)).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);
        let n = mock.receive(&mut buf, Duration::from_millis(100)).await.unwrap();
        assert_eq!(&buf[..n], &[0xCC, 0xDD]);
    }

    #[tokio::test]
    async fn unread_reply_stays_ahead_of_next_one() {
        let mut mock = MockTransport::new();
        mock.expect(b"a", b"ack");
        mock.expect_silent(b"b");
        mock.expect(b"c", b"reply");

        mock.send(b"a").await.unwrap();
        let mut buf = [0u8; 1];
        mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        mock.send(b"b").await.unwrap();
        mock.send(b"c").await.unwrap();

        let mut buf = [0u8; 16];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"ckreply");
    }

    #[tokio::test]
    async fn exchange_log_merges_consecutive_reads() {
        let mut mock = MockTransport::new();
        let log = mock.log();
        mock.expect(b"w", b"abcd");
        mock.send(b"w").await.unwrap();

        let mut buf = [0u8; 2];
        mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();

        assert_eq!(log.events().len(), 3);
        assert_eq!(
            log.exchanges(),
            vec![IoEvent::Write(b"w".to_vec()), IoEvent::Read(b"abcd".to_vec())]
        );
        assert_eq!(mock.sent_data(), vec![b"w".to_vec()]);
    }

    #[tokio::test]
    async fn mock_transport_close() {
        let mut mock = MockTransport::new();
        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(matches!(mock.send(b"a").await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn mock_connector_yields_in_order_then_refuses() {
        let mut first = MockTransport::new();
        first.expect(b"1", b"");
        let connector = MockConnector::new(vec![first, MockTransport::new()]);
        let count = connector.connect_count();

        let mut t = connector.connect(Duration::from_millis(10)).await.unwrap();
        t.send(b"1").await.unwrap();
        let _second = connector.connect(Duration::from_millis(10)).await.unwrap();
        let third = connector.connect(Duration::from_millis(10)).await;

        assert!(matches!(third, Err(Error::Connect(_))));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
