//! Mock TCP peer for end-to-end testing over a real socket.
//!
//! [`MockTcpServer`] is a localhost TCP listener pre-loaded with scripted
//! replies. It lets tests run the real `TcpConnector`/`TcpTransport` stack
//! against something that behaves like a receiver, including one that
//! ignores certain queries or answers them late.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use eiscp_test_harness::MockTcpServer;
//!
//! # async fn example() -> eiscp_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.expect(b"request-frame", b"response-frame");
//! server.expect_silent(b"ignored-frame");
//! server.expect_late(b"slow-frame", b"late-reply", Duration::from_millis(80));
//! server.start();
//!
//! let port = server.port();
//! // ... connect a client to 127.0.0.1:port and exercise it ...
//! # Ok(())
//! # }
//! ```

use eiscp_core::error::{Error, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A pre-loaded request/reply pair for the mock TCP server.
#[derive(Debug, Clone)]
struct TcpExpectation {
    /// The exact bytes we expect the client to send.
    request: Vec<u8>,
    /// Bytes to write back, or `None` to stay silent.
    response: Option<Vec<u8>>,
    /// Pause between reading the request and writing the response.
    delay: Duration,
}

/// A scripted TCP peer.
///
/// The listener is bound in [`new`](MockTcpServer::new), so clients may
/// connect as soon as the address is known. Once [`start`](MockTcpServer::start)
/// is called the server accepts a single connection and processes
/// expectations in order: it reads exactly the expected request bytes and
/// writes the scripted reply, if any. When the script is exhausted it keeps
/// the connection open until the client hangs up.
///
/// A delayed reply holds up the rest of the script, so requests the client
/// writes in the meantime wait in the socket until the reply has gone out.
pub struct MockTcpServer {
    listener: Option<TcpListener>,
    /// The address the server is listening on (e.g. "127.0.0.1:54321").
    addr: String,
    port: u16,
    /// Ordered queue of expected request/reply pairs.
    expectations: VecDeque<TcpExpectation>,
    /// Handle to the server task once started.
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Create a new mock server listening on a random localhost port.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Connect(format!("failed to bind mock TCP server: {}", e)))?;
        let local = listener.local_addr().map_err(Error::Io)?;

        Ok(Self {
            listener: Some(listener),
            addr: local.to_string(),
            port: local.port(),
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Add an expected request and the bytes to answer it with.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.push(request, Some(response), Duration::ZERO);
    }

    /// Add an expected request that is read but never answered.
    pub fn expect_silent(&mut self, request: &[u8]) {
        self.push(request, None, Duration::ZERO);
    }

    /// Add an expected request answered only after `delay`.
    pub fn expect_late(&mut self, request: &[u8], response: &[u8], delay: Duration) {
        self.push(request, Some(response), delay);
    }

    fn push(&mut self, request: &[u8], response: Option<&[u8]>, delay: Duration) {
        self.expectations.push_back(TcpExpectation {
            request: request.to_vec(),
            response: response.map(<[u8]>::to_vec),
            delay,
        });
    }

    /// The `host:port` the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start serving one client connection in a background task.
    ///
    /// Call [`wait`](MockTcpServer::wait) after the client has closed its
    /// connection to check that every expectation was met.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;

            for (i, expectation) in expectations.iter().enumerate() {
                let mut buf = vec![0u8; expectation.request.len()];
                let mut total_read = 0;

                while total_read < expectation.request.len() {
                    let n = stream
                        .read(&mut buf[total_read..])
                        .await
                        .map_err(|e| format!("expectation {}: read error: {}", i, e))?;
                    if n == 0 {
                        return Err(format!(
                            "expectation {}: client disconnected after {} bytes (expected {})",
                            i,
                            total_read,
                            expectation.request.len()
                        ));
                    }
                    total_read += n;
                }

                if buf != expectation.request {
                    return Err(format!(
                        "expectation {}: request mismatch: expected {:02X?}, got {:02X?}",
                        i, expectation.request, buf
                    ));
                }

                if let Some(response) = &expectation.response {
                    if !expectation.delay.is_zero() {
                        tokio::time::sleep(expectation.delay).await;
                    }
                    stream
                        .write_all(response)
                        .await
                        .map_err(|e| format!("expectation {}: write error: {}", i, e))?;
                    stream
                        .flush()
                        .await
                        .map_err(|e| format!("expectation {}: flush error: {}", i, e))?;
                }
            }

            // Script done: hold the line open until the client hangs up.
            let mut sink = [0u8; 256];
            loop {
                match stream.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        return Err(format!(
                            "unexpected {} bytes after script: {:02X?}",
                            n,
                            &sink[..n]
                        ));
                    }
                }
            }

            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to complete and return any errors.
    pub async fn wait(self) -> std::result::Result<(), String> {
        if let Some(handle) = self.server_handle {
            handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?
        } else {
            Ok(())
        }
    }
}
