//! EiscpClient -- one receiver, one persistent TCP connection.
//!
//! eISCP is half-duplex with no correlation ids. The client runs every
//! exchange (write plus optional read) under a single async mutex, so at
//! most one exchange is on the wire at a time no matter how many tasks
//! share the client.
//!
//! Receivers also send frames nobody asked for: acknowledgements of
//! setters, status pushes, and replies that arrive after their query timed
//! out. Bytes already buffered when an exchange starts are discarded before
//! the write, and a reply is only accepted if its zone and command code
//! match the request. Other frames are skipped until the deadline.
//!
//! The connection is opened lazily before the first command and reopened
//! lazily after it has been dropped. A write failure or a malformed frame
//! drops it; a read timeout does not. Closing is terminal.
//!
//! Constructed via [`EiscpBuilder`](crate::builder::EiscpBuilder).

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use eiscp_core::error::{Error, Result};
use eiscp_core::transport::{Connector, Transport};
use eiscp_core::types::{Capabilities, ConnectionState, Zone};

use crate::commands::{self, Command, POWER};
use crate::protocol::{self, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Upper bound on bytes discarded before one write.
const MAX_STALE_BYTES: usize = 64 * 1024;

/// The stream slot guarded by the session lock.
enum Link {
    Disconnected,
    Connected(Box<dyn Transport>),
    Closed,
}

/// State shared by every exchange, guarded by the client's mutex.
struct Session {
    link: Link,
    /// Set while an exchange is on the wire. Still set on entry means the
    /// previous holder was cancelled and its response may be in flight.
    exchange_open: bool,
}

impl Session {
    fn state(&self) -> ConnectionState {
        match &self.link {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connected(t) if t.is_connected() => ConnectionState::Connected,
            Link::Connected(_) => ConnectionState::Disconnected,
            Link::Closed => ConnectionState::Closed,
        }
    }

    /// Close and forget the current stream, leaving the session Disconnected.
    async fn drop_link(&mut self, addr: &str) {
        if let Link::Connected(mut transport) = std::mem::replace(&mut self.link, Link::Disconnected)
        {
            if let Err(e) = transport.close().await {
                debug!(addr = %addr, error = %e, "error closing dropped stream");
            }
            info!(addr = %addr, "connection dropped");
        }
    }
}

/// Outcome of filling a buffer before a deadline.
enum Fill {
    /// Every byte arrived.
    Complete,
    /// Nothing arrived at all.
    Silent,
    /// Some bytes arrived, then the deadline passed.
    Partial(usize),
}

/// A client for one eISCP receiver.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct EiscpClient {
    connector: Box<dyn Connector>,
    session: Mutex<Session>,
    zone: Zone,
    connect_timeout: Duration,
    command_timeout: Duration,
    volume_resolution: u16,
    pub(crate) capabilities: Mutex<Option<Capabilities>>,
}

impl EiscpClient {
    /// Create a new client. Nothing is opened until the first command or an
    /// explicit [`connect`](Self::connect).
    pub(crate) fn new(
        connector: Box<dyn Connector>,
        zone: Zone,
        connect_timeout: Duration,
        command_timeout: Duration,
        volume_resolution: u16,
    ) -> Self {
        EiscpClient {
            connector,
            session: Mutex::new(Session {
                link: Link::Disconnected,
                exchange_open: false,
            }),
            zone,
            connect_timeout,
            command_timeout,
            volume_resolution,
            capabilities: Mutex::new(None),
        }
    }

    /// The `host:port` this client talks to.
    pub fn addr(&self) -> &str {
        self.connector.addr()
    }

    /// The zone used when a caller does not name one.
    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Default timeout for one command exchange.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Configured volume resolution (steps from silence to maximum).
    pub fn volume_resolution(&self) -> u16 {
        self.volume_resolution
    }

    /// Current connection state.
    ///
    /// Waits for any in-flight exchange to finish.
    pub async fn state(&self) -> ConnectionState {
        self.session.lock().await.state()
    }

    // ---------------------------------------------------------------
    // Connection lifecycle
    // ---------------------------------------------------------------

    /// Open the connection using the configured connect timeout.
    pub async fn connect(&self) -> Result<()> {
        self.connect_with_timeout(self.connect_timeout).await
    }

    /// Open the connection if it is not already open.
    ///
    /// Idempotent while connected. Fails with [`Error::Connect`] on
    /// refusal, name resolution failure, or when `timeout` elapses, and
    /// with [`Error::NotConnected`] once the client has been closed.
    pub async fn connect_with_timeout(&self, timeout: Duration) -> Result<()> {
        let mut session = self.session.lock().await;
        self.ensure_link(&mut session, timeout).await
    }

    /// Release the connection. Terminal: every later operation fails with
    /// [`Error::NotConnected`]. Safe to call repeatedly.
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        session.exchange_open = false;
        match std::mem::replace(&mut session.link, Link::Closed) {
            Link::Connected(mut transport) => {
                if let Err(e) = transport.close().await {
                    warn!(addr = %self.addr(), error = %e, "error closing stream");
                }
                info!(addr = %self.addr(), "client closed");
            }
            Link::Disconnected => info!(addr = %self.addr(), "client closed"),
            Link::Closed => {}
        }
    }

    /// Make sure `session` holds an open stream.
    async fn ensure_link(&self, session: &mut Session, timeout: Duration) -> Result<()> {
        if session.exchange_open {
            session.exchange_open = false;
            if matches!(session.link, Link::Connected(_)) {
                warn!(
                    addr = %self.addr(),
                    "previous exchange was interrupted, discarding stream"
                );
                session.drop_link(self.addr()).await;
            }
        }

        match &session.link {
            Link::Closed => return Err(Error::NotConnected),
            Link::Connected(t) if t.is_connected() => return Ok(()),
            Link::Connected(_) | Link::Disconnected => {}
        }
        if matches!(session.link, Link::Connected(_)) {
            debug!(addr = %self.addr(), "stream reported disconnected, reopening");
            session.drop_link(self.addr()).await;
        }

        let transport = self.open_transport(timeout).await?;
        session.link = Link::Connected(transport);
        Ok(())
    }

    async fn open_transport(&self, timeout: Duration) -> Result<Box<dyn Transport>> {
        let addr = self.addr();
        debug!(addr = %addr, timeout_ms = timeout.as_millis() as u64, "connecting");

        match tokio::time::timeout(timeout, self.connector.connect(timeout)).await {
            Ok(Ok(transport)) => {
                info!(addr = %addr, "connected to receiver");
                Ok(transport)
            }
            Ok(Err(e)) => {
                error!(addr = %addr, error = %e, "connect failed");
                Err(match e {
                    Error::Connect(_) => e,
                    other => Error::Connect(format!("{addr}: {other}")),
                })
            }
            Err(_) => {
                error!(addr = %addr, "connect timed out");
                Err(Error::Connect(format!(
                    "timed out after {}ms connecting to {}",
                    timeout.as_millis(),
                    addr
                )))
            }
        }
    }

    // ---------------------------------------------------------------
    // Command exchange
    // ---------------------------------------------------------------

    /// Send one command and optionally wait for one response frame.
    ///
    /// Steps, all under the exchange lock:
    ///
    /// 1. connect if no stream is open (propagating [`Error::Connect`]);
    /// 2. discard bytes the receiver sent since the last exchange;
    /// 3. encode and write the frame; a failure drops the stream and
    ///    returns [`Error::Write`];
    /// 4. with `expect_response == false`, return `Ok(None)` right after
    ///    the write;
    /// 5. otherwise read frames until one carries the same zone and code
    ///    as the request, or `timeout` passes. A timeout before any
    ///    matching frame yields `Ok(None)` and keeps the stream; a short
    ///    read or malformed header drops the stream and returns
    ///    [`Error::Framing`].
    ///
    /// The payload is decoded as ASCII with other bytes dropped.
    pub async fn send_command(
        &self,
        code: &str,
        argument: Option<&str>,
        zone: Zone,
        expect_response: bool,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let command = Command::new(code, argument.map(str::to_string), zone);
        self.execute(&command, expect_response, timeout).await
    }

    /// Like [`send_command`](Self::send_command), for a prebuilt [`Command`].
    pub async fn execute(
        &self,
        command: &Command,
        expect_response: bool,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let frame = command.to_frame()?;

        let mut guard = self.session.lock().await;
        self.ensure_link(&mut guard, self.connect_timeout).await?;
        let alive = match &mut guard.link {
            Link::Connected(transport) => self.discard_stale(&mut **transport).await,
            Link::Disconnected | Link::Closed => true,
        };
        if !alive {
            debug!(addr = %self.addr(), "stream closed by peer, reopening");
            guard.drop_link(self.addr()).await;
            self.ensure_link(&mut guard, self.connect_timeout).await?;
        }

        let session = &mut *guard;
        let Link::Connected(transport) = &mut session.link else {
            return Err(Error::NotConnected);
        };

        debug!(
            addr = %self.addr(),
            code = %command.code,
            argument = command.argument.as_deref().unwrap_or(""),
            zone = %command.zone,
            "sending command"
        );

        // Cleared below unless this future is dropped mid-exchange.
        session.exchange_open = true;
        let outcome = self
            .exchange(&mut **transport, command, &frame, expect_response, timeout)
            .await;
        session.exchange_open = false;

        match outcome {
            Ok(response) => Ok(response),
            Err(e) => {
                session.drop_link(self.addr()).await;
                Err(e)
            }
        }
    }

    /// Read and drop whatever the receiver sent outside an exchange.
    ///
    /// Returns `false` if the peer closed the stream.
    async fn discard_stale(&self, transport: &mut dyn Transport) -> bool {
        let mut buf = [0u8; 1024];
        let mut discarded = 0;
        let alive = loop {
            if discarded >= MAX_STALE_BYTES {
                break true;
            }
            match transport.receive(&mut buf, Duration::ZERO).await {
                Ok(0) => break false,
                Ok(n) => {
                    trace!(addr = %self.addr(), bytes = ?&buf[..n], "stale bytes");
                    discarded += n;
                }
                Err(Error::Timeout) => break true,
                Err(_) => break false,
            }
        };
        if discarded > 0 {
            warn!(addr = %self.addr(), bytes = discarded, "discarding stale bytes");
        }
        alive
    }

    /// Write `frame`, then read the reply to `command` if one is expected.
    ///
    /// Every error returned here invalidates the stream.
    async fn exchange(
        &self,
        transport: &mut dyn Transport,
        command: &Command,
        frame: &[u8],
        expect_response: bool,
        timeout: Duration,
    ) -> Result<Option<String>> {
        trace!(addr = %self.addr(), bytes = ?frame, "write frame");
        match tokio::time::timeout(timeout, transport.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(addr = %self.addr(), error = %e, "write failed");
                return Err(Error::Write(e.to_string()));
            }
            Err(_) => {
                error!(addr = %self.addr(), "write timed out");
                return Err(Error::Write(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                )));
            }
        }

        if !expect_response {
            return Ok(None);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let Some(payload) = self.read_frame(transport, deadline).await? else {
                debug!(addr = %self.addr(), "no response before timeout");
                return Ok(None);
            };

            let text = protocol::decode_payload_text(&payload);
            if answers(command, &text) {
                debug!(addr = %self.addr(), response = %text.trim_end(), "received response");
                return Ok(Some(text));
            }
            warn!(
                addr = %self.addr(),
                expected = %command.code,
                frame = %text.trim_end(),
                "discarding unrelated frame"
            );
        }
    }

    /// Read exactly one frame and return its payload.
    ///
    /// `Ok(None)` means the deadline passed before the first header byte.
    async fn read_frame(
        &self,
        transport: &mut dyn Transport,
        deadline: Instant,
    ) -> Result<Option<Vec<u8>>> {
        let mut header = [0u8; HEADER_SIZE];
        match fill(transport, &mut header, deadline).await? {
            Fill::Complete => {}
            Fill::Silent => return Ok(None),
            Fill::Partial(n) => {
                warn!(addr = %self.addr(), received = n, "short header read");
                return Err(Error::Framing(format!(
                    "short read: {n} of {HEADER_SIZE} header bytes"
                )));
            }
        }

        let header = protocol::decode_header(&header).inspect_err(|e| {
            warn!(addr = %self.addr(), error = %e, "malformed frame header");
        })?;
        if header.payload_size > MAX_PAYLOAD_SIZE {
            return Err(Error::Framing(format!(
                "payload size {} exceeds limit {}",
                header.payload_size, MAX_PAYLOAD_SIZE
            )));
        }

        let mut payload = vec![0u8; header.payload_size as usize];
        match fill(transport, &mut payload, deadline).await? {
            Fill::Complete => {}
            Fill::Silent => {
                return Err(Error::Framing(format!(
                    "short read: 0 of {} payload bytes",
                    payload.len()
                )));
            }
            Fill::Partial(n) => {
                return Err(Error::Framing(format!(
                    "short read: {n} of {} payload bytes",
                    payload.len()
                )));
            }
        }

        trace!(addr = %self.addr(), bytes = ?payload, "read payload");
        Ok(Some(payload))
    }

    // ---------------------------------------------------------------
    // Queries and liveness
    // ---------------------------------------------------------------

    /// Send `{code}QSTN` and wait up to the command timeout for the reply.
    pub async fn query(&self, code: &str, zone: Zone) -> Result<Option<String>> {
        self.query_with_timeout(code, zone, self.command_timeout).await
    }

    /// Send `{code}QSTN` and wait up to `timeout` for the reply.
    pub async fn query_with_timeout(
        &self,
        code: &str,
        zone: Zone,
        timeout: Duration,
    ) -> Result<Option<String>> {
        self.execute(&commands::query(code, zone), true, timeout).await
    }

    /// Query power status and report whether the receiver answered with a
    /// power reply.
    pub async fn check_alive(&self) -> Result<bool> {
        let response = self.query(POWER, self.zone).await?;
        Ok(response.is_some_and(|text| text.contains(POWER)))
    }

    /// Liveness check that never fails.
    ///
    /// `true` only if a power query got an answer containing `PWR`. Every
    /// error is logged and reported as `false`.
    pub async fn ping(&self) -> bool {
        match self.check_alive().await {
            Ok(alive) => alive,
            Err(e) => {
                debug!(addr = %self.addr(), error = %e, "ping failed");
                false
            }
        }
    }

    /// Connect and confirm the receiver answers a power query.
    ///
    /// Fails with [`Error::Connect`] if it does not answer; the receiver may
    /// still be booting and the caller should retry later.
    pub async fn connect_and_verify(&self) -> Result<()> {
        self.connect().await?;
        if self.check_alive().await? {
            info!(addr = %self.addr(), "receiver is ready");
            Ok(())
        } else {
            Err(Error::Connect(format!(
                "{} did not answer the power query, not ready",
                self.addr()
            )))
        }
    }
}

/// Whether `text` is the receiver's reply to `command`.
fn answers(command: &Command, text: &str) -> bool {
    protocol::parse_response(text).is_some_and(|reply| {
        reply.unit == command.zone.as_char() && reply.code.eq_ignore_ascii_case(&command.code)
    })
}

/// Fill `buf` from `transport`, stopping at `deadline`.
async fn fill(transport: &mut dyn Transport, buf: &mut [u8], deadline: Instant) -> Result<Fill> {
    let mut filled = 0;
    while filled < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, transport.receive(&mut buf[filled..], remaining)).await
        {
            Ok(Ok(0)) => {
                return Err(Error::Framing(format!(
                    "connection closed after {filled} of {} bytes",
                    buf.len()
                )));
            }
            Ok(Ok(n)) => filled += n,
            Ok(Err(Error::Timeout)) | Err(_) => break,
            Ok(Err(e)) => {
                return Err(Error::Framing(format!(
                    "read failed after {filled} of {} bytes: {e}",
                    buf.len()
                )));
            }
        }
    }

    Ok(if filled == buf.len() {
        Fill::Complete
    } else if filled == 0 {
        Fill::Silent
    } else {
        Fill::Partial(filled)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode;
    use eiscp_test_harness::{IoEvent, MockConnector, MockTransport};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn client(connector: MockConnector) -> EiscpClient {
        EiscpClient::new(
            Box::new(connector),
            Zone::MAIN,
            Duration::from_millis(200),
            TIMEOUT,
            80,
        )
    }

    fn frame(payload: &str) -> Vec<u8> {
        encode(payload.as_bytes())
    }

    fn pwr_query() -> Vec<u8> {
        frame("!1PWRQSTN\r")
    }

    // ---------------------------------------------------------------
    // Connection lifecycle
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn starts_disconnected_and_connects_lazily() {
        let mut mock = MockTransport::new();
        mock.expect(&frame("!1PWR01\r"), b"");
        let connector = MockConnector::single(mock);
        let count = connector.connect_count();
        let client = client(connector);

        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let resp = client
            .send_command("PWR", Some("01"), Zone::MAIN, false, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(resp, None);
        assert_eq!(client.state().await, ConnectionState::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let connector = MockConnector::single(MockTransport::new());
        let count = connector.connect_count();
        let client = client(connector);

        client.connect().await.unwrap();
        client.connect().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dead_stream_is_reopened_before_next_exchange() {
        let mut dead = MockTransport::new();
        dead.set_connected(false);
        let mut live = MockTransport::new();
        live.expect(&pwr_query(), &frame("!1PWR01\x1a"));
        let connector = MockConnector::new(vec![dead, live]);
        let count = connector.connect_count();
        let client = client(connector);

        client.connect().await.unwrap();
        assert_eq!(client.state().await, ConnectionState::Disconnected);

        assert!(client.ping().await);
        assert_eq!(client.state().await, ConnectionState::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connect_refused_is_connect_error() {
        let client = client(MockConnector::refusing());
        let result = client.connect().await;
        assert!(matches!(result, Err(Error::Connect(_))));
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let client = client(MockConnector::new(vec![
            MockTransport::new(),
            MockTransport::new(),
        ]));
        client.connect().await.unwrap();
        client.close().await;
        client.close().await;

        assert_eq!(client.state().await, ConnectionState::Closed);
        assert!(matches!(client.connect().await, Err(Error::NotConnected)));
        let result = client.query("PWR", Zone::MAIN).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(!client.ping().await);
    }

    // ---------------------------------------------------------------
    // Request/response
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn query_returns_decoded_payload() {
        let mut mock = MockTransport::new();
        mock.expect(&frame("!1MVLQSTN\r"), &frame("!1MVL2A\x1a\r\n"));
        let client = client(MockConnector::single(mock));

        let resp = client.query("MVL", Zone::MAIN).await.unwrap();
        assert_eq!(resp.as_deref(), Some("!1MVL2A\u{1a}\r\n"));
    }

    #[tokio::test]
    async fn non_ascii_payload_bytes_are_dropped() {
        let mut mock = MockTransport::new();
        mock.expect(&frame("!1NTIQSTN\r"), &encode(b"!1NTIcaf\xc3\xa9\x1a"));
        let client = client(MockConnector::single(mock));

        let resp = client.query("NTI", Zone::MAIN).await.unwrap();
        assert_eq!(resp.as_deref(), Some("!1NTIcaf\u{1a}"));
    }

    #[tokio::test]
    async fn silent_peer_yields_none_and_keeps_stream() {
        let mut mock = MockTransport::new();
        mock.expect_silent(&pwr_query());
        mock.expect(&pwr_query(), &frame("!1PWR01\x1a"));
        let connector = MockConnector::single(mock);
        let count = connector.connect_count();
        let client = client(connector);

        assert_eq!(client.query("PWR", Zone::MAIN).await.unwrap(), None);
        assert_eq!(client.state().await, ConnectionState::Connected);

        assert!(client.ping().await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zone_is_rendered_into_payload() {
        let mut mock = MockTransport::new();
        mock.expect(&frame("!2PWRQSTN\r"), &frame("!2PWR00\x1a"));
        let client = client(MockConnector::single(mock));

        let resp = client.query("PWR", Zone::ZONE2).await.unwrap();
        assert_eq!(resp.as_deref(), Some("!2PWR00\u{1a}"));
    }

    #[tokio::test]
    async fn encoding_error_touches_nothing() {
        let connector = MockConnector::single(MockTransport::new());
        let count = connector.connect_count();
        let client = client(connector);

        let result = client
            .send_command("PWR", Some("ö"), Zone::MAIN, true, TIMEOUT)
            .await;
        assert!(matches!(result, Err(Error::Encoding(_))));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    // ---------------------------------------------------------------
    // Failure handling
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn write_failure_disconnects_then_reconnects() {
        let mut first = MockTransport::new();
        first.expect_write_failure(&frame("!1PWR01\r"));
        let mut second = MockTransport::new();
        second.expect(&pwr_query(), &frame("!1PWR01\x1a"));
        let connector = MockConnector::new(vec![first, second]);
        let count = connector.connect_count();
        let client = client(connector);

        let result = client
            .send_command("PWR", Some("01"), Zone::MAIN, false, TIMEOUT)
            .await;
        assert!(matches!(result, Err(Error::Write(_))));
        assert_eq!(client.state().await, ConnectionState::Disconnected);

        assert!(client.ping().await);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bad_magic_is_framing_error_and_drops_stream() {
        let mut reply = frame("!1PWR01\x1a");
        reply[..4].copy_from_slice(b"ISCQ");
        let mut mock = MockTransport::new();
        mock.expect(&pwr_query(), &reply);
        let client = client(MockConnector::single(mock));

        let result = client.query("PWR", Zone::MAIN).await;
        assert!(matches!(result, Err(Error::Framing(_))));
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn bad_version_is_framing_error() {
        let mut reply = frame("!1PWR01\x1a");
        reply[12] = 0x02;
        let mut mock = MockTransport::new();
        mock.expect(&pwr_query(), &reply);
        let client = client(MockConnector::single(mock));

        assert!(matches!(
            client.query("PWR", Zone::MAIN).await,
            Err(Error::Framing(_))
        ));
    }

    #[tokio::test]
    async fn short_header_is_framing_error() {
        let mut mock = MockTransport::new();
        mock.expect(&pwr_query(), b"ISCP\x00\x00");
        let client = client(MockConnector::single(mock));

        let result = client.query("PWR", Zone::MAIN).await;
        assert!(matches!(result, Err(Error::Framing(_))));
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn short_payload_is_framing_error() {
        let mut reply = frame("!1PWR01\x1a");
        reply.truncate(reply.len() - 3);
        let mut mock = MockTransport::new();
        mock.expect(&pwr_query(), &reply);
        let client = client(MockConnector::single(mock));

        let result = client.query("PWR", Zone::MAIN).await;
        assert!(matches!(result, Err(Error::Framing(_))));
    }

    #[tokio::test]
    async fn ping_false_on_unrelated_reply() {
        let mut mock = MockTransport::new();
        mock.expect(&pwr_query(), &frame("!1MVL20\x1a"));
        let client = client(MockConnector::single(mock));
        assert!(!client.ping().await);
    }

    // ---------------------------------------------------------------
    // Unsolicited and late frames
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn setter_ack_is_discarded_before_next_write() {
        let power_on = frame("!1PWR01\r");
        let ack = frame("!1PWR01\x1a\r\n");
        let mvl_query = frame("!1MVLQSTN\r");
        let mvl_reply = frame("!1MVL2A\x1a\r\n");

        let mut mock = MockTransport::new();
        mock.expect(&power_on, &ack);
        mock.expect(&mvl_query, &mvl_reply);
        let log = mock.log();
        let client = client(MockConnector::single(mock));

        client
            .send_command("PWR", Some("01"), Zone::MAIN, false, TIMEOUT)
            .await
            .unwrap();
        let resp = client.query("MVL", Zone::MAIN).await.unwrap();
        assert_eq!(resp.as_deref(), Some("!1MVL2A\u{1a}\r\n"));

        assert_eq!(
            log.exchanges(),
            vec![
                IoEvent::Write(power_on),
                IoEvent::Read(ack),
                IoEvent::Write(mvl_query),
                IoEvent::Read(mvl_reply),
            ]
        );
    }

    #[tokio::test]
    async fn frames_for_other_requests_are_skipped() {
        let mut reply = frame("!1MVL2A\x1a");
        reply.extend(frame("!2PWR00\x1a"));
        reply.extend(frame("!1PWR01\x1a"));
        let mut mock = MockTransport::new();
        mock.expect(&pwr_query(), &reply);
        let client = client(MockConnector::single(mock));

        let resp = client.query("PWR", Zone::MAIN).await.unwrap();
        assert_eq!(resp.as_deref(), Some("!1PWR01\u{1a}"));
        assert_eq!(client.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn only_unrelated_frames_means_no_answer() {
        let mut mock = MockTransport::new();
        mock.expect(&pwr_query(), &frame("!1MVL20\x1a"));
        mock.expect(&frame("!1MVLQSTN\r"), &frame("!1MVL21\x1a"));
        let connector = MockConnector::single(mock);
        let count = connector.connect_count();
        let client = client(connector);

        assert_eq!(client.query("PWR", Zone::MAIN).await.unwrap(), None);
        assert_eq!(client.state().await, ConnectionState::Connected);

        let resp = client.query("MVL", Zone::MAIN).await.unwrap();
        assert_eq!(resp.as_deref(), Some("!1MVL21\u{1a}"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn late_reply_does_not_answer_next_query() {
        // The PWR reply shows up only after its query gave up: it is in the
        // stream ahead of the MVL reply.
        let mut late_then_reply = frame("!1PWR01\x1a");
        late_then_reply.extend(frame("!1MVL14\x1a"));

        let mut mock = MockTransport::new();
        mock.expect_silent(&pwr_query());
        mock.expect(&frame("!1MVLQSTN\r"), &late_then_reply);
        let client = client(MockConnector::single(mock));

        assert_eq!(client.query("PWR", Zone::MAIN).await.unwrap(), None);
        let resp = client.query("MVL", Zone::MAIN).await.unwrap();
        assert_eq!(resp.as_deref(), Some("!1MVL14\u{1a}"));
    }

    #[tokio::test]
    async fn ping_false_when_refused() {
        let client = client(MockConnector::refusing());
        assert!(!client.ping().await);
    }

    #[tokio::test]
    async fn connect_and_verify_requires_answer() {
        let mut mock = MockTransport::new();
        mock.expect_silent(&pwr_query());
        let booting = client(MockConnector::single(mock));
        assert!(matches!(
            booting.connect_and_verify().await,
            Err(Error::Connect(_))
        ));

        let mut mock = MockTransport::new();
        mock.expect(&pwr_query(), &frame("!1PWR01\x1a"));
        let ready = client(MockConnector::single(mock));
        ready.connect_and_verify().await.unwrap();
    }

    // ---------------------------------------------------------------
    // Concurrency and cancellation
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn concurrent_exchanges_do_not_interleave() {
        let mvl_query = frame("!1MVLQSTN\r");
        let pwr_reply = frame("!1PWR01\x1a");
        let mvl_reply = frame("!1MVL20\x1a");

        let mut mock = MockTransport::new().with_latency(Duration::from_millis(5));
        mock.expect(&pwr_query(), &pwr_reply);
        mock.expect(&mvl_query, &mvl_reply);
        let log = mock.log();
        let client = Arc::new(client(MockConnector::single(mock)));

        let a = client.clone();
        let b = client.clone();
        let (first, second) = tokio::join!(
            async move { a.query("PWR", Zone::MAIN).await },
            async move { b.query("MVL", Zone::MAIN).await },
        );

        assert_eq!(first.unwrap().as_deref(), Some("!1PWR01\u{1a}"));
        assert_eq!(second.unwrap().as_deref(), Some("!1MVL20\u{1a}"));
        assert_eq!(
            log.exchanges(),
            vec![
                IoEvent::Write(pwr_query()),
                IoEvent::Read(pwr_reply),
                IoEvent::Write(mvl_query),
                IoEvent::Read(mvl_reply),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_exchange_releases_lock_and_forces_reconnect() {
        let mut slow = MockTransport::new().with_latency(Duration::from_millis(200));
        slow.expect(&pwr_query(), &frame("!1PWR01\x1a"));
        let mut fresh = MockTransport::new();
        fresh.expect(&pwr_query(), &frame("!1PWR00\x1a"));
        let connector = MockConnector::new(vec![slow, fresh]);
        let count = connector.connect_count();
        let client = client(connector);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            client.query_with_timeout("PWR", Zone::MAIN, Duration::from_secs(1)),
        )
        .await;
        assert!(cancelled.is_err());

        let resp = client.query("PWR", Zone::MAIN).await.unwrap();
        assert_eq!(resp.as_deref(), Some("!1PWR00\u{1a}"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
