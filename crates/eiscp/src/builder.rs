//! EiscpBuilder -- fluent builder for constructing [`EiscpClient`] instances.
//!
//! Separates configuration from construction so that callers can set the
//! receiver address, default zone, and timeouts before the client exists.
//! Building never touches the network: the connection is opened lazily by
//! the first command or an explicit [`EiscpClient::connect`].
//!
//! # Example
//!
//! ```no_run
//! use eiscp::builder::EiscpBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> eiscp_core::Result<()> {
//! let client = EiscpBuilder::new("192.168.1.40")
//!     .command_timeout(Duration::from_millis(1500))
//!     .build()?;
//! let alive = client.ping().await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use eiscp_core::error::{Error, Result};
use eiscp_core::transport::Connector;
use eiscp_core::types::Zone;
use eiscp_transport::TcpConnector;

use crate::client::EiscpClient;
use crate::commands::MAX_VOLUME_STEP;
use crate::models::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_VOLUME_RESOLUTION,
};

/// Fluent builder for [`EiscpClient`].
///
/// Only the host is required:
///
/// ```ignore
/// let client = EiscpBuilder::new("receiver.local").build()?;
/// ```
#[derive(Debug, Clone)]
pub struct EiscpBuilder {
    host: String,
    port: u16,
    zone: Zone,
    connect_timeout: Duration,
    command_timeout: Duration,
    volume_resolution: u16,
}

impl EiscpBuilder {
    /// Create a new builder for the receiver at `host`.
    pub fn new(host: &str) -> Self {
        EiscpBuilder {
            host: host.to_string(),
            port: DEFAULT_PORT,
            zone: Zone::MAIN,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            volume_resolution: DEFAULT_VOLUME_RESOLUTION,
        }
    }

    /// Set the receiver's host name or IP address.
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the TCP port (default: 60128).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the default zone for zone-less operations such as
    /// [`ping`](EiscpClient::ping) (default: main zone).
    pub fn zone(mut self, zone: Zone) -> Self {
        self.zone = zone;
        self
    }

    /// Set the time allowed to open the connection (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the time allowed for one command exchange (default: 3s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the number of volume steps from silence to maximum (default: 80).
    pub fn volume_resolution(mut self, steps: u16) -> Self {
        self.volume_resolution = steps;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "connect_timeout must be greater than zero".into(),
            ));
        }
        if self.command_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "command_timeout must be greater than zero".into(),
            ));
        }
        if self.volume_resolution == 0 {
            return Err(Error::InvalidParameter(
                "volume_resolution must be greater than zero".into(),
            ));
        }
        if self.volume_resolution > u16::from(MAX_VOLUME_STEP) {
            return Err(Error::InvalidParameter(format!(
                "volume_resolution must be at most {MAX_VOLUME_STEP}"
            )));
        }
        Ok(())
    }

    /// Build an [`EiscpClient`] with a caller-provided connector.
    ///
    /// This is the entry point for testing (pass a `MockConnector` from
    /// `eiscp-test-harness`). The host and port are ignored.
    pub fn build_with_connector(self, connector: Box<dyn Connector>) -> Result<EiscpClient> {
        self.validate()?;
        Ok(EiscpClient::new(
            connector,
            self.zone,
            self.connect_timeout,
            self.command_timeout,
            self.volume_resolution,
        ))
    }

    /// Build an [`EiscpClient`] that connects over TCP.
    pub fn build(self) -> Result<EiscpClient> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidParameter("host is required for build()".into()));
        }
        let connector = TcpConnector::new(self.host.trim(), self.port);
        self.build_with_connector(Box::new(connector))
    }
}
