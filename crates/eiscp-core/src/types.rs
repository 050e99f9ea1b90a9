//! Core types shared by the eISCP crates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Zone identifier.
///
/// Every ISCP command carries a single character after the `!` start
/// marker that selects which part of the receiver it addresses. `'1'` is
/// the main zone. Construction does not restrict the character; the frame
/// codec rejects anything that is not ASCII when the command is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zone(char);

impl Zone {
    /// The main zone (`'1'`).
    pub const MAIN: Zone = Zone('1');

    /// Zone 2 (`'2'`).
    pub const ZONE2: Zone = Zone('2');

    /// Create a zone from its identifier character.
    pub fn new(id: char) -> Self {
        Zone(id)
    }

    /// Return the identifier character.
    pub fn as_char(&self) -> char {
        self.0
    }
}

impl Default for Zone {
    fn default() -> Self {
        Zone::MAIN
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Zone {
    type Err = Error;

    /// Parse a zone from a one-character string such as `"1"` or `"2"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Zone(c)),
            _ => Err(Error::InvalidParameter(format!(
                "zone must be a single character, got {s:?}"
            ))),
        }
    }
}

/// Lifecycle state of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream is open; the next command will connect.
    Disconnected,
    /// A stream is open.
    Connected,
    /// The owner closed the client. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Snapshot of what a receiver supports, derived from a status probe.
///
/// Not persisted; rebuilt whenever the owner re-probes the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Number of volume steps between silence and maximum output.
    pub volume_resolution: u16,
    /// Zones that answered a status query.
    pub zones: BTreeSet<Zone>,
    /// Input selector labels mapped to their `SLI` argument codes.
    pub inputs: BTreeMap<String, String>,
    /// `SLI` code of the input selected when the probe ran, if reported.
    pub current_input: Option<String>,
}

impl Capabilities {
    /// Whether the given zone answered the probe.
    pub fn has_zone(&self, zone: Zone) -> bool {
        self.zones.contains(&zone)
    }

    /// Look up the `SLI` code for an input label (case-insensitive).
    pub fn input_code(&self, label: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(label))
            .map(|(_, code)| code.as_str())
    }
}
