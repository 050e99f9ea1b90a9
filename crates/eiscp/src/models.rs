//! Receiver defaults and the standard input-selector table.
//!
//! Onkyo, Pioneer, and Integra receivers share one input code space for the
//! `SLI` command. Not every model has every input; the table lists the codes
//! common to the current network-capable range.

use std::collections::BTreeMap;
use std::time::Duration;

/// TCP port eISCP receivers listen on.
pub const DEFAULT_PORT: u16 = 60128;

/// Number of volume steps assumed when the receiver does not say otherwise.
pub const DEFAULT_VOLUME_RESOLUTION: u16 = 80;

/// Time allowed to open the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for a single command exchange.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Input selector labels and their `SLI` argument codes.
const STANDARD_INPUTS: &[(&str, &str)] = &[
    ("VIDEO1", "00"),
    ("VIDEO2", "01"),
    ("VIDEO3", "02"),
    ("VIDEO4", "03"),
    ("VIDEO5", "04"),
    ("VIDEO6", "05"),
    ("VIDEO7", "06"),
    ("DVD", "10"),
    ("TV", "12"),
    ("TAPE", "20"),
    ("PHONO", "22"),
    ("CD", "23"),
    ("FM", "24"),
    ("AM", "25"),
    ("TUNER", "26"),
    ("USB", "29"),
    ("NET", "2B"),
    ("BLUETOOTH", "2E"),
];

/// The standard input table as an owned label -> code map.
pub fn standard_inputs() -> BTreeMap<String, String> {
    STANDARD_INPUTS
        .iter()
        .map(|(label, code)| (label.to_string(), code.to_string()))
        .collect()
}

/// Label for a known `SLI` code (case-insensitive), if any.
pub fn input_label(code: &str) -> Option<&'static str> {
    STANDARD_INPUTS
        .iter()
        .find(|(_, c)| c.eq_ignore_ascii_case(code))
        .map(|(label, _)| *label)
}
