//! ISCP command builders and response parsers.
//!
//! Builders return a [`Command`] value describing one request; nothing here
//! performs I/O. The client renders a command to a payload with
//! [`Command::to_payload`] and wraps it in a frame with [`Command::to_frame`].
//! Parsers take the argument portion of a reply (see
//! [`parse_response`](crate::protocol::parse_response)) and turn it into a
//! typed value.
//!
//! # Command codes used
//!
//! | Code | Meaning              | Arguments                           |
//! |------|----------------------|-------------------------------------|
//! | PWR  | System power         | `00` standby, `01` on               |
//! | MVL  | Master volume        | `UP`, `DOWN`, or two hex digits     |
//! | AMT  | Audio muting         | `00` off, `01` on                   |
//! | SLI  | Input selector       | two hex digits                      |
//! | LMD  | Listening mode       | two hex digits                      |
//! | ZPW  | Zone 2 power         | as PWR                              |
//! | ZVL  | Zone 2 volume        | as MVL                              |
//! | ZMT  | Zone 2 muting        | as AMT                              |
//!
//! Any of them becomes a status query when sent with the argument `QSTN`.

use eiscp_core::{Error, Result, Zone};

use crate::protocol::{QUERY_ARGUMENT, build_command_payload, encode};

/// System power.
pub const POWER: &str = "PWR";
/// Master volume.
pub const MASTER_VOLUME: &str = "MVL";
/// Audio muting.
pub const AUDIO_MUTING: &str = "AMT";
/// Input selector.
pub const INPUT_SELECTOR: &str = "SLI";
/// Listening mode.
pub const LISTENING_MODE: &str = "LMD";
/// Zone 2 power.
pub const ZONE2_POWER: &str = "ZPW";
/// Zone 2 volume.
pub const ZONE2_VOLUME: &str = "ZVL";
/// Zone 2 muting.
pub const ZONE2_MUTING: &str = "ZMT";

/// Largest value a two-digit hex volume argument can carry.
pub const MAX_VOLUME_STEP: u8 = 0xFF;

/// Reply argument a receiver uses when a value is currently unavailable.
const NOT_AVAILABLE: &str = "N/A";

/// One ISCP request: a command code, an optional argument, and a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Three-letter command code.
    pub code: String,
    /// Argument appended after the code, if any.
    pub argument: Option<String>,
    /// Target zone.
    pub zone: Zone,
}

impl Command {
    /// Create a command from its parts.
    pub fn new(code: impl Into<String>, argument: Option<String>, zone: Zone) -> Self {
        Command {
            code: code.into(),
            argument,
            zone,
        }
    }

    /// Whether this command asks for status rather than changing it.
    pub fn is_query(&self) -> bool {
        self.argument.as_deref() == Some(QUERY_ARGUMENT)
    }

    /// Render the ASCII payload (`"!{zone}{code}{argument}\r"`).
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        build_command_payload(&self.code, self.argument.as_deref(), self.zone)
    }

    /// Render the complete eISCP frame, header included.
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        Ok(encode(&self.to_payload()?))
    }
}

// ---------------------------------------------------------------
// Command builders
// ---------------------------------------------------------------

/// Build a status query (`{code}QSTN`).
pub fn query(code: &str, zone: Zone) -> Command {
    Command::new(code, Some(QUERY_ARGUMENT.to_string()), zone)
}

/// Build a "power on" command (`PWR01`).
pub fn power_on(zone: Zone) -> Command {
    Command::new(POWER, Some("01".into()), zone)
}

/// Build a "power off" (standby) command (`PWR00`).
pub fn power_off(zone: Zone) -> Command {
    Command::new(POWER, Some("00".into()), zone)
}

/// Build a "volume up one step" command (`MVLUP`).
pub fn volume_up(zone: Zone) -> Command {
    Command::new(MASTER_VOLUME, Some("UP".into()), zone)
}

/// Build a "volume down one step" command (`MVLDOWN`).
pub fn volume_down(zone: Zone) -> Command {
    Command::new(MASTER_VOLUME, Some("DOWN".into()), zone)
}

/// Build a "set absolute volume" command (`MVL{step:02X}`).
///
/// The step is clamped to `0..=255` before rendering as two uppercase
/// hex digits, so `-5` renders as `00` and `300` as `FF`.
pub fn volume_step(step: i64, zone: Zone) -> Command {
    Command::new(MASTER_VOLUME, Some(format_volume_step(step)), zone)
}

/// Build a "mute on/off" command (`AMT01` / `AMT00`).
pub fn mute(on: bool, zone: Zone) -> Command {
    let arg = if on { "01" } else { "00" };
    Command::new(AUDIO_MUTING, Some(arg.into()), zone)
}

/// Build a "select input" command (`SLI{code}`).
///
/// The input code is uppercased; see
/// [`standard_inputs`](crate::models::standard_inputs) for known codes.
pub fn select_input(code: &str, zone: Zone) -> Command {
    Command::new(INPUT_SELECTOR, Some(code.to_ascii_uppercase()), zone)
}

/// Clamp a volume step to the hex argument range and render it.
pub fn format_volume_step(step: i64) -> String {
    let clamped = step.clamp(0, i64::from(MAX_VOLUME_STEP));
    format!("{clamped:02X}")
}

// ---------------------------------------------------------------
// Response parsers
// ---------------------------------------------------------------

/// Parse the argument of a `PWR` reply.
///
/// - `"00"` = standby
/// - `"01"` = on
///
/// # Errors
///
/// Returns [`Error::Protocol`] for any other value.
pub fn parse_power(data: &str) -> Result<bool> {
    match data {
        "00" => Ok(false),
        "01" => Ok(true),
        _ => Err(Error::Protocol(format!("unexpected power state: {data:?}"))),
    }
}

/// Parse the argument of an `MVL` reply as a volume step.
///
/// Returns `Ok(None)` when the receiver reports `N/A` (for example while
/// in standby).
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the argument is not hexadecimal.
pub fn parse_volume(data: &str) -> Result<Option<u16>> {
    if data == NOT_AVAILABLE {
        return Ok(None);
    }
    if data.is_empty() {
        return Err(Error::Protocol("expected volume hex digits, got empty data".into()));
    }
    u16::from_str_radix(data, 16)
        .map(Some)
        .map_err(|e| Error::Protocol(format!("invalid volume digits: {data:?} ({e})")))
}

/// Parse the argument of an `AMT` reply.
///
/// Returns `Ok(None)` when the receiver reports `N/A`.
///
/// # Errors
///
/// Returns [`Error::Protocol`] for anything other than `00`, `01`, or `N/A`.
pub fn parse_mute(data: &str) -> Result<Option<bool>> {
    match data {
        "00" => Ok(Some(false)),
        "01" => Ok(Some(true)),
        NOT_AVAILABLE => Ok(None),
        _ => Err(Error::Protocol(format!("unexpected muting state: {data:?}"))),
    }
}

/// Parse the argument of an `SLI` reply into an input code.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the argument is not two hex digits.
pub fn parse_input(data: &str) -> Result<String> {
    if data.len() != 2 || !data.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Protocol(format!("unexpected input code: {data:?}")));
    }
    Ok(data.to_ascii_uppercase())
}
