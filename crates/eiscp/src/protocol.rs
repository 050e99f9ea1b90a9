//! eISCP frame encoder/decoder.
//!
//! eISCP wraps each ISCP text message in a fixed 16-byte binary header so
//! the reader always knows exactly how many payload bytes to pull next.
//! All multi-byte integers are big-endian.
//!
//! # Frame format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic "ISCP"
//! 4       4     Header size (= 16)
//! 8       4     Payload size N
//! 12      1     Version (= 1)
//! 13      3     Reserved (= 0x00 0x00 0x00)
//! 16      N     ASCII payload "!<zone><code><arg>\r"
//! ```
//!
//! # Payload format
//!
//! Commands are `!`, a one-character zone, a three-letter command code, an
//! optional argument, and a carriage return. Receivers answer with the same
//! shape, usually terminated by `EOF` (0x1A) and/or `CR LF` instead of a
//! bare `CR`.

use bytes::{BufMut, BytesMut};

use eiscp_core::error::{Error, Result};
use eiscp_core::types::Zone;

/// The four magic bytes that open every frame.
pub const MAGIC: &[u8; 4] = b"ISCP";

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 16;

/// The only protocol version in use.
pub const VERSION: u8 = 0x01;

/// Start-of-message marker in the payload.
pub const START: u8 = b'!';

/// Terminator appended to every outgoing payload.
pub const END: u8 = b'\r';

/// Argument that turns any command into a status query.
pub const QUERY_ARGUMENT: &str = "QSTN";

/// Upper bound accepted for an incoming payload size.
///
/// Status replies are tens of bytes; the largest (network metadata) are a
/// few kilobytes. Anything beyond this is treated as a corrupt header.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

/// Decoded fixed header of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Header size field; always [`HEADER_SIZE`] once validated.
    pub header_size: u32,
    /// Number of payload bytes that follow the header.
    pub payload_size: u32,
    /// Version byte; always [`VERSION`] once validated.
    pub version: u8,
}

/// A received payload split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Unit/zone character that followed the `!` marker.
    pub unit: char,
    /// Three-letter command code, e.g. `"PWR"`.
    pub code: String,
    /// Everything after the code, with end-of-message characters removed.
    pub argument: String,
}

/// Wrap a payload in an eISCP frame.
///
/// Always emits header size 16, version 1, and zeroed reserved bytes. The
/// output is exactly `16 + payload.len()` bytes long.
///
/// # Example
///
/// ```
/// use eiscp::protocol::encode;
///
/// let frame = encode(b"!1PWR01\r");
/// assert_eq!(&frame[..4], b"ISCP");
/// assert_eq!(frame.len(), 16 + 8);
/// ```
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(MAGIC);
    buf.put_u32(HEADER_SIZE as u32);
    buf.put_u32(payload.len() as u32);
    buf.put_u8(VERSION);
    buf.put_bytes(0, 3);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Decode and validate the fixed header at the start of `buf`.
///
/// Fails with [`Error::Framing`] if fewer than 16 bytes are given, the
/// magic is wrong, the header size is not 16, or the version is not 1.
pub fn decode_header(buf: &[u8]) -> Result<Header> {
    if buf.len() < HEADER_SIZE {
        return Err(Error::Framing(format!(
            "header needs {} bytes, got {}",
            HEADER_SIZE,
            buf.len()
        )));
    }

    if &buf[..4] != MAGIC {
        return Err(Error::Framing(format!("bad magic: {:02X?}", &buf[..4])));
    }

    let header_size = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let payload_size = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let version = buf[12];

    if header_size != HEADER_SIZE as u32 {
        return Err(Error::Framing(format!(
            "unexpected header size {header_size} (expected {HEADER_SIZE})"
        )));
    }
    if version != VERSION {
        return Err(Error::Framing(format!(
            "unexpected version {version} (expected {VERSION})"
        )));
    }

    Ok(Header {
        header_size,
        payload_size,
        version,
    })
}

/// Render a command as an ASCII payload: `"!{zone}{code}{argument}\r"`.
///
/// An absent argument renders as nothing (not as `QSTN`). Fails with
/// [`Error::Encoding`] if any field contains a non-ASCII character.
///
/// # Example
///
/// ```
/// use eiscp::protocol::build_command_payload;
/// use eiscp_core::Zone;
///
/// let payload = build_command_payload("MVL", Some("UP"), Zone::MAIN).unwrap();
/// assert_eq!(payload, b"!1MVLUP\r");
/// ```
pub fn build_command_payload(code: &str, argument: Option<&str>, zone: Zone) -> Result<Vec<u8>> {
    let argument = argument.unwrap_or("");

    if !zone.as_char().is_ascii() {
        return Err(Error::Encoding(format!("zone {:?} is not ASCII", zone.as_char())));
    }
    if !code.is_ascii() {
        return Err(Error::Encoding(format!("command code {code:?} is not ASCII")));
    }
    if !argument.is_ascii() {
        return Err(Error::Encoding(format!("argument {argument:?} is not ASCII")));
    }

    let mut buf = BytesMut::with_capacity(3 + code.len() + argument.len());
    buf.put_u8(START);
    buf.put_u8(zone.as_char() as u8);
    buf.put_slice(code.as_bytes());
    buf.put_slice(argument.as_bytes());
    buf.put_u8(END);
    Ok(buf.to_vec())
}

/// Decode payload bytes as ASCII text, silently dropping anything else.
pub fn decode_payload_text(payload: &[u8]) -> String {
    payload
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect()
}

/// Split a received payload into unit, command code, and argument.
///
/// Accepts replies with or without the leading `!` and strips trailing
/// `EOF`, `CR`, and `LF`. Returns `None` if fewer than three code
/// characters follow the unit character.
///
/// # Example
///
/// ```
/// use eiscp::protocol::parse_response;
///
/// let r = parse_response("!1PWR01\x1a\r\n").unwrap();
/// assert_eq!(r.code, "PWR");
/// assert_eq!(r.argument, "01");
/// ```
pub fn parse_response(text: &str) -> Option<Response> {
    let body = text.strip_prefix('!').unwrap_or(text);
    let body = body.trim_end_matches(['\u{1a}', '\r', '\n']);

    let mut chars = body.chars();
    let unit = chars.next()?;
    let rest = chars.as_str();

    let code = rest.get(..3)?;
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    Some(Response {
        unit,
        code: code.to_string(),
        argument: rest[3..].to_string(),
    })
}
