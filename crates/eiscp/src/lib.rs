//! eISCP client for Onkyo, Pioneer, and Integra network receivers.
//!
//! eISCP carries the receivers' text ISCP commands over TCP, each one
//! wrapped in a 16-byte binary header. This crate provides:
//!
//! - **Frame codec** ([`protocol`]) -- encode and decode eISCP frames and
//!   split received payloads into zone, command code, and argument.
//! - **Command builders** ([`commands`]) -- construct power, volume, mute,
//!   input, and status-query commands and parse their replies.
//! - **Defaults** ([`models`]) -- port, timeouts, volume resolution, and the
//!   standard input-selector table.
//! - **Client** ([`client`]) -- [`EiscpClient`], one persistent connection
//!   with serialized request/response exchanges, lazy connect, and a
//!   no-throw [`ping`](EiscpClient::ping). Named operations such as
//!   [`turn_on`](EiscpClient::turn_on) live in [`control`].
//! - **Probe** ([`probe`]) -- a status sweep that reports which queries the
//!   receiver answers and derives [`Capabilities`](eiscp_core::Capabilities).
//! - **Builder** ([`builder`]) and **config** ([`config`]) -- construct
//!   clients from code or from TOML settings.
//!
//! # Example
//!
//! ```
//! use eiscp::protocol::{decode_header, parse_response};
//! use eiscp::commands::{parse_power, power_on};
//!
//! let frame = power_on(eiscp_core::Zone::MAIN).to_frame().unwrap();
//! assert_eq!(decode_header(&frame).unwrap().payload_size, 8);
//!
//! // A receiver acknowledging the command.
//! let reply = parse_response("!1PWR01\x1a\r\n").unwrap();
//! assert!(parse_power(&reply.argument).unwrap());
//! ```

pub mod builder;
pub mod client;
pub mod commands;
pub mod config;
pub mod control;
pub mod models;
pub mod probe;
pub mod protocol;

// Re-export the primary types for ergonomic `use eiscp::*`.
pub use builder::EiscpBuilder;
pub use client::EiscpClient;
pub use commands::Command;
pub use config::{ConfigError, ReceiverConfig};
pub use probe::{FromProbe, PROBE_COMMANDS, ProbeReport, probe};
