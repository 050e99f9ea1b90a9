//! Error types for eISCP receiver control.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Connection setup, write-path, framing,
//! and payload-encoding failures are all captured here.

/// The error type for all eISCP operations.
///
/// The first five variants form the client-facing taxonomy surfaced by
/// command issuance. The remaining variants are reported by byte-level
/// [`Transport`](crate::transport::Transport) implementations and are
/// usually translated into one of the first five before reaching callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection could not be opened (refused, unreachable, DNS
    /// failure, or the connect deadline expired).
    #[error("connect error: {0}")]
    Connect(String),

    /// A write failed on a connection that was believed to be open.
    #[error("write error: {0}")]
    Write(String),

    /// A received frame was malformed: bad magic, unexpected header size
    /// or version, or the stream ended part way through a frame.
    #[error("framing error: {0}")]
    Framing(String),

    /// A command field contained characters that cannot be sent as ASCII.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// No live connection, and none can be made (the client was closed).
    #[error("not connected")]
    NotConnected,

    /// Timed out waiting for bytes from the receiver.
    #[error("timeout waiting for response")]
    Timeout,

    /// The peer closed the connection.
    #[error("connection lost")]
    ConnectionLost,

    /// The receiver answered with something other than what was asked for.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An invalid parameter was passed to a command or builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_connect() {
        let e = Error::Connect("connection refused: 10.0.0.5:60128".into());
        assert_eq!(
            e.to_string(),
            "connect error: connection refused: 10.0.0.5:60128"
        );
    }

    #[test]
    fn error_display_write() {
        let e = Error::Write("broken pipe".into());
        assert_eq!(e.to_string(), "write error: broken pipe");
    }

    #[test]
    fn error_display_framing() {
        let e = Error::Framing("bad magic".into());
        assert_eq!(e.to_string(), "framing error: bad magic");
    }

    #[test]
    fn error_display_encoding() {
        let e = Error::Encoding("argument is not ASCII".into());
        assert_eq!(e.to_string(), "encoding error: argument is not ASCII");
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
