//! Error types for the cast sender.

use thiserror::Error;

/// Primary error type for all cast operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Receiver did not report a running application after LAUNCH")]
    LaunchTimeout,

    #[error("Receiver did not report media status after LOAD")]
    LoadTimeout,

    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

/// Errors during mDNS service discovery.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Socket setup failed: {0}")]
    Socket(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),
}

/// Framing and packet decoding errors.
///
/// All variants are drop-and-continue conditions: the offending frame or
/// datagram is discarded and the stream or socket keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Truncated message: need {needed} bytes at offset {offset}, have {available}")]
    TruncatedMessage {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Malformed DNS name: {0}")]
    MalformedName(String),
}

/// Errors raised by the control-channel state machine.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Not connected")]
    NotConnected,

    #[error("Receiver reported an application without a transport id")]
    NoTransport,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(ProtocolError::InvalidPayload(e.to_string()))
    }
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let discovery_err = Error::Discovery(DiscoveryError::DeviceNotFound("abc".to_string()));
        assert!(discovery_err.to_string().contains("Discovery error"));
        assert!(discovery_err.to_string().contains("Device not found: abc"));

        let launch = Error::LaunchTimeout;
        assert!(launch.to_string().contains("LAUNCH"));

        let load = Error::LoadTimeout;
        assert!(load.to_string().contains("LOAD"));

        let unknown = Error::UnknownSession("abc".to_string());
        assert!(unknown.to_string().contains("abc"));

        let truncated = CodecError::TruncatedMessage {
            offset: 12,
            needed: 4,
            available: 1,
        };
        assert!(truncated.to_string().contains("offset 12"));
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error as StdError;

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "test");
        let err = Error::Io(io_err);
        assert!(err.source().is_some());

        let err = Error::Codec(CodecError::MalformedEnvelope("bad tag".to_string()));
        assert!(err.source().is_some());
    }

    #[test]
    fn error_conversions() {
        let err: Error = DiscoveryError::Socket("bind".to_string()).into();
        assert!(matches!(err, Error::Discovery(_)));

        let err: Error = CodecError::MalformedEnvelope("x".to_string()).into();
        assert!(matches!(err, Error::Codec(_)));

        let err: Error = ProtocolError::NotConnected.into();
        assert!(matches!(err, Error::Protocol(ProtocolError::NotConnected)));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InvalidPayload(_))
        ));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
