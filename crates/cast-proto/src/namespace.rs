//! Control-channel namespaces and fixed endpoint identifiers.

use std::fmt;

/// Source id used by this sender for every message.
pub const PLATFORM_SENDER_ID: &str = "sender-0";

/// Destination id of the receiver platform (as opposed to a launched app).
pub const PLATFORM_RECEIVER_ID: &str = "receiver-0";

/// Application id of the default media receiver.
pub const DEFAULT_MEDIA_RECEIVER_APP_ID: &str = "CC1AD845";

pub const NS_CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";
pub const NS_HEARTBEAT: &str = "urn:x-cast:com.google.cast.tp.heartbeat";
pub const NS_RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";
pub const NS_MEDIA: &str = "urn:x-cast:com.google.cast.media";

/// Sub-protocols multiplexed over one control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Virtual connection open/close.
    Connection,
    /// Keepalive PING/PONG.
    Heartbeat,
    /// Application launch and receiver status.
    Receiver,
    /// Media load and transport control.
    Media,
}

impl Namespace {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Namespace::Connection => NS_CONNECTION,
            Namespace::Heartbeat => NS_HEARTBEAT,
            Namespace::Receiver => NS_RECEIVER,
            Namespace::Media => NS_MEDIA,
        }
    }

    pub fn from_urn(urn: &str) -> Option<Self> {
        match urn {
            NS_CONNECTION => Some(Namespace::Connection),
            NS_HEARTBEAT => Some(Namespace::Heartbeat),
            NS_RECEIVER => Some(Namespace::Receiver),
            NS_MEDIA => Some(Namespace::Media),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_urn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urn_roundtrip() {
        for ns in [
            Namespace::Connection,
            Namespace::Heartbeat,
            Namespace::Receiver,
            Namespace::Media,
        ] {
            assert_eq!(Namespace::from_urn(ns.as_urn()), Some(ns));
        }
    }

    #[test]
    fn unknown_urn_is_none() {
        assert_eq!(Namespace::from_urn("urn:x-cast:com.example.custom"), None);
    }
}
