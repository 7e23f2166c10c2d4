//! # cast-proto
//!
//! Control-channel wire format for cast receivers.
//!
//! This crate provides:
//! - Length-prefixed tagged envelope encoding/decoding
//! - Streaming frame reassembly over partial reads
//! - Namespace identifiers and JSON payload vocabulary
//!
//! No I/O happens here; the client crate owns the sockets.

pub mod envelope;
pub mod framer;
pub mod namespace;
pub mod payload;

pub use envelope::{decode, decode_body, encode, ControlEnvelope};
pub use framer::{FrameDecoder, MAX_FRAME_LEN};
pub use namespace::{
    Namespace, DEFAULT_MEDIA_RECEIVER_APP_ID, PLATFORM_RECEIVER_ID, PLATFORM_SENDER_ID,
};
pub use payload::{
    Application, ConnectionMessage, HeartbeatMessage, MediaInformation, MediaRequest,
    MediaStatusEntry, ReceiverRequest, ReceiverStatus, RequestId,
};
