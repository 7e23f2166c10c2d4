//! # cast-core
//!
//! Core types and error definitions shared across all cast crates.
//!
//! This crate provides:
//! - The discovered device descriptor
//! - Media load parameters
//! - Common error types

pub mod device;
pub mod error;
pub mod media;

pub use device::{address_literal, DeviceDescriptor, DEFAULT_CONTROL_PORT};
pub use error::{CodecError, DiscoveryError, Error, ProtocolError, Result};
pub use media::{LoadRequest, MediaSessionId, StreamType};
