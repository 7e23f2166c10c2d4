//! # cast-discovery
//!
//! Multicast DNS-SD discovery for cast receivers.
//!
//! This crate provides:
//! - A minimal mDNS message codec (PTR query out, PTR/SRV/TXT/A/AAAA in)
//! - Assembly of responses into device descriptors
//! - An async browser that re-queries periodically and keeps a device table
//! - Trait-based design for testing with mocks
//!
//! ## Example
//!
//! ```ignore
//! use cast_discovery::{Discovery, ServiceBrowser};
//! use std::time::Duration;
//!
//! let browser = ServiceBrowser::default();
//! let devices = browser.scan(Duration::from_secs(5)).await?;
//! for device in devices {
//!     println!("Found: {} ({})", device.name, device.id);
//! }
//! ```

mod assembler;
mod browser;
pub mod dns;
mod table;
mod traits;

use std::net::Ipv4Addr;

pub use assembler::DeviceAssembler;
pub use browser::{BrowserConfig, ServiceBrowser};
pub use table::{DeviceTable, ExpiryPolicy};
pub use traits::{BrowseEvent, Discovery};
#[cfg(any(test, feature = "mock"))]
pub use traits::MockDiscovery;

/// Cast receiver service type for mDNS discovery.
pub const SERVICE_NAME: &str = "_googlecast._tcp.local.";

/// mDNS IPv4 multicast group.
pub const MDNS_MULTICAST_IPV4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// mDNS port.
pub const MDNS_PORT: u16 = 5353;
