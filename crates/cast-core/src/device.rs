//! Device representation for discovered cast receivers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Default control-channel port for cast receivers.
pub const DEFAULT_CONTROL_PORT: u16 = 8009;

/// A discovered cast receiver.
///
/// `id` keys the device table. Re-discovering the same `id` replaces the
/// stored descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Stable identifier from the TXT `id` attribute, else the instance name.
    pub id: String,
    /// Friendly name from the TXT `fn` attribute, else the instance label.
    pub name: String,
    /// SRV target without the trailing dot.
    pub host: String,
    pub port: u16,
    /// A then AAAA addresses seen for `host` in the same response.
    pub addresses: Vec<IpAddr>,
    /// Raw TXT attributes.
    pub attributes: HashMap<String, String>,
}

impl DeviceDescriptor {
    /// Get a TXT attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Model name from the `md` TXT attribute.
    pub fn model(&self) -> Option<&str> {
        self.attribute("md")
    }

    /// Host to dial: preferred resolved address, falling back to the SRV target.
    pub fn connect_host(&self) -> String {
        self.socket_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| self.host.clone())
    }

    /// Get preferred socket address (prefers IPv4).
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.addresses
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| self.addresses.first())
            .map(|addr| SocketAddr::new(*addr, self.port))
    }

    /// Address literals as advertised on the wire.
    ///
    /// IPv4 renders dotted-decimal; IPv6 renders all eight hex groups
    /// without zero compression.
    pub fn address_literals(&self) -> Vec<String> {
        self.addresses.iter().map(address_literal).collect()
    }
}

/// Render an address in its uncompressed literal form.
pub fn address_literal(addr: &IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => v6
            .segments()
            .iter()
            .map(|group| format!("{:x}", group))
            .collect::<Vec<_>>()
            .join(":"),
    }
}
