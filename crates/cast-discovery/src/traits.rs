//! Trait definitions for service discovery (enables mocking in tests).

use async_trait::async_trait;
use cast_core::{DeviceDescriptor, Result};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::Stream;

/// Event emitted during device browsing.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowseEvent {
    /// New device discovered.
    Added(DeviceDescriptor),
    /// Known device announced again; fields reflect the latest announcement.
    Updated(DeviceDescriptor),
    /// Device expired from the table.
    Removed(String),
}

impl BrowseEvent {
    /// Get the device from an Added or Updated event.
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        match self {
            BrowseEvent::Added(d) | BrowseEvent::Updated(d) => Some(d),
            BrowseEvent::Removed(_) => None,
        }
    }

    /// Get the device ID from any event.
    pub fn device_id(&self) -> &str {
        match self {
            BrowseEvent::Added(d) | BrowseEvent::Updated(d) => &d.id,
            BrowseEvent::Removed(id) => id,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, BrowseEvent::Added(_))
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, BrowseEvent::Updated(_))
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, BrowseEvent::Removed(_))
    }
}

/// Trait for service discovery implementations.
///
/// The controller talks to discovery only through this trait, so tests can
/// substitute a mock.
#[async_trait]
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait Discovery: Send + Sync {
    /// Begin periodic querying. Calling it while already running is a no-op.
    async fn start(&self) -> Result<()>;

    /// Stop querying and release the socket. Safe to call repeatedly.
    async fn stop(&self);

    /// Start browsing and return a stream of browse events.
    async fn browse(&self) -> Result<Box<dyn Stream<Item = BrowseEvent> + Send + Unpin>>;

    /// Browse for `timeout`, then return every known device.
    async fn scan(&self, timeout: Duration) -> Result<Vec<DeviceDescriptor>>;

    /// Get a specific device by ID if currently known.
    async fn get_device(&self, id: &str) -> Option<DeviceDescriptor>;

    /// Get all currently known devices.
    async fn get_all_devices(&self) -> Vec<DeviceDescriptor>;

    /// Subscribe to browse events emitted from now on.
    fn subscribe(&self) -> broadcast::Receiver<BrowseEvent>;
}
