//! Table of discovered devices keyed by device id.

use crate::traits::BrowseEvent;
use cast_core::DeviceDescriptor;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// When, if ever, silent devices are dropped from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Devices stay until the browser is dropped.
    #[default]
    Never,
    /// Drop devices not re-announced within the given duration.
    IdleFor(Duration),
}

#[derive(Debug, Clone)]
struct Entry {
    device: DeviceDescriptor,
    last_seen: Instant,
}

/// Devices keyed by id; the most recent announcement wins.
#[derive(Debug, Default)]
pub struct DeviceTable {
    entries: HashMap<String, Entry>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device, returning the matching browse event.
    pub fn upsert(&mut self, device: DeviceDescriptor, now: Instant) -> BrowseEvent {
        let entry = Entry {
            device: device.clone(),
            last_seen: now,
        };
        match self.entries.insert(device.id.clone(), entry) {
            None => BrowseEvent::Added(device),
            Some(_) => BrowseEvent::Updated(device),
        }
    }

    pub fn get(&self, id: &str) -> Option<&DeviceDescriptor> {
        self.entries.get(id).map(|e| &e.device)
    }

    /// Snapshot of all devices, ordered by id.
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        let mut devices: Vec<_> = self.entries.values().map(|e| e.device.clone()).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove devices idle past the policy window; returns the removed ids.
    pub fn expire(&mut self, policy: ExpiryPolicy, now: Instant) -> Vec<String> {
        let max_idle = match policy {
            ExpiryPolicy::Never => return Vec::new(),
            ExpiryPolicy::IdleFor(d) => d,
        };

        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_seen) > max_idle)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.entries.remove(id);
        }
        stale
    }
}
