//! Controller facade over discovery and protocol sessions.

use crate::builder::{ClientBuilder, ClientConfig};
use crate::client::ProtocolClient;
use crate::events::{ClientEvent, EventBus};
use crate::session::SessionHandle;
use cast_core::{DeviceDescriptor, DiscoveryError, Error, LoadRequest, MediaSessionId, Result};
use cast_discovery::{BrowseEvent, Discovery, ServiceBrowser};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Entry point for applications: finds receivers and drives sessions on them.
///
/// Sessions are addressed by [`SessionHandle`]. Every client created here
/// reports to the controller's [`EventBus`], and discovered devices are
/// forwarded to it as [`ClientEvent::DeviceFound`].
pub struct CastController {
    discovery: Arc<dyn Discovery>,
    config: ClientConfig,
    events: EventBus,
    sessions: Mutex<HashMap<SessionHandle, ProtocolClient>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl CastController {
    /// Create a controller with the given discovery backend and default client settings.
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Self::with_config(discovery, ClientConfig::default(), EventBus::new())
    }

    pub fn with_config(
        discovery: Arc<dyn Discovery>,
        config: ClientConfig,
        events: EventBus,
    ) -> Self {
        Self {
            discovery,
            config,
            events,
            sessions: Mutex::new(HashMap::new()),
            forwarder: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Builder preloaded with this controller's config and event bus.
    pub fn client_builder(&self) -> ClientBuilder {
        ClientBuilder::new()
            .config(self.config.clone())
            .event_bus(self.events.clone())
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<SessionHandle, ProtocolClient>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_forwarder(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.forwarder.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start browsing and forward found devices as events.
    pub async fn start_discovery(&self) -> Result<()> {
        // subscribe first so nothing announced during start is missed
        let rx = self.discovery.subscribe();
        self.discovery.start().await?;

        let mut forwarder = self.lock_forwarder();
        if forwarder.is_none() {
            *forwarder = Some(tokio::spawn(forward_devices(rx, self.events.clone())));
        }
        Ok(())
    }

    pub async fn stop_discovery(&self) {
        if let Some(task) = self.lock_forwarder().take() {
            task.abort();
        }
        self.discovery.stop().await;
    }

    /// Devices currently known to discovery.
    pub async fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.discovery.get_all_devices().await
    }

    /// Connect to a discovered device and launch the default media receiver.
    pub async fn connect(&self, device_id: &str) -> Result<SessionHandle> {
        let device = self
            .discovery
            .get_device(device_id)
            .await
            .ok_or_else(|| DiscoveryError::DeviceNotFound(device_id.to_string()))?;

        info!("Connecting to {} ({})", device.name, device.id);
        let client = self.client_builder().connect_device(&device).await?;
        if let Err(e) = client.launch_default_media_receiver().await {
            client.close().await;
            return Err(e);
        }
        Ok(self.attach(client))
    }

    /// Track an already-connected client. It should report to [`Self::events`].
    pub fn attach(&self, client: ProtocolClient) -> SessionHandle {
        let handle = client.handle();
        self.lock_sessions().insert(handle, client);
        debug!(session = %handle, "Session attached");
        handle
    }

    /// Handles of all tracked sessions.
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.lock_sessions().keys().copied().collect()
    }

    /// Client behind a handle.
    pub fn session(&self, handle: &SessionHandle) -> Result<ProtocolClient> {
        self.lock_sessions()
            .get(handle)
            .cloned()
            .ok_or_else(|| Error::UnknownSession(handle.to_string()))
    }

    pub async fn load_media(
        &self,
        handle: &SessionHandle,
        request: LoadRequest,
    ) -> Result<Option<MediaSessionId>> {
        self.session(handle)?.load_media(request).await
    }

    pub async fn play(&self, handle: &SessionHandle) -> Result<()> {
        self.session(handle)?.play().await
    }

    pub async fn pause(&self, handle: &SessionHandle) -> Result<()> {
        self.session(handle)?.pause().await
    }

    pub async fn stop(&self, handle: &SessionHandle) -> Result<()> {
        self.session(handle)?.stop().await
    }

    pub async fn seek(&self, handle: &SessionHandle, seconds: f64) -> Result<()> {
        self.session(handle)?.seek(seconds).await
    }

    /// Close a session and forget it.
    pub async fn disconnect(&self, handle: &SessionHandle) -> Result<()> {
        let client = self
            .lock_sessions()
            .remove(handle)
            .ok_or_else(|| Error::UnknownSession(handle.to_string()))?;
        client.close().await;
        Ok(())
    }
}

impl Default for CastController {
    /// Controller backed by a multicast [`ServiceBrowser`].
    fn default() -> Self {
        Self::new(Arc::new(ServiceBrowser::default()))
    }
}

impl Drop for CastController {
    fn drop(&mut self) {
        if let Some(task) = self.lock_forwarder().take() {
            task.abort();
        }
    }
}

async fn forward_devices(mut rx: broadcast::Receiver<BrowseEvent>, events: EventBus) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(device) = event.device() {
                    events.emit(ClientEvent::DeviceFound(device.clone())).await;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Device forwarder lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
