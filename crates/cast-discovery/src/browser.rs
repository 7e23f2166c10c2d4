//! mDNS service browser implementation.

use crate::assembler::DeviceAssembler;
use crate::dns::{build_query, parse_response};
use crate::table::{DeviceTable, ExpiryPolicy};
use crate::traits::{BrowseEvent, Discovery};
use crate::{MDNS_MULTICAST_IPV4, MDNS_PORT, SERVICE_NAME};
use async_trait::async_trait;
use cast_core::{DeviceDescriptor, DiscoveryError, Result};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, trace, warn};

/// Largest datagram we accept; mDNS allows jumbo packets on some links.
const MAX_DATAGRAM: usize = 9000;

/// Browser configuration.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Interval between repeated PTR queries.
    pub query_interval: Duration,
    pub expiry: ExpiryPolicy,
    /// Interface to join the multicast group on.
    pub interface: Ipv4Addr,
    /// Capacity of the browse-event broadcast channel.
    pub event_capacity: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            query_interval: Duration::from_secs(5),
            expiry: ExpiryPolicy::Never,
            interface: Ipv4Addr::UNSPECIFIED,
            event_capacity: 64,
        }
    }
}

struct BrowserTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    local_addr: Option<SocketAddr>,
}

/// mDNS service browser for cast receivers.
///
/// Owns one UDP socket while running. Devices persist across stop/start.
pub struct ServiceBrowser {
    config: BrowserConfig,
    devices: Arc<RwLock<DeviceTable>>,
    events: broadcast::Sender<BrowseEvent>,
    task: Mutex<Option<BrowserTask>>,
}

impl ServiceBrowser {
    pub fn new(config: BrowserConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            devices: Arc::new(RwLock::new(DeviceTable::new())),
            events,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Local address of the browser socket while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.task.lock().await.as_ref().and_then(|t| t.local_addr)
    }

    /// Open the query socket: ephemeral port, multicast group joined.
    fn open_socket(interface: Ipv4Addr) -> std::io::Result<std::net::UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        socket.bind(&SockAddr::from(bind_addr))?;
        socket.join_multicast_v4(&MDNS_MULTICAST_IPV4, &interface)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_multicast_ttl_v4(255)?;
        if !interface.is_unspecified() {
            socket.set_multicast_if_v4(&interface)?;
        }
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }

    /// Handle one received datagram and return the events it produced.
    ///
    /// Malformed packets are logged and dropped.
    pub(crate) async fn handle_datagram(
        packet: &[u8],
        devices: &RwLock<DeviceTable>,
        events: &broadcast::Sender<BrowseEvent>,
    ) -> Vec<BrowseEvent> {
        let records = match parse_response(packet) {
            Ok(records) => records,
            Err(e) => {
                debug!("Dropping malformed mDNS packet: {}", e);
                return Vec::new();
            }
        };

        let found = DeviceAssembler::assemble(&records, SERVICE_NAME);
        if found.is_empty() {
            return Vec::new();
        }

        let now = Instant::now();
        let mut emitted = Vec::with_capacity(found.len());
        {
            let mut table = devices.write().await;
            for device in found {
                emitted.push(table.upsert(device, now));
            }
        }

        for event in &emitted {
            if event.is_added() {
                info!("Found device {}", event.device_id());
            } else {
                trace!("Refreshed device {}", event.device_id());
            }
            // no subscribers is fine
            let _ = events.send(event.clone());
        }
        emitted
    }

    async fn expire(
        policy: ExpiryPolicy,
        devices: &RwLock<DeviceTable>,
        events: &broadcast::Sender<BrowseEvent>,
    ) {
        if policy == ExpiryPolicy::Never {
            return;
        }
        let removed = devices.write().await.expire(policy, Instant::now());
        for id in removed {
            debug!("Device {} expired", id);
            let _ = events.send(BrowseEvent::Removed(id));
        }
    }

    async fn run_loop(
        socket: UdpSocket,
        config: BrowserConfig,
        devices: Arc<RwLock<DeviceTable>>,
        events: broadcast::Sender<BrowseEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let query = build_query(SERVICE_NAME);
        let destination = SocketAddr::from((MDNS_MULTICAST_IPV4, MDNS_PORT));
        let mut ticker = tokio::time::interval(config.query_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = socket.send_to(&query, destination).await {
                        warn!("Failed to send mDNS query: {}", e);
                    }
                    Self::expire(config.expiry, &devices, &events).await;
                }
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, from)) => {
                            trace!("Received {} bytes from {}", len, from);
                            Self::handle_datagram(&buf[..len], &devices, &events).await;
                        }
                        Err(e) => warn!("mDNS receive error: {}", e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("Service browser shutting down");
                    break;
                }
            }
        }
    }
}

impl Default for ServiceBrowser {
    fn default() -> Self {
        Self::new(BrowserConfig::default())
    }
}

#[async_trait]
impl Discovery for ServiceBrowser {
    async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        let std_socket = Self::open_socket(self.config.interface)
            .map_err(|e| DiscoveryError::Socket(e.to_string()))?;
        let socket =
            UdpSocket::from_std(std_socket).map_err(|e| DiscoveryError::Socket(e.to_string()))?;
        let local_addr = socket.local_addr().ok();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(Self::run_loop(
            socket,
            self.config.clone(),
            Arc::clone(&self.devices),
            self.events.clone(),
            shutdown_rx,
        ));

        info!("Browsing for {} on {:?}", SERVICE_NAME, local_addr);
        *task = Some(BrowserTask {
            shutdown_tx,
            handle,
            local_addr,
        });
        Ok(())
    }

    async fn stop(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            let _ = task.handle.await;
            debug!("Service browser stopped");
        }
    }

    async fn browse(&self) -> Result<Box<dyn Stream<Item = BrowseEvent> + Send + Unpin>> {
        let rx = self.events.subscribe();
        self.start().await?;
        let stream = BroadcastStream::new(rx).filter_map(|event| event.ok());
        Ok(Box::new(Box::pin(stream)))
    }

    async fn scan(&self, timeout: Duration) -> Result<Vec<DeviceDescriptor>> {
        let was_running = self.is_running().await;
        self.start().await?;
        tokio::time::sleep(timeout).await;
        if !was_running {
            self.stop().await;
        }
        Ok(self.get_all_devices().await)
    }

    async fn get_device(&self, id: &str) -> Option<DeviceDescriptor> {
        self.devices.read().await.get(id).cloned()
    }

    async fn get_all_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.read().await.devices()
    }

    fn subscribe(&self) -> broadcast::Receiver<BrowseEvent> {
        self.events.subscribe()
    }
}
