//! Control-channel protocol client.

use crate::builder::ClientConfig;
use crate::connection::{spawn_reader, spawn_writer, FrameSender, InboundHandler};
use crate::correlator::{PendingReplies, Reply, ReplyKind};
use crate::events::{ClientEvent, EventBus};
use crate::session::{Session, SessionHandle, SessionSnapshot, SessionState};
use crate::tls::connect_tls;
use async_trait::async_trait;
use cast_core::{Error, LoadRequest, MediaSessionId, ProtocolError, Result};
use cast_proto::payload::{self, to_payload, MSG_PING};
use cast_proto::{
    ConnectionMessage, ControlEnvelope, HeartbeatMessage, MediaInformation, MediaRequest,
    Namespace, ReceiverRequest, RequestId, DEFAULT_MEDIA_RECEIVER_APP_ID, PLATFORM_RECEIVER_ID,
    PLATFORM_SENDER_ID,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Client for one receiver connection.
///
/// Clones drive the same session. Call [`close`] when done; the background
/// tasks otherwise run until the peer hangs up.
///
/// [`close`]: ProtocolClient::close
#[derive(Clone)]
pub struct ProtocolClient {
    inner: Arc<Inner>,
}

struct Inner {
    handle: SessionHandle,
    config: ClientConfig,
    events: EventBus,
    session: Mutex<Session>,
    pending: Mutex<PendingReplies>,
    writer: FrameSender,
    shutdown_tx: watch::Sender<bool>,
}

impl ProtocolClient {
    /// Open a TLS connection to `host:port` and start the session.
    pub async fn connect(
        host: &str,
        port: u16,
        config: ClientConfig,
        events: EventBus,
    ) -> Result<Self> {
        let handle = SessionHandle::new();
        events
            .emit(ClientEvent::StateChanged {
                session: handle,
                state: SessionState::Connecting,
            })
            .await;

        info!("Connecting to {}:{}", host, port);
        match connect_tls(host, port, &config.tls, config.connect_timeout).await {
            Ok(stream) => Self::establish(stream, handle, config, events).await,
            Err(e) => {
                warn!("Connect to {}:{} failed: {}", host, port, e);
                events
                    .emit(ClientEvent::StateChanged {
                        session: handle,
                        state: SessionState::Disconnected,
                    })
                    .await;
                Err(e)
            }
        }
    }

    /// Run the session over an already-open stream.
    pub async fn from_stream<S>(stream: S, config: ClientConfig, events: EventBus) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let handle = SessionHandle::new();
        events
            .emit(ClientEvent::StateChanged {
                session: handle,
                state: SessionState::Connecting,
            })
            .await;
        Self::establish(stream, handle, config, events).await
    }

    async fn establish<S>(
        stream: S,
        handle: SessionHandle,
        config: ClientConfig,
        events: EventBus,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer(write_half);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut session = Session::new();
        session.transition(SessionState::Connecting);

        let inner = Arc::new(Inner {
            handle,
            pending: Mutex::new(PendingReplies::new(config.correlation.correlator())),
            config,
            events,
            session: Mutex::new(session),
            writer,
            shutdown_tx,
        });

        // reader and heartbeat exit once shutdown is signalled; a failed write
        // closes the session like a failed read
        spawn_reader(
            read_half,
            Arc::clone(&inner) as Arc<dyn InboundHandler>,
            shutdown_rx.clone(),
        );
        tokio::spawn(heartbeat_loop(
            inner.writer.clone(),
            inner.config.heartbeat_interval,
            shutdown_rx,
        ));
        let watched = Arc::downgrade(&inner);
        tokio::spawn(async move {
            if let Ok(Some(error)) = writer_task.await {
                if let Some(inner) = watched.upgrade() {
                    inner.on_transport_closed(Some(error)).await;
                }
            }
        });

        let client = Self { inner };
        client.inner.set_state(SessionState::Connected).await;
        client.inner.send(
            PLATFORM_RECEIVER_ID,
            Namespace::Connection,
            &ConnectionMessage::Connect,
        )?;
        client.inner.send(
            PLATFORM_RECEIVER_ID,
            Namespace::Heartbeat,
            &HeartbeatMessage::Ping,
        )?;
        debug!(session = %client.inner.handle, "Control session established");
        Ok(client)
    }

    pub fn handle(&self) -> SessionHandle {
        self.inner.handle
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock_session().state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock_session().snapshot()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn is_connected(&self) -> bool {
        let session = self.inner.lock_session();
        !session.is_closed() && session.state().is_connected()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ProtocolError::NotConnected.into())
        }
    }

    /// Launch the default media receiver and connect to its transport.
    pub async fn launch_default_media_receiver(&self) -> Result<()> {
        self.ensure_open()?;

        let request_id = self.inner.config.request_ids.next_id();
        let reply = self.inner.arm(ReplyKind::ReceiverStatus, request_id);
        self.inner.set_state(SessionState::AppLaunching).await;

        let launch = ReceiverRequest::Launch {
            request_id,
            app_id: DEFAULT_MEDIA_RECEIVER_APP_ID.to_string(),
        };
        if let Err(e) = self
            .inner
            .send(PLATFORM_RECEIVER_ID, Namespace::Receiver, &launch)
        {
            self.inner.set_state(SessionState::Connected).await;
            return Err(e);
        }

        if let Err(e) = self
            .inner
            .await_reply(reply, self.inner.config.launch_timeout, Error::LaunchTimeout)
            .await
        {
            warn!(request_id, "Launch failed: {}", e);
            self.inner.set_state(SessionState::Connected).await;
            return Err(e);
        }

        let transport_id = self.inner.lock_session().transport_id().map(str::to_string);
        let Some(transport_id) = transport_id else {
            self.inner.set_state(SessionState::Connected).await;
            return Err(ProtocolError::NoTransport.into());
        };
        self.inner.send(
            &transport_id,
            Namespace::Connection,
            &ConnectionMessage::Connect,
        )?;
        info!(transport = %transport_id, "Default media receiver ready");
        self.inner.set_state(SessionState::AppReady).await;
        Ok(())
    }

    /// Load media, launching the receiver app first if needed.
    ///
    /// Returns the media session id reported by the receiver, if any.
    pub async fn load_media(&self, request: LoadRequest) -> Result<Option<MediaSessionId>> {
        self.ensure_open()?;
        if !self.inner.lock_session().has_application() {
            self.launch_default_media_receiver().await?;
        }

        let (previous, ids) = {
            let session = self.inner.lock_session();
            let ids = session
                .session_id()
                .zip(session.transport_id())
                .map(|(s, t)| (s.to_string(), t.to_string()));
            (session.state(), ids)
        };
        let (session_id, transport_id) = ids.ok_or(ProtocolError::NoTransport)?;

        let request_id = self.inner.config.request_ids.next_id();
        info!(
            request_id,
            "Loading {} ({}, {})",
            request.content_id,
            request.content_type,
            request.stream_type.as_str()
        );
        let reply = self.inner.arm(ReplyKind::MediaStatus, request_id);
        self.inner.set_state(SessionState::MediaLoading).await;

        let load = MediaRequest::Load {
            request_id,
            session_id,
            media: MediaInformation {
                content_id: request.content_id,
                content_type: request.content_type,
                stream_type: request.stream_type,
                metadata: request.metadata,
            },
            autoplay: request.autoplay,
        };
        if let Err(e) = self.inner.send(&transport_id, Namespace::Media, &load) {
            self.inner.set_state(previous).await;
            return Err(e);
        }

        if let Err(e) = self
            .inner
            .await_reply(reply, self.inner.config.load_timeout, Error::LoadTimeout)
            .await
        {
            warn!(request_id, "Load failed: {}", e);
            self.inner.set_state(previous).await;
            return Err(e);
        }

        self.inner.set_state(SessionState::MediaReady).await;
        Ok(self.inner.lock_session().media_session_id())
    }

    pub async fn play(&self) -> Result<()> {
        self.media_command(|request_id, media_session_id| MediaRequest::Play {
            request_id,
            media_session_id,
        })
    }

    pub async fn pause(&self) -> Result<()> {
        self.media_command(|request_id, media_session_id| MediaRequest::Pause {
            request_id,
            media_session_id,
        })
    }

    pub async fn stop(&self) -> Result<()> {
        self.media_command(|request_id, media_session_id| MediaRequest::Stop {
            request_id,
            media_session_id,
        })
    }

    /// Seek to an absolute position in seconds.
    pub async fn seek(&self, seconds: f64) -> Result<()> {
        self.media_command(|request_id, media_session_id| MediaRequest::Seek {
            request_id,
            media_session_id,
            current_time: seconds,
        })
    }

    /// Ask the receiver for media status; the reply arrives as an event.
    pub async fn request_media_status(&self) -> Result<()> {
        self.ensure_open()?;
        let (transport_id, media_session_id) = {
            let session = self.inner.lock_session();
            (
                session.transport_id().map(str::to_string),
                session.media_session_id(),
            )
        };
        let transport_id = transport_id.ok_or(ProtocolError::NoTransport)?;
        let request = MediaRequest::GetStatus {
            request_id: self.inner.config.request_ids.next_id(),
            media_session_id,
        };
        self.inner.send(&transport_id, Namespace::Media, &request)
    }

    /// Send a transport command for the current media session.
    ///
    /// Does nothing until a media session id is known.
    fn media_command<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(RequestId, MediaSessionId) -> MediaRequest,
    {
        self.ensure_open()?;
        let (transport_id, media_session_id) = {
            let session = self.inner.lock_session();
            (
                session.transport_id().map(str::to_string),
                session.media_session_id(),
            )
        };
        let (Some(transport_id), Some(media_session_id)) = (transport_id, media_session_id) else {
            debug!("No media session, ignoring media command");
            return Ok(());
        };
        let request = build(self.inner.config.request_ids.next_id(), media_session_id);
        self.inner.send(&transport_id, Namespace::Media, &request)
    }

    /// Close the session. Safe to call more than once.
    pub async fn close(&self) {
        let transport_id = {
            let mut session = self.inner.lock_session();
            if !session.mark_closed() {
                return;
            }
            session.transport_id().map(str::to_string)
        };

        if let Some(transport_id) = transport_id {
            let _ = self.inner.send(
                &transport_id,
                Namespace::Connection,
                &ConnectionMessage::Close,
            );
        }
        let _ = self.inner.send(
            PLATFORM_RECEIVER_ID,
            Namespace::Connection,
            &ConnectionMessage::Close,
        );

        self.inner.writer.shutdown().await;
        self.inner.teardown(None).await;
        info!(session = %self.inner.handle, "Control session closed");
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingReplies> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send<T: Serialize>(
        &self,
        destination: &str,
        namespace: Namespace,
        message: &T,
    ) -> Result<()> {
        let payload = to_payload(message)?;
        debug!(%namespace, destination, payload = %payload, "send");
        let envelope = ControlEnvelope::new(PLATFORM_SENDER_ID, destination, namespace, payload);
        self.writer.send(&envelope)
    }

    fn arm(&self, kind: ReplyKind, request_id: RequestId) -> oneshot::Receiver<Reply> {
        self.lock_pending().arm(kind, request_id)
    }

    async fn await_reply(
        &self,
        reply: oneshot::Receiver<Reply>,
        timeout: Duration,
        on_timeout: Error,
    ) -> Result<Reply> {
        // waits outlive teardown; a close never fails them early
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) | Err(_) => Err(on_timeout),
        }
    }

    /// Change state and emit `StateChanged`. Once closed, only
    /// `Disconnected` is accepted.
    async fn set_state(&self, state: SessionState) {
        let changed = {
            let mut session = self.lock_session();
            if session.is_closed() && state != SessionState::Disconnected {
                false
            } else {
                session.transition(state)
            }
        };
        if changed {
            trace!(session = %self.handle, ?state, "state changed");
            self.events
                .emit(ClientEvent::StateChanged {
                    session: self.handle,
                    state,
                })
                .await;
        }
    }

    /// Stop background work and report the close.
    async fn teardown(&self, error: Option<String>) {
        let _ = self.shutdown_tx.send(true);
        self.set_state(SessionState::Disconnected).await;

        if let Some(detail) = error {
            self.events
                .emit(ClientEvent::Error {
                    session: self.handle,
                    detail,
                })
                .await;
        }
        self.events
            .emit(ClientEvent::ConnectionClosed {
                session: self.handle,
            })
            .await;
    }

    fn handle_heartbeat(&self, envelope: &ControlEnvelope, message: &Value) {
        if payload::message_type(message) == Some(MSG_PING) {
            trace!(from = %envelope.source_id, "PING");
            if let Err(e) = self.send(
                &envelope.source_id,
                Namespace::Heartbeat,
                &HeartbeatMessage::Pong,
            ) {
                debug!("Could not answer PING: {}", e);
            }
        }
    }

    async fn handle_receiver(&self, message: Value) {
        let Some(status) = payload::receiver_status(&message) else {
            return;
        };
        let Some(app) = status.first_application() else {
            trace!("Receiver status without applications");
            return;
        };

        self.lock_session().apply_application(app);
        debug!(
            app_id = %app.app_id,
            session_id = %app.session_id,
            transport = %app.transport_or_session_id(),
            "Receiver application running"
        );

        let reply = Reply {
            kind: ReplyKind::ReceiverStatus,
            request_id: payload::request_id(&message),
            message,
        };
        self.lock_pending().resolve(&reply);
        self.events
            .emit(ClientEvent::ReceiverStatus {
                session: self.handle,
                status,
            })
            .await;
    }

    async fn handle_media(&self, message: Value) {
        let Some(entries) = payload::media_status(&message) else {
            return;
        };
        if let Some(id) = entries.first().and_then(|entry| entry.media_session_id) {
            self.lock_session().set_media_session_id(id);
        }

        let reply = Reply {
            kind: ReplyKind::MediaStatus,
            request_id: payload::request_id(&message),
            message: message.clone(),
        };
        self.lock_pending().resolve(&reply);
        self.events
            .emit(ClientEvent::MediaStatus {
                session: self.handle,
                message,
            })
            .await;
    }
}

#[async_trait]
impl InboundHandler for Inner {
    async fn on_envelope(&self, envelope: ControlEnvelope) {
        let Some(namespace) = envelope.namespace_kind() else {
            trace!(namespace = %envelope.namespace, "Ignoring unknown namespace");
            return;
        };
        let message: Value = match serde_json::from_str(&envelope.payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(%namespace, "Dropping non-JSON payload: {}", e);
                return;
            }
        };
        trace!(%namespace, from = %envelope.source_id, "recv");

        match namespace {
            Namespace::Heartbeat => self.handle_heartbeat(&envelope, &message),
            Namespace::Receiver => self.handle_receiver(message).await,
            Namespace::Media => self.handle_media(message).await,
            Namespace::Connection => {
                debug!(from = %envelope.source_id, "Connection message: {}", envelope.payload);
            }
        }
    }

    async fn on_transport_closed(&self, error: Option<String>) {
        if !self.lock_session().mark_closed() {
            return;
        }
        match &error {
            Some(e) => warn!(session = %self.handle, "Transport error: {}", e),
            None => info!(session = %self.handle, "Receiver closed the connection"),
        }
        self.writer.shutdown().await;
        self.teardown(error).await;
    }
}

/// Send PING on a fixed interval until shutdown.
async fn heartbeat_loop(
    writer: FrameSender,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let ping = match to_payload(&HeartbeatMessage::Ping) {
                    Ok(payload) => ControlEnvelope::new(
                        PLATFORM_SENDER_ID,
                        PLATFORM_RECEIVER_ID,
                        Namespace::Heartbeat,
                        payload,
                    ),
                    Err(e) => {
                        warn!("Could not encode PING: {}", e);
                        break;
                    }
                };
                if writer.send(&ping).is_err() {
                    break;
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    trace!("Heartbeat task finished");
}
