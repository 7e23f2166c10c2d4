//! Control session state.

use cast_core::MediaSessionId;
use cast_proto::Application;
use std::fmt;
use uuid::Uuid;

/// Session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport.
    #[default]
    Disconnected,
    /// TCP/TLS in progress.
    Connecting,
    /// Platform connection open, no application.
    Connected,
    /// LAUNCH sent, awaiting receiver status.
    AppLaunching,
    /// Application running and its transport connected.
    AppReady,
    /// LOAD sent, awaiting media status.
    MediaLoading,
    /// Media loaded.
    MediaReady,
}

impl SessionState {
    /// Whether the transport is open in this state.
    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionState::Disconnected | SessionState::Connecting)
    }
}

/// Opaque handle naming one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time copy of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub connected: bool,
    pub session_id: Option<String>,
    pub transport_id: Option<String>,
    pub media_session_id: Option<MediaSessionId>,
}

/// Mutable session fields owned by one client.
#[derive(Debug, Default)]
pub(crate) struct Session {
    state: SessionState,
    session_id: Option<String>,
    transport_id: Option<String>,
    media_session_id: Option<MediaSessionId>,
    /// Set once the session has been torn down.
    closed: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `to`; returns `true` when the state actually changed.
    pub fn transition(&mut self, to: SessionState) -> bool {
        if self.state == to {
            return false;
        }
        self.state = to;
        true
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn transport_id(&self) -> Option<&str> {
        self.transport_id.as_deref()
    }

    pub fn media_session_id(&self) -> Option<MediaSessionId> {
        self.media_session_id
    }

    /// Capture ids from the first running application.
    pub fn apply_application(&mut self, app: &Application) {
        self.session_id = Some(app.session_id.clone());
        self.transport_id = Some(app.transport_or_session_id().to_string());
    }

    pub fn set_media_session_id(&mut self, id: MediaSessionId) {
        self.media_session_id = Some(id);
    }

    pub fn has_application(&self) -> bool {
        self.session_id.is_some() && self.transport_id.is_some()
    }

    /// Mark closed; returns `true` only on the first call.
    pub fn mark_closed(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            connected: self.state.is_connected(),
            session_id: self.session_id.clone(),
            transport_id: self.transport_id.clone(),
            media_session_id: self.media_session_id,
        }
    }
}
