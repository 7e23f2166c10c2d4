//! JSON payloads carried inside control envelopes.
//!
//! Outbound requests are typed; inbound messages are first parsed to a
//! `serde_json::Value` so unknown message shapes can be ignored, then
//! narrowed to the typed status structs below.

use cast_core::{MediaSessionId, Result, StreamType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MSG_PING: &str = "PING";
pub const MSG_PONG: &str = "PONG";
pub const MSG_RECEIVER_STATUS: &str = "RECEIVER_STATUS";
pub const MSG_MEDIA_STATUS: &str = "MEDIA_STATUS";

/// Request identifier carried by messages that expect a correlated reply.
pub type RequestId = u32;

/// Connection namespace vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ConnectionMessage {
    Connect,
    Close,
}

/// Heartbeat namespace vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum HeartbeatMessage {
    Ping,
    Pong,
}

/// Receiver namespace requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiverRequest {
    Launch {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "appId")]
        app_id: String,
    },
}

/// Content descriptor inside a LOAD request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInformation {
    #[serde(rename = "contentId")]
    pub content_id: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "streamType")]
    pub stream_type: StreamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Media namespace requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaRequest {
    Load {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "sessionId")]
        session_id: String,
        media: MediaInformation,
        autoplay: bool,
    },
    Play {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "mediaSessionId")]
        media_session_id: MediaSessionId,
    },
    Pause {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "mediaSessionId")]
        media_session_id: MediaSessionId,
    },
    Stop {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "mediaSessionId")]
        media_session_id: MediaSessionId,
    },
    Seek {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "mediaSessionId")]
        media_session_id: MediaSessionId,
        /// Absolute position in seconds.
        #[serde(rename = "currentTime")]
        current_time: f64,
    },
    GetStatus {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "mediaSessionId", skip_serializing_if = "Option::is_none")]
        media_session_id: Option<MediaSessionId>,
    },
}

/// A running receiver application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    #[serde(rename = "appId", default)]
    pub app_id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "transportId", default)]
    pub transport_id: Option<String>,
    #[serde(rename = "statusText", default)]
    pub status_text: Option<String>,
}

impl Application {
    /// Destination for app-level messages; receivers that omit a transport id
    /// accept the session id instead.
    pub fn transport_or_session_id(&self) -> &str {
        self.transport_id.as_deref().unwrap_or(&self.session_id)
    }
}

/// `status` object of a RECEIVER_STATUS message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiverStatus {
    #[serde(default)]
    pub applications: Option<Vec<Application>>,
}

impl ReceiverStatus {
    /// First listed running application.
    pub fn first_application(&self) -> Option<&Application> {
        self.applications.as_ref().and_then(|apps| apps.first())
    }
}

/// One entry of a MEDIA_STATUS message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaStatusEntry {
    #[serde(rename = "mediaSessionId")]
    pub media_session_id: Option<MediaSessionId>,
    #[serde(rename = "playerState", default)]
    pub player_state: Option<String>,
    #[serde(rename = "currentTime", default)]
    pub current_time: Option<f64>,
}

/// Serialize a payload for an envelope.
pub fn to_payload<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// The `type` discriminator of an inbound message.
pub fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}

/// The `requestId` of an inbound message, when the receiver echoed one.
pub fn request_id(message: &Value) -> Option<RequestId> {
    message
        .get("requestId")
        .and_then(Value::as_u64)
        .and_then(|id| RequestId::try_from(id).ok())
}

/// Extract the receiver status from a RECEIVER_STATUS message.
pub fn receiver_status(message: &Value) -> Option<ReceiverStatus> {
    if message_type(message) != Some(MSG_RECEIVER_STATUS) {
        return None;
    }
    let status = message.get("status")?;
    serde_json::from_value(status.clone()).ok()
}

/// Extract the media status entries from a MEDIA_STATUS message.
pub fn media_status(message: &Value) -> Option<Vec<MediaStatusEntry>> {
    if message_type(message) != Some(MSG_MEDIA_STATUS) {
        return None;
    }
    match message.get("status") {
        Some(status) => serde_json::from_value(status.clone()).ok(),
        None => Some(Vec::new()),
    }
}
