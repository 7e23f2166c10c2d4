//! Media load parameters shared by the client and the controller facade.

use serde::{Deserialize, Serialize};

/// Receiver-assigned identifier for one loaded media item.
pub type MediaSessionId = i64;

/// How the receiver should treat the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamType {
    /// Finite, seekable content.
    #[default]
    Buffered,
    /// Live stream.
    Live,
    Other,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Buffered => "BUFFERED",
            StreamType::Live => "LIVE",
            StreamType::Other => "OTHER",
        }
    }
}

/// Parameters for a LOAD request.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub content_id: String,
    pub content_type: String,
    pub stream_type: StreamType,
    pub autoplay: bool,
    /// Opaque media metadata forwarded to the receiver as-is.
    pub metadata: Option<serde_json::Value>,
}

impl LoadRequest {
    /// Buffered, autoplaying load without metadata.
    pub fn new(content_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            content_type: content_type.into(),
            stream_type: StreamType::default(),
            autoplay: true,
            metadata: None,
        }
    }

    pub fn stream_type(mut self, stream_type: StreamType) -> Self {
        self.stream_type = stream_type;
        self
    }

    pub fn autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
