//! # cast-client
//!
//! Sender-side client for cast receivers.
//!
//! This crate provides:
//! - A TLS control connection with framed, namespaced JSON messages
//! - Heartbeat handling and a session state machine
//! - Launching the default media receiver and media transport commands
//! - A controller facade that ties discovery to sessions
//!
//! ## Example
//!
//! ```ignore
//! use cast_client::{CastController, LoadRequest};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = CastController::default();
//!     controller.start_discovery().await?;
//!     tokio::time::sleep(Duration::from_secs(3)).await;
//!
//!     let device = controller.list_devices().await.into_iter().next().unwrap();
//!     let session = controller.connect(&device.id).await?;
//!     controller
//!         .load_media(&session, LoadRequest::new("http://host/song.mp3", "audio/mpeg"))
//!         .await?;
//!
//!     controller.disconnect(&session).await?;
//!     Ok(())
//! }
//! ```

mod builder;
mod client;
mod connection;
mod controller;
mod correlator;
mod events;
mod request_id;
mod session;
mod tls;

#[cfg(test)]
mod testing;

pub use builder::{ClientBuilder, ClientConfig};
pub use client::ProtocolClient;
pub use controller::CastController;
pub use correlator::{
    CorrelationStrategy, NextEventCorrelator, Reply, ReplyCorrelator, ReplyKind,
    RequestIdCorrelator,
};
pub use events::{CallbackHandler, ClientEvent, EventBus, EventHandler, NoOpHandler};
pub use request_id::RequestIdSequence;
pub use session::{SessionHandle, SessionSnapshot, SessionState};
pub use tls::TlsPolicy;

// Re-export commonly used types
pub use cast_core::{DeviceDescriptor, Error, LoadRequest, MediaSessionId, Result, StreamType};
pub use cast_discovery::{BrowseEvent, BrowserConfig, Discovery, ExpiryPolicy, ServiceBrowser};
pub use cast_proto::{Application, ReceiverStatus};
