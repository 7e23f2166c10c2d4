//! Client events and handlers.

use crate::session::{SessionHandle, SessionState};
use async_trait::async_trait;
use cast_core::DeviceDescriptor;
use cast_proto::ReceiverStatus;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Events emitted by the client and the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Device discovered or re-announced.
    DeviceFound(DeviceDescriptor),
    /// Session state changed.
    StateChanged {
        session: SessionHandle,
        state: SessionState,
    },
    /// Receiver reported a running application.
    ReceiverStatus {
        session: SessionHandle,
        status: ReceiverStatus,
    },
    /// Raw MEDIA_STATUS message.
    MediaStatus {
        session: SessionHandle,
        message: Value,
    },
    /// Transport closed, locally or by the peer.
    ConnectionClosed { session: SessionHandle },
    /// Error occurred after the connection was established.
    Error {
        session: SessionHandle,
        detail: String,
    },
}

impl ClientEvent {
    /// Session the event belongs to, if any.
    pub fn session(&self) -> Option<SessionHandle> {
        match self {
            ClientEvent::DeviceFound(_) => None,
            ClientEvent::StateChanged { session, .. }
            | ClientEvent::ReceiverStatus { session, .. }
            | ClientEvent::MediaStatus { session, .. }
            | ClientEvent::ConnectionClosed { session }
            | ClientEvent::Error { session, .. } => Some(*session),
        }
    }
}

/// Handler for client events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    async fn on_event(&self, event: ClientEvent);
}

/// No-op event handler.
pub struct NoOpHandler;

#[async_trait]
impl EventHandler for NoOpHandler {
    async fn on_event(&self, _event: ClientEvent) {}
}

/// Callback-based event handler.
pub struct CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    async fn on_event(&self, event: ClientEvent) {
        (self.callback)(event);
    }
}

/// Fan-out of events to registered handlers.
///
/// Handlers run in registration order. A panicking handler is logged and
/// skipped; later handlers still see the event.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: impl EventHandler + 'static) {
        self.add_handler(Arc::new(handler));
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub async fn emit(&self, event: ClientEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for handler in handlers {
            let delivery = AssertUnwindSafe(handler.on_event(event.clone())).catch_unwind();
            if delivery.await.is_err() {
                warn!("Event handler panicked while handling {:?}", event);
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    mod client_event {
        use super::*;
        use serde_json::json;

        #[test]
        fn session_accessor() {
            let session = SessionHandle::new();
            let event = ClientEvent::MediaStatus {
                session,
                message: json!({"type": "MEDIA_STATUS"}),
            };
            assert_eq!(event.session(), Some(session));

            let closed = ClientEvent::ConnectionClosed { session };
            assert_eq!(closed.session(), Some(session));
        }

        #[test]
        fn events_are_debug() {
            let event = ClientEvent::StateChanged {
                session: SessionHandle::new(),
                state: SessionState::AppReady,
            };
            assert!(format!("{:?}", event).contains("AppReady"));
        }
    }

    mod callback_handler {
        use super::*;

        #[tokio::test]
        async fn counts_matching_events() {
            let count = Arc::new(AtomicUsize::new(0));
            let count_clone = Arc::clone(&count);

            let handler = CallbackHandler::new(move |event| {
                if let ClientEvent::ConnectionClosed { .. } = event {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }
            });

            let session = SessionHandle::new();
            handler.on_event(ClientEvent::ConnectionClosed { session }).await;
            handler
                .on_event(ClientEvent::Error {
                    session,
                    detail: "x".to_string(),
                })
                .await;

            assert_eq!(count.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn no_op_handles_events() {
            NoOpHandler
                .on_event(ClientEvent::ConnectionClosed {
                    session: SessionHandle::new(),
                })
                .await;
        }
    }

    mod event_bus {
        use super::*;

        #[tokio::test]
        async fn handlers_run_in_registration_order() {
            let bus = EventBus::new();
            let order = Arc::new(Mutex::new(Vec::new()));

            for i in 0..3 {
                let order = Arc::clone(&order);
                bus.subscribe(CallbackHandler::new(move |_| {
                    order.lock().unwrap().push(i);
                }));
            }

            bus.emit(ClientEvent::ConnectionClosed {
                session: SessionHandle::new(),
            })
            .await;
            assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        }

        #[tokio::test]
        async fn panicking_handler_does_not_stop_others() {
            let bus = EventBus::new();
            let reached = Arc::new(AtomicUsize::new(0));
            let reached_clone = Arc::clone(&reached);

            bus.subscribe(CallbackHandler::new(|_| panic!("handler failure")));
            bus.subscribe(CallbackHandler::new(move |_| {
                reached_clone.fetch_add(1, Ordering::SeqCst);
            }));

            let session = SessionHandle::new();
            bus.emit(ClientEvent::ConnectionClosed { session }).await;
            bus.emit(ClientEvent::ConnectionClosed { session }).await;
            assert_eq!(reached.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn clones_share_handlers() {
            let bus = EventBus::new();
            let clone = bus.clone();
            clone.subscribe(NoOpHandler);
            assert_eq!(bus.handler_count(), 1);
        }
    }
}
