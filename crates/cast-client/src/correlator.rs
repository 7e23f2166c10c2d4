//! Matching inbound status messages to outstanding requests.
//!
//! Receivers do not reliably echo `requestId`, so the default strategy
//! resolves a pending wait with the next reply of the expected kind. The
//! stricter strategy additionally requires the echoed id to match.

use cast_proto::RequestId;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Kinds of reply a request can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// RECEIVER_STATUS naming a running application.
    ReceiverStatus,
    /// Any MEDIA_STATUS.
    MediaStatus,
}

/// One inbound reply offered to pending waits.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub request_id: Option<RequestId>,
    pub message: Value,
}

/// Decides whether a reply satisfies a pending wait.
pub trait ReplyCorrelator: Send + Sync + fmt::Debug {
    fn matches(&self, kind: ReplyKind, request_id: RequestId, reply: &Reply) -> bool;
}

/// The next reply of the awaited kind wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct NextEventCorrelator;

impl ReplyCorrelator for NextEventCorrelator {
    fn matches(&self, kind: ReplyKind, _request_id: RequestId, reply: &Reply) -> bool {
        reply.kind == kind
    }
}

/// Only a reply echoing the request id wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestIdCorrelator;

impl ReplyCorrelator for RequestIdCorrelator {
    fn matches(&self, kind: ReplyKind, request_id: RequestId, reply: &Reply) -> bool {
        reply.kind == kind && reply.request_id == Some(request_id)
    }
}

/// Correlation strategy selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelationStrategy {
    #[default]
    NextEvent,
    RequestId,
}

impl CorrelationStrategy {
    pub fn correlator(&self) -> Arc<dyn ReplyCorrelator> {
        match self {
            CorrelationStrategy::NextEvent => Arc::new(NextEventCorrelator),
            CorrelationStrategy::RequestId => Arc::new(RequestIdCorrelator),
        }
    }
}

struct PendingReply {
    kind: ReplyKind,
    request_id: RequestId,
    tx: oneshot::Sender<Reply>,
}

/// Outstanding waits, resolved in the order they were armed.
pub(crate) struct PendingReplies {
    correlator: Arc<dyn ReplyCorrelator>,
    pending: Vec<PendingReply>,
}

impl PendingReplies {
    pub fn new(correlator: Arc<dyn ReplyCorrelator>) -> Self {
        Self {
            correlator,
            pending: Vec::new(),
        }
    }

    /// Register a wait. Must happen before the request is written.
    pub fn arm(&mut self, kind: ReplyKind, request_id: RequestId) -> oneshot::Receiver<Reply> {
        // waits abandoned by a timeout leave closed senders behind
        self.pending.retain(|p| !p.tx.is_closed());
        let (tx, rx) = oneshot::channel();
        self.pending.push(PendingReply {
            kind,
            request_id,
            tx,
        });
        rx
    }

    /// Hand `reply` to every wait it satisfies; returns how many were resolved.
    pub fn resolve(&mut self, reply: &Reply) -> usize {
        let mut resolved = 0;
        let mut remaining = Vec::with_capacity(self.pending.len());
        for pending in self.pending.drain(..) {
            if self
                .correlator
                .matches(pending.kind, pending.request_id, reply)
            {
                if pending.tx.send(reply.clone()).is_ok() {
                    resolved += 1;
                }
            } else {
                remaining.push(pending);
            }
        }
        self.pending = remaining;
        resolved
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
