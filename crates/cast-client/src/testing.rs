//! In-memory receiver used by unit tests.

use cast_proto::{ControlEnvelope, FrameDecoder, Namespace, PLATFORM_SENDER_ID};
use serde_json::{json, Value};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

/// Receiver end of a duplex pipe, speaking the framed protocol.
pub(crate) struct MockReceiver {
    pub stream: DuplexStream,
    decoder: FrameDecoder,
}

impl MockReceiver {
    /// Returns the sender's end of the pipe and the receiver.
    pub fn pair() -> (DuplexStream, Self) {
        let (local, remote) = duplex(64 * 1024);
        (
            local,
            Self {
                stream: remote,
                decoder: FrameDecoder::new(),
            },
        )
    }

    pub async fn recv(&mut self) -> ControlEnvelope {
        loop {
            if let Some(envelope) = self.decoder.next_envelope().unwrap() {
                return envelope;
            }
            let mut buf = [0u8; 1024];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "sender closed the stream");
            self.decoder.extend(&buf[..n]);
        }
    }

    pub async fn recv_json(&mut self) -> (ControlEnvelope, Value) {
        let envelope = self.recv().await;
        let value = serde_json::from_str(&envelope.payload).unwrap();
        (envelope, value)
    }

    /// Consume the CONNECT and PING every session opens with.
    pub async fn expect_handshake(&mut self) {
        let (env, msg) = self.recv_json().await;
        assert_eq!(env.namespace_kind(), Some(Namespace::Connection));
        assert_eq!(msg["type"], "CONNECT");
        let (env, msg) = self.recv_json().await;
        assert_eq!(env.namespace_kind(), Some(Namespace::Heartbeat));
        assert_eq!(msg["type"], "PING");
    }

    pub async fn send(&mut self, source: &str, namespace: Namespace, payload: Value) {
        let envelope =
            ControlEnvelope::new(source, PLATFORM_SENDER_ID, namespace, payload.to_string());
        self.stream.write_all(&envelope.encode()).await.unwrap();
    }

    /// Answer a LAUNCH with a running default media receiver.
    pub async fn launch_reply(&mut self, request_id: u64) {
        self.send("receiver-0", Namespace::Receiver, receiver_status(request_id))
            .await;
    }
}

pub(crate) fn receiver_status(request_id: u64) -> Value {
    json!({
        "type": "RECEIVER_STATUS",
        "requestId": request_id,
        "status": {"applications": [
            {"appId": "CC1AD845", "sessionId": "sess-1", "transportId": "web-1"}
        ]}
    })
}

/// Stream whose peer vanished without a FIN: reads never complete and
/// every write fails with `BrokenPipe`.
pub(crate) struct BrokenPipeStream;

impl AsyncRead for BrokenPipeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for BrokenPipeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
