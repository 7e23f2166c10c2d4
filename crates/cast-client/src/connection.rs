//! Transport tasks for one control connection.
//!
//! A writer task owns the write half and drains an unbounded queue of
//! encoded frames. A reader task owns the read half, reassembles frames and
//! hands decoded envelopes to an [`InboundHandler`].

use async_trait::async_trait;
use cast_core::{ProtocolError, Result};
use cast_proto::{ControlEnvelope, FrameDecoder};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const READ_BUFFER_LEN: usize = 8192;

enum Outbound {
    Frame(Vec<u8>),
    /// Flush, shut down the write half, then acknowledge.
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle for queueing frames to the writer task.
#[derive(Clone)]
pub(crate) struct FrameSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl FrameSender {
    /// Queue an envelope. Fails once the writer has stopped.
    pub fn send(&self, envelope: &ControlEnvelope) -> Result<()> {
        trace!(
            namespace = %envelope.namespace,
            destination = %envelope.destination_id,
            "queue frame"
        );
        self.tx
            .send(Outbound::Frame(envelope.encode()))
            .map_err(|_| ProtocolError::NotConnected.into())
    }

    /// Flush queued frames and shut the write half down.
    ///
    /// Returns immediately if the writer already stopped.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Outbound::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Receives decoded inbound traffic.
#[async_trait]
pub(crate) trait InboundHandler: Send + Sync {
    async fn on_envelope(&self, envelope: ControlEnvelope);

    /// The peer closed the stream (`None`) or reading failed.
    async fn on_transport_closed(&self, error: Option<String>);
}

/// Spawn the writer task.
///
/// The task resolves to the write error that stopped it, or `None` after a
/// requested shutdown or once every [`FrameSender`] is gone.
pub(crate) fn spawn_writer<W>(writer: W) -> (FrameSender, JoinHandle<Option<String>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(write_loop(writer, rx));
    (FrameSender { tx }, handle)
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outbound>) -> Option<String>
where
    W: AsyncWrite + Unpin,
{
    let mut failure = None;
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame(bytes) => {
                let written = async {
                    writer.write_all(&bytes).await?;
                    writer.flush().await
                };
                if let Err(e) = written.await {
                    warn!("Control write failed: {}", e);
                    failure = Some(e.to_string());
                    break;
                }
            }
            Outbound::Shutdown(done) => {
                let _ = writer.flush().await;
                if let Err(e) = writer.shutdown().await {
                    debug!("Write half shutdown: {}", e);
                }
                let _ = done.send(());
                break;
            }
        }
    }
    trace!("Writer task finished");
    failure
}

/// Spawn the reader task.
pub(crate) fn spawn_reader<R>(
    reader: R,
    handler: Arc<dyn InboundHandler>,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(read_loop(reader, handler, shutdown_rx))
}

async fn read_loop<R>(
    mut reader: R,
    handler: Arc<dyn InboundHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_LEN];

    loop {
        tokio::select! {
            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        handler.on_transport_closed(None).await;
                        break;
                    }
                    Ok(n) => {
                        decoder.extend(&buf[..n]);
                        loop {
                            match decoder.next_envelope() {
                                Ok(Some(envelope)) => handler.on_envelope(envelope).await,
                                Ok(None) => break,
                                Err(e) => debug!("Dropping malformed frame: {}", e),
                            }
                        }
                    }
                    Err(e) => {
                        handler.on_transport_closed(Some(e.to_string())).await;
                        break;
                    }
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    trace!("Reader task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cast_proto::Namespace;
    use crate::testing::BrokenPipeStream;
    use std::sync::Mutex;
    use tokio::io::duplex;

    #[derive(Default)]
    struct Recorder {
        envelopes: Mutex<Vec<ControlEnvelope>>,
        closed: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl InboundHandler for Recorder {
        async fn on_envelope(&self, envelope: ControlEnvelope) {
            self.envelopes.lock().unwrap().push(envelope);
        }

        async fn on_transport_closed(&self, error: Option<String>) {
            self.closed.lock().unwrap().push(error);
        }
    }

    fn envelope(payload: &str) -> ControlEnvelope {
        ControlEnvelope::new("receiver-0", "sender-0", Namespace::Heartbeat, payload)
    }

    mod writer {
        use super::*;

        #[tokio::test]
        async fn frames_are_written_in_order() {
            let (local, mut remote) = duplex(4096);
            let (sender, _handle) = spawn_writer(local);

            sender.send(&envelope("a")).unwrap();
            sender.send(&envelope("b")).unwrap();
            sender.shutdown().await;

            let mut bytes = Vec::new();
            remote.read_to_end(&mut bytes).await.unwrap();

            let mut expected = envelope("a").encode();
            expected.extend(envelope("b").encode());
            assert_eq!(bytes, expected);
        }

        #[tokio::test]
        async fn send_after_shutdown_fails() {
            let (local, _remote) = duplex(4096);
            let (sender, handle) = spawn_writer(local);
            sender.shutdown().await;
            assert_eq!(handle.await.unwrap(), None);

            assert!(sender.send(&envelope("late")).is_err());
            // second shutdown returns immediately
            sender.shutdown().await;
        }

        #[tokio::test]
        async fn write_failure_is_returned() {
            let (sender, handle) = spawn_writer(BrokenPipeStream);
            sender.send(&envelope("a")).unwrap();

            let failure = handle.await.unwrap();
            assert!(failure.unwrap().contains("peer gone"));
            assert!(sender.send(&envelope("b")).is_err());
        }
    }

    mod reader {
        use super::*;

        #[tokio::test]
        async fn split_writes_reassemble() {
            let (local, mut remote) = duplex(4096);
            let recorder = Arc::new(Recorder::default());
            let (_tx, rx) = watch::channel(false);
            let handle = spawn_reader(local, recorder.clone(), rx);

            let mut bytes = envelope("first").encode();
            bytes.extend(envelope("second").encode());
            let (a, b) = bytes.split_at(7);
            remote.write_all(a).await.unwrap();
            tokio::task::yield_now().await;
            remote.write_all(b).await.unwrap();
            drop(remote);

            handle.await.unwrap();
            let payloads: Vec<_> = recorder
                .envelopes
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.payload.clone())
                .collect();
            assert_eq!(payloads, vec!["first", "second"]);
            assert_eq!(*recorder.closed.lock().unwrap(), vec![None]);
        }

        #[tokio::test]
        async fn malformed_frame_is_skipped() {
            let (local, mut remote) = duplex(4096);
            let recorder = Arc::new(Recorder::default());
            let (_tx, rx) = watch::channel(false);
            let handle = spawn_reader(local, recorder.clone(), rx);

            // length 2, body is a string field with an overrunning length
            remote.write_all(&[0, 0, 0, 2, 0x12, 0x7f]).await.unwrap();
            remote.write_all(&envelope("ok").encode()).await.unwrap();
            drop(remote);

            handle.await.unwrap();
            let envelopes = recorder.envelopes.lock().unwrap();
            assert_eq!(envelopes.len(), 1);
            assert_eq!(envelopes[0].payload, "ok");
        }

        #[tokio::test]
        async fn shutdown_signal_stops_reader_without_close_callback() {
            let (local, _remote) = duplex(4096);
            let recorder = Arc::new(Recorder::default());
            let (tx, rx) = watch::channel(false);
            let handle = spawn_reader(local, recorder.clone(), rx);

            tx.send(true).unwrap();
            handle.await.unwrap();
            assert!(recorder.closed.lock().unwrap().is_empty());
        }
    }
}
