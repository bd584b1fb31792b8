//! Connection plumbing
//!
//! The socket itself is owned by the application. This module defines the
//! interface the layer needs from it: synchronous acceptance of outbound
//! actions ([`AmiConnection`]) and a stream of inbound [`ConnectionEvent`]s.
//! The reader/writer tasks adapt any `AsyncRead`/`AsyncWrite` pair to
//! that interface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::FrameDecoder;
use crate::error::{AmiError, AmiResult};
use crate::frame::{Action, Frame};

/// Outbound half of an AMI connection
pub trait AmiConnection: Send + Sync {
    /// Accept `action` for transmission without waiting for the network
    fn send(&self, action: &Action) -> AmiResult<()>;
}

/// Inbound events produced by a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A complete packet arrived
    Frame(Frame),
    /// A recoverable read or decode error
    Error { error: String },
    /// The connection is gone, nothing more will arrive
    Closed { reason: String },
}

/// [`AmiConnection`] that queues actions on an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    tx: mpsc::UnboundedSender<Action>,
    closed: Arc<AtomicBool>,
}

impl ChannelConnection {
    /// Connection plus the receiving end of its action queue
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (connection, rx)
    }

    /// Refuse all further actions
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.tx.is_closed()
    }
}

impl AmiConnection for ChannelConnection {
    fn send(&self, action: &Action) -> AmiResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(AmiError::Transmission("connection closed".into()));
        }
        self.tx
            .send(action.clone())
            .map_err(|_| AmiError::Transmission("action writer has stopped".into()))
    }
}

/// Decode frames from `reader` and feed them to `events`
///
/// Ends with a `Closed` event on EOF or a read error.
pub fn spawn_frame_reader<R>(mut reader: R, events: mpsc::Sender<ConnectionEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 4096];

        let reason = loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break "connection closed by peer".to_string(),
                Ok(n) => n,
                Err(e) => {
                    error!("Error reading from AMI connection: {}", e);
                    break format!("read error: {}", e);
                }
            };
            decoder.extend(&buf[..n]);

            loop {
                let event = match decoder.next_frame() {
                    Ok(Some(frame)) => ConnectionEvent::Frame(frame),
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Error decoding AMI data: {}", e);
                        ConnectionEvent::Error { error: e.to_string() }
                    }
                };
                if events.send(event).await.is_err() {
                    debug!("Dispatcher gone, reader exiting");
                    return;
                }
            }
        };

        info!("AMI reader terminated: {}", reason);
        let _ = events.send(ConnectionEvent::Closed { reason }).await;
    })
}

/// Write queued actions to `writer` in order
///
/// Stops when the queue closes or a write fails.
pub fn spawn_action_writer<W>(mut writer: W, mut actions: mpsc::UnboundedReceiver<Action>) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(action) = actions.recv().await {
            let wire = action.to_wire();
            debug!("Writing {} ({} bytes)", action.name(), wire.len());
            if let Err(e) = writer.write_all(wire.as_bytes()).await {
                error!("Error writing {} to AMI connection: {}", action.name(), e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("Error flushing AMI connection: {}", e);
                break;
            }
        }
        // Dropping the receiver makes later sends fail as transmission errors
        actions.close();
        info!("AMI writer terminated");
    })
}
