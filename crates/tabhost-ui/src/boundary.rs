//! UI end of a newline-delimited JSON boundary.
//!
//! Requests get a fresh id and wait on a oneshot until the reader task
//! sees the matching response. Event frames are rebroadcast to every
//! subscriber, and lag frames become gap notices. When the host side
//! closes, every waiting call fails with [`HostError::Boundary`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tabhost_common::{Boundary, HostError, HostEvent, HostRequest, HostResponse, WireMessage};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

type Reply = oneshot::Sender<Result<HostResponse, HostError>>;
type Pending = Arc<Mutex<HashMap<u64, Reply>>>;

pub struct LineBoundary {
    outgoing: mpsc::UnboundedSender<String>,
    pending: Pending,
    next_id: AtomicU64,
    events: broadcast::Sender<HostEvent>,
    gaps: broadcast::Sender<u64>,
    closed: Arc<AtomicBool>,
}

impl LineBoundary {
    /// Start the reader and writer tasks for one connection.
    pub fn connect<R, W>(reader: R, writer: W, event_capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (gaps, _) = broadcast::channel(4);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_lines(writer, outgoing_rx));
        tokio::spawn(read_lines(
            reader,
            Arc::clone(&pending),
            events.clone(),
            gaps.clone(),
            Arc::clone(&closed),
        ));

        Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            events,
            gaps,
            closed,
        }
    }

    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

#[async_trait]
impl Boundary for LineBoundary {
    async fn call(&self, request: HostRequest) -> Result<HostResponse, HostError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let method = request.method();
        let line = WireMessage::request(id, request).to_line()?;

        let (reply, response) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| HostError::Boundary("pending call table poisoned".into()))?
            .insert(id, reply);

        if self.closed.load(Ordering::Acquire) || self.outgoing.send(line).is_err() {
            self.forget(id);
            return Err(HostError::Boundary("connection to host is closed".into()));
        }
        debug!(id, method, "request sent");

        response
            .await
            .map_err(|_| HostError::Boundary("host closed the connection".into()))?
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    fn subscribe_gaps(&self) -> Option<broadcast::Receiver<u64>> {
        Some(self.gaps.subscribe())
    }
}

async fn write_lines<W>(mut writer: W, mut lines: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            warn!(error = %e, "write to host failed");
            break;
        }
    }
}

async fn read_lines<R>(
    reader: R,
    pending: Pending,
    events: broadcast::Sender<HostEvent>,
    gaps: broadcast::Sender<u64>,
    closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "read from host failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match WireMessage::from_line(&line) {
            Ok(WireMessage::Response { id, result }) => {
                let reply = pending.lock().ok().and_then(|mut p| p.remove(&id));
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => warn!(id, ?result, "response for unknown call"),
                }
            }
            Ok(WireMessage::Event { event }) => {
                let _ = events.send(event);
            }
            Ok(WireMessage::Lagged { skipped }) => {
                warn!(skipped, "host dropped events before sending them");
                let _ = gaps.send(skipped);
            }
            Ok(WireMessage::Request { id, .. }) => {
                warn!(id, "host sent a request frame; ignored");
            }
            Err(e) => warn!(error = %e, "undecodable line from host"),
        }
    }

    closed.store(true, Ordering::Release);
    // Dropping the senders wakes every waiting call with an error.
    if let Ok(mut pending) = pending.lock() {
        pending.clear();
    }
    debug!("host connection closed");
}
