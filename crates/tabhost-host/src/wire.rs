//! Newline-delimited JSON transport for the host side of the boundary.
//!
//! ```text
//! -> {"frame":"request","id":1,"version":1,"request":{"method":"listTabs"}}
//! <- {"frame":"event","event":{"type":"tab-created",...}}
//! <- {"frame":"response","id":1,"result":{"Ok":{"kind":"tabs","tabs":[]}}}
//! ```
//!
//! Requests are executed in the order they arrive. Events are written as
//! they are published, interleaved with responses.

use tabhost_common::{Boundary, HostError, HostEvent, WireMessage, PROTOCOL_VERSION};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Serve `host` over a line-oriented byte stream until `reader` hits EOF.
pub async fn serve_lines<R, W, B>(reader: R, writer: W, host: B) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    B: Boundary,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(write_lines(writer, out_rx));
    let forwarder = tokio::spawn(forward_events(host.subscribe(), out_tx.clone()));

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match WireMessage::from_line(&line) {
            Ok(WireMessage::Request {
                id,
                version,
                request,
            }) => {
                let result = if version != PROTOCOL_VERSION {
                    warn!(id, version, "request with unsupported protocol version");
                    Err(HostError::Protocol(format!(
                        "unsupported protocol version {version}, expected {PROTOCOL_VERSION}"
                    )))
                } else {
                    host.call(request).await
                };
                WireMessage::Response { id, result }
            }
            Ok(other) => {
                warn!(?other, "ignoring non-request frame");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "undecodable line");
                WireMessage::Response { id: 0, result: Err(e) }
            }
        };
        match reply.to_line() {
            Ok(text) => {
                if out_tx.send(text).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "could not encode response"),
        }
    }

    info!("boundary input closed");
    forwarder.abort();
    drop(out_tx);
    match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(e)),
    }
}

async fn forward_events(
    mut events: broadcast::Receiver<HostEvent>,
    out: mpsc::UnboundedSender<String>,
) {
    loop {
        let frame = match events.recv().await {
            Ok(event) => WireMessage::Event { event },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event forwarder lagged");
                WireMessage::Lagged { skipped }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match frame.to_line() {
            Ok(text) => {
                if out.send(text).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "could not encode event"),
        }
    }
    debug!("event forwarder stopped");
}

async fn write_lines<W>(
    mut writer: W,
    mut lines: mpsc::UnboundedReceiver<String>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
