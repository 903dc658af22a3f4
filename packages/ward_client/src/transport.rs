//! Realtime Transport
//!
//! One persistent WebSocket carries all protocol traffic; each text frame
//! holds exactly one envelope. The reader half is driven from the event
//! loop; the writer task here drains the dispatcher's outbound channel.
//! Reconnection policy is not modeled here; the process exits when the
//! connection drops.

use anyhow::{Context, Result};
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tracing::{debug, warn};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsWriter = SplitSink<WsStream, tungstenite::Message>;

pub async fn connect(url: &str) -> Result<WsStream> {
    let (stream, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {}", url))?;
    Ok(stream)
}

/// Drain encoded outbound frames into the socket. A send failure is logged
/// and stops the writer; the optimistic echo already applied client-side
/// stays (documented divergence, not silent success).
pub async fn run_writer(mut sink: WsWriter, mut outbound: mpsc::Receiver<String>) {
    while let Some(text) = outbound.recv().await {
        if let Err(e) = sink.send(tungstenite::Message::Text(text.into())).await {
            warn!("transport send failed: {}", e);
            break;
        }
    }
    debug!("outbound channel closed, writer stopping");
}
