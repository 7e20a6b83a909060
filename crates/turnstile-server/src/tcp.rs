//! JSON-lines TCP transport.
//!
//! One request or event per line. Inbound lines decode to
//! [`Request`](turnstile_proto::Request) and are forwarded to the coordinator
//! loop; outbound messages are drained from the connection's transport queue
//! by a dedicated writer task, so ordering per connection is preserved and a
//! slow socket never blocks the coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, tcp::OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use turnstile_core::CoordinatorEvent;
use turnstile_proto::{ConnectionId, Request, WireMessage};

use crate::transport::ChannelTransport;

/// Connection ids are process-unique and never reused.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Accept connections until the listener fails.
pub async fn serve(
    listener: TcpListener,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    transport: Arc<ChannelTransport>,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
        info!(conn_id, %peer, "connection accepted");

        let (reader, writer) = stream.into_split();
        let outbound = transport.register(conn_id);

        tokio::spawn(write_loop(conn_id, writer, outbound));
        tokio::spawn(read_loop(conn_id, reader, events.clone(), Arc::clone(&transport)));
    }
}

async fn write_loop(
    conn_id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<WireMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let mut line = match serde_json::to_vec(&message) {
            Ok(line) => line,
            Err(err) => {
                warn!(conn_id, error = %err, "outbound encode failed");
                continue;
            },
        };
        line.push(b'\n');
        if let Err(err) = writer.write_all(&line).await {
            debug!(conn_id, error = %err, "write failed, dropping outbound queue");
            break;
        }
    }
}

async fn read_loop(
    conn_id: ConnectionId,
    reader: tokio::net::tcp::OwnedReadHalf,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    transport: Arc<ChannelTransport>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Request>(line) {
                    Ok(request) => {
                        if events.send(CoordinatorEvent::Request { conn_id, request }).is_err() {
                            break;
                        }
                    },
                    // Unknown or malformed events are ignored, not fatal
                    Err(err) => warn!(conn_id, error = %err, "undecodable request line"),
                }
            },
            Ok(None) => {
                debug!(conn_id, "connection closed by peer");
                break;
            },
            Err(err) => {
                debug!(conn_id, error = %err, "read failed");
                break;
            },
        }
    }

    transport.unregister(conn_id);
    let _ = events.send(CoordinatorEvent::Disconnected { conn_id });
}
