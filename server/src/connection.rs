//! Per-connection WebSocket handling
//!
//! Each accepted socket gets two tasks: a reader that feeds frames to the
//! router in arrival order, and a writer that is the only task allowed to
//! touch the socket's sink. Everything destined for the client goes through
//! the writer's bounded queue.

use crate::router::Router;
use crate::session_registry::{ConnectionId, OutboundSender};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Router-side state of one accepted connection
#[derive(Debug)]
pub struct ClientConnection {
    /// Server-assigned connection identifier
    pub conn_id: ConnectionId,
    /// Handle to this connection's outbound queue
    pub sender: OutboundSender,
    /// Player ID registered by this connection's most recent join
    pub session_id: Option<String>,
}

impl ClientConnection {
    pub fn new(conn_id: ConnectionId, sender: OutboundSender) -> Self {
        Self {
            conn_id,
            sender,
            session_id: None,
        }
    }
}

/// Runs one client connection from handshake to cleanup
///
/// Close frames, transport errors and end-of-stream all lead to the same
/// disconnect path; transport errors are additionally logged as faults.
pub async fn handle_connection(
    router: Arc<Router>,
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: ConnectionId,
    queue_capacity: usize,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    info!("Connection {} established from {}", conn_id, addr);

    let (mut ws_sink, mut ws_source) = ws_stream.split();
    let (sender, mut receiver) = mpsc::channel::<Message>(queue_capacity);

    let writer = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let closing = message.is_close();
            if let Err(e) = ws_sink.send(message).await {
                debug!("Write to connection {} failed: {}", conn_id, e);
                break;
            }
            if closing {
                break;
            }
        }
        if let Err(e) = ws_sink.close().await {
            debug!("Closing connection {} failed: {}", conn_id, e);
        }
    });

    let mut connection = ClientConnection::new(conn_id, sender);

    while let Some(frame) = ws_source.next().await {
        match frame {
            Ok(Message::Text(text)) => router.handle_text(&mut connection, text.as_str()).await,
            Ok(Message::Binary(_)) => {
                warn!("Discarding binary frame from connection {}", conn_id);
            }
            Ok(Message::Close(_)) => break,
            // Ping/pong replies are handled by tungstenite
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket error on connection {}: {}", conn_id, e);
                break;
            }
        }
    }

    router.disconnect(&mut connection).await;

    // Dropping the last local sender lets the writer drain and finish
    drop(connection);
    if let Err(e) = writer.await {
        error!("Writer task for connection {} panicked: {}", conn_id, e);
    }

    info!("Connection {} from {} closed", conn_id, addr);
}
