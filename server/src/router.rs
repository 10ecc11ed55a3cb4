//! Fanout router: interprets client frames, mutates the session registry and
//! decides who hears about each change.
//!
//! Every mutation and the fanout it causes happen inside a single write-lock
//! critical section. Outbound writes are non-blocking queue pushes, so holding
//! the lock across them is cheap, and it gives each recipient a delivery order
//! that matches the order in which the registry changed.

use crate::connection::ClientConnection;
use crate::session_registry::{EvictedSession, OutboundSender, Session, SessionRegistry};
use log::{debug, error, info, warn};
use shared::{
    decode_client_message, encode_server_message, ClientMessage, JoinRequest, PlayerState,
    ServerMessage,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

/// Routes client messages through the shared session registry
pub struct Router {
    registry: Arc<RwLock<SessionRegistry>>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(RwLock::new(SessionRegistry::new())))
    }

    pub fn with_registry(registry: Arc<RwLock<SessionRegistry>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<RwLock<SessionRegistry>> {
        &self.registry
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Handles one text frame received on `connection`
    ///
    /// Frames that fail to decode are logged and dropped; the connection
    /// stays open and nothing is sent back.
    pub async fn handle_text(&self, connection: &mut ClientConnection, text: &str) {
        match decode_client_message(text) {
            Ok(ClientMessage::Join(request)) => self.join(connection, request).await,
            Ok(ClientMessage::Update(state)) => {
                self.update(connection, state).await;
            }
            Err(e) => {
                warn!(
                    "Discarding malformed frame from connection {}: {}",
                    connection.conn_id, e
                );
            }
        }
    }

    /// Registers the player announced by `request`
    ///
    /// The joiner receives `init` with every other live session; all others
    /// receive `player_joined`. If another connection held the same ID it is
    /// replaced and sent a Close frame.
    pub async fn join(&self, connection: &mut ClientConnection, request: JoinRequest) {
        let state = request.initial_state();
        let JoinRequest { id, name, .. } = request;

        let mut registry = self.registry.write().await;

        // Re-joining under a different ID retires the old one first
        if let Some(previous) = connection.session_id.take() {
            if previous != id
                && registry
                    .remove_owned(&previous, connection.conn_id)
                    .is_some()
            {
                info!("Player {} re-joined as {}", previous, id);
                broadcast(&registry, &ServerMessage::PlayerLeft { id: previous }, None);
            }
        }

        let session = Session::new(
            id.clone(),
            name.clone(),
            state,
            connection.conn_id,
            connection.sender.clone(),
        );
        let view = session.view();

        if let Some(replaced) = registry.put(session) {
            if replaced.conn_id != connection.conn_id {
                warn!(
                    "Player {} taken over by connection {}, closing connection {}",
                    id, connection.conn_id, replaced.conn_id
                );
                if let Err(e) = replaced.sender.try_send(Message::Close(None)) {
                    warn!(
                        "Could not close superseded connection {}: {}",
                        replaced.conn_id, e
                    );
                }
            }
        }
        connection.session_id = Some(id.clone());

        let init = ServerMessage::Init {
            players: registry.snapshot_all_except(&id),
        };
        send_to(&connection.sender, &init);

        let joined = ServerMessage::PlayerJoined { player: view };
        let recipients = broadcast(&registry, &joined, Some(&id));
        info!(
            "Player joined: {} ({}), announced to {} peers",
            name, id, recipients
        );
    }

    /// Applies a state update from the player joined on `connection`
    ///
    /// Returns false, without touching any state, when the connection has
    /// not joined or no longer owns its ID.
    pub async fn update(&self, connection: &ClientConnection, state: PlayerState) -> bool {
        let Some(id) = connection.session_id.as_deref() else {
            debug!(
                "Ignoring update before join on connection {}",
                connection.conn_id
            );
            return false;
        };

        let mut registry = self.registry.write().await;
        let delta = match registry.apply_update(id, connection.conn_id, state) {
            Some(session) => session.delta(),
            None => {
                debug!("Ignoring update for unregistered player {}", id);
                return false;
            }
        };

        let update = ServerMessage::PlayerUpdate { player: delta };
        let recipients = broadcast(&registry, &update, Some(id));
        debug!("Player {} update fanned out to {} peers", id, recipients);
        true
    }

    /// Removes the player joined on `connection` and tells everyone else
    ///
    /// A connection that never joined, or whose session was already evicted
    /// or taken over, produces no broadcast.
    pub async fn disconnect(&self, connection: &mut ClientConnection) -> bool {
        let Some(id) = connection.session_id.take() else {
            return false;
        };

        let mut registry = self.registry.write().await;
        match registry.remove_owned(&id, connection.conn_id) {
            Some(session) => {
                info!("Player disconnected: {} ({})", session.name, id);
                broadcast(&registry, &ServerMessage::PlayerLeft { id }, None);
                true
            }
            None => false,
        }
    }

    /// Evicts sessions silent for longer than `threshold` and announces
    /// each departure once
    pub async fn evict_stale(&self, now: Instant, threshold: Duration) -> Vec<EvictedSession> {
        let mut registry = self.registry.write().await;
        let evicted = registry.evict_stale(now, threshold);

        for session in &evicted {
            info!("Removed stale player: {} ({})", session.name, session.id);
            broadcast(
                &registry,
                &ServerMessage::PlayerLeft {
                    id: session.id.clone(),
                },
                None,
            );
        }

        evicted
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_frame(message: &ServerMessage) -> Option<Message> {
    match encode_server_message(message) {
        Ok(json) => Some(Message::text(json)),
        Err(e) => {
            error!("Failed to encode outbound message: {}", e);
            None
        }
    }
}

/// Queues `frame` on one outbound channel without waiting
///
/// A full queue drops the frame for this recipient only.
fn push_frame(label: &str, sender: &OutboundSender, frame: Message) -> bool {
    match sender.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Outbound queue for {} is full, dropping frame", label);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Sends `message` to a single connection
pub fn send_to(sender: &OutboundSender, message: &ServerMessage) -> bool {
    match encode_frame(message) {
        Some(frame) => push_frame("joiner", sender, frame),
        None => false,
    }
}

/// Serializes `message` once and queues it for every session except
/// `exclude`
///
/// Closed channels are skipped and a slow recipient never holds up the
/// others. Returns the number of sessions the frame was queued for.
pub fn broadcast(
    registry: &SessionRegistry,
    message: &ServerMessage,
    exclude: Option<&str>,
) -> usize {
    let Some(frame) = encode_frame(message) else {
        return 0;
    };

    let mut delivered = 0;
    for (id, sender) in registry.senders_except(exclude) {
        if sender.is_closed() {
            continue;
        }
        if push_frame(id, sender, frame.clone()) {
            delivered += 1;
        }
    }
    delivered
}
