use crate::registry::{ConnectionRegistry, Departure, RegistryError};
use crate::transport::Transport;
use serde_json::Value;
use shared::models::{
    ClientMessage, ConnectionId, ServerMessage, SignalKind, NOT_IN_ROOM_MESSAGE,
    ROOM_REQUIRED_MESSAGE,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Everything that can happen on a connection, as seen by the router.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Connect,
    Message(ClientMessage),
    Malformed { raw: String, error: String },
    Disconnect { reason: String },
}

/// An inbound event the router refused. The sender has already been told
/// where that applies; these are returned for logging only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("room name is required")]
    InvalidRoomName,
    #[error("connection is not in a room")]
    NotInRoom,
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<RegistryError> for RouteError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InvalidRoomName => RouteError::InvalidRoomName,
        }
    }
}

pub struct RoomRouter<T> {
    registry: Arc<ConnectionRegistry>,
    transport: Arc<T>,
    notify_peer_left: bool,
}

impl<T: Transport> RoomRouter<T> {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        transport: Arc<T>,
        notify_peer_left: bool,
    ) -> Self {
        Self {
            registry,
            transport,
            notify_peer_left,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn notify_peer_left(&self) -> bool {
        self.notify_peer_left
    }

    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        event: Inbound,
    ) -> Result<(), RouteError> {
        match event {
            Inbound::Connect => {
                self.registry.register(connection_id).await;
                Ok(())
            }
            Inbound::Message(ClientMessage::Join(request)) => {
                let room = request.and_then(|request| request.room);
                self.join(connection_id, room.as_deref().unwrap_or_default()).await
            }
            Inbound::Message(ClientMessage::Offer(payload)) => {
                self.relay(connection_id, SignalKind::Offer, payload).await
            }
            Inbound::Message(ClientMessage::Answer(payload)) => {
                self.relay(connection_id, SignalKind::Answer, payload).await
            }
            Inbound::Message(ClientMessage::Candidate(payload)) => {
                self.relay(connection_id, SignalKind::Candidate, payload).await
            }
            Inbound::Message(ClientMessage::Ice(payload)) => {
                self.relay(connection_id, SignalKind::Ice, payload).await
            }
            Inbound::Malformed { raw, error } => {
                warn!(
                    %connection_id,
                    %error,
                    raw = %truncate(&raw, 256),
                    "dropping malformed message"
                );
                Err(RouteError::Malformed(error))
            }
            Inbound::Disconnect { reason } => {
                self.disconnect(connection_id, &reason).await;
                Ok(())
            }
        }
    }

    async fn join(&self, connection_id: ConnectionId, room: &str) -> Result<(), RouteError> {
        let joined = match self.registry.join(connection_id, room).await {
            Ok(joined) => joined,
            Err(err) => {
                warn!(%connection_id, "join without a room name");
                self.reply(connection_id, ServerMessage::error(ROOM_REQUIRED_MESSAGE));
                return Err(err.into());
            }
        };

        if let Some(previous) = joined.previous {
            info!(%connection_id, from = %previous.room, to = %joined.room, "switched rooms");
            self.announce_departure(connection_id, previous);
        }
        info!(%connection_id, room = %joined.room, members = joined.members, "joined room");
        self.reply(connection_id, ServerMessage::join_ack(joined.room, joined.members));
        Ok(())
    }

    async fn relay(
        &self,
        connection_id: ConnectionId,
        kind: SignalKind,
        payload: Value,
    ) -> Result<(), RouteError> {
        let Some(room) = self.registry.room_of(&connection_id).await else {
            warn!(%connection_id, %kind, "signal sent without joining a room");
            self.reply(connection_id, ServerMessage::error(NOT_IN_ROOM_MESSAGE));
            return Err(RouteError::NotInRoom);
        };

        let peers = self.registry.members_of(&room).await;
        let message = ServerMessage::signal(kind, payload);
        let delivered = self.broadcast(connection_id, &peers, &message);
        info!(%connection_id, %room, %kind, delivered, "relayed signal");
        Ok(())
    }

    async fn disconnect(&self, connection_id: ConnectionId, reason: &str) {
        match self.registry.unregister(&connection_id).await {
            Some(departure) => {
                info!(%connection_id, room = %departure.room, %reason, "connection left");
                self.announce_departure(connection_id, departure);
            }
            None => info!(%connection_id, %reason, "connection closed"),
        }
    }

    fn announce_departure(&self, connection_id: ConnectionId, departure: Departure) {
        if !self.notify_peer_left {
            return;
        }
        let message = ServerMessage::PeerLeft { id: connection_id };
        self.broadcast(connection_id, &departure.remaining, &message);
    }

    /// Best-effort send to every peer except `sender`. Returns how many were handed off.
    fn broadcast(
        &self,
        sender: ConnectionId,
        peers: &[ConnectionId],
        message: &ServerMessage,
    ) -> usize {
        let mut delivered = 0;
        for &peer in peers.iter().filter(|&&peer| peer != sender) {
            match self.transport.send(peer, message) {
                Ok(()) => {
                    debug!(from = %sender, to = %peer, "delivered");
                    delivered += 1;
                }
                Err(err) => warn!(from = %sender, to = %peer, error = %err, "delivery failed"),
            }
        }
        delivered
    }

    fn reply(&self, connection_id: ConnectionId, message: ServerMessage) {
        if let Err(err) = self.transport.send(connection_id, &message) {
            warn!(%connection_id, error = %err, "reply not delivered");
        }
    }
}

fn truncate(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((end, _)) => &raw[..end],
        None => raw,
    }
}
