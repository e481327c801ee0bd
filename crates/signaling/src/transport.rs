use shared::models::{ConnectionId, ServerMessage};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

pub const DEFAULT_OUTBOUND_CAPACITY: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection {0} is not attached")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("outbound queue for connection {0} is full")]
    Full(ConnectionId),
}

/// Outbound half of the connection layer.
///
/// `send` must not block: it hands the message off and returns.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, to: ConnectionId, message: &ServerMessage) -> Result<(), DeliveryError>;
}

pub type OutboundReceiver = mpsc::Receiver<ServerMessage>;

/// Per-connection outbound queues, drained by each socket's writer task.
///
/// Queues are bounded; a peer that stops reading loses messages once its
/// queue is full instead of growing it.
#[derive(Debug)]
pub struct ChannelTransport {
    senders: RwLock<HashMap<ConnectionId, mpsc::Sender<ServerMessage>>>,
    capacity: usize,
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_OUTBOUND_CAPACITY)
    }
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            // mpsc::channel panics on zero
            capacity: capacity.max(1),
        }
    }

    pub fn attach(&self, connection_id: ConnectionId) -> OutboundReceiver {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection_id, tx);
        rx
    }

    pub fn detach(&self, connection_id: &ConnectionId) {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(connection_id);
    }
}

impl Transport for ChannelTransport {
    fn send(&self, to: ConnectionId, message: &ServerMessage) -> Result<(), DeliveryError> {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let tx = senders.get(&to).ok_or(DeliveryError::UnknownConnection(to))?;
        tx.try_send(message.clone()).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::Full(to),
            TrySendError::Closed(_) => DeliveryError::Closed(to),
        })
    }
}
