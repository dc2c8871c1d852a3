//! A live connection bound to a room, seen from the room's side.
//!
//! Rooms never write to sockets. Each connection owns a bounded outbound
//! queue; the room holds the sending half (an [`Outbox`]) and pushes with
//! `try_send`. A full queue means the client is not keeping up: the outbox
//! raises the connection's shutdown signal and the connection task closes the
//! socket with `1008 outbound queue overflow`. A close that does not fit in
//! the queue raises the same signal carrying its own reason.

use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::protocol::CloseReason;

/// One item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A pre-encoded text frame.
    Text(Arc<str>),
    /// Send a close frame and end the connection.
    Close(CloseReason),
}

/// Result of handing a frame to a user's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue was full; the connection is being shut down out of band.
    Overflowed,
    /// The connection task has already gone away.
    Disconnected,
}

struct Shutdown {
    notify: Notify,
    /// First reason raised wins.
    reason: OnceLock<CloseReason>,
}

/// Sending half of a connection's outbound queue.
#[derive(Clone)]
pub struct Outbox {
    sender: mpsc::Sender<Outbound>,
    shutdown: Arc<Shutdown>,
}

/// Receiving half, drained by the connection task.
pub struct Inbox {
    receiver: mpsc::Receiver<Outbound>,
    shutdown: Arc<Shutdown>,
}

/// Create a bounded outbound queue holding up to `capacity` frames.
pub fn outbound_channel(capacity: usize) -> (Outbox, Inbox) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let shutdown = Arc::new(Shutdown {
        notify: Notify::new(),
        reason: OnceLock::new(),
    });
    (
        Outbox { sender, shutdown: shutdown.clone() },
        Inbox { receiver, shutdown },
    )
}

impl Outbox {
    pub fn push(&self, item: Outbound) -> Delivery {
        match self.sender.try_send(item) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(item)) => {
                let reason = match item {
                    Outbound::Close(reason) => reason,
                    Outbound::Text(_) => CloseReason::QUEUE_OVERFLOW,
                };
                self.raise_shutdown(reason);
                Delivery::Overflowed
            }
            Err(TrySendError::Closed(_)) => Delivery::Disconnected,
        }
    }

    /// Queue `item` only if there is room, never raising the shutdown.
    fn offer(&self, item: Outbound) -> Delivery {
        match self.sender.try_send(item) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Overflowed,
            Err(TrySendError::Closed(_)) => Delivery::Disconnected,
        }
    }

    /// Whether a shutdown has been raised.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.reason.get().is_some()
    }

    fn raise_shutdown(&self, reason: CloseReason) {
        if self.shutdown.reason.set(reason).is_ok() {
            // notify_one stores a permit if the connection task is not waiting yet.
            self.shutdown.notify.notify_one();
        }
    }
}

impl Inbox {
    /// Next item to write to the socket.
    ///
    /// A raised shutdown takes priority over queued frames and is reported
    /// as a close with its reason. Returns `None` once every outbox is
    /// dropped and the queue is empty.
    pub async fn next(&mut self) -> Option<Outbound> {
        if let Some(reason) = self.shutdown.reason.get() {
            return Some(Outbound::Close(*reason));
        }
        tokio::select! {
            biased;
            _ = self.shutdown.notify.notified() => {
                let reason = self.shutdown.reason.get().copied();
                Some(Outbound::Close(reason.unwrap_or(CloseReason::QUEUE_OVERFLOW)))
            }
            item = self.receiver.recv() => item,
        }
    }
}

/// A display name bound to one connection.
///
/// The instance id distinguishes two connections that used the same name, so
/// a late close from a superseded connection cannot remove its replacement.
pub struct User {
    id: Uuid,
    name: String,
    outbox: Outbox,
}

impl User {
    pub fn new(name: impl Into<String>, outbox: Outbox) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            outbox,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send_text(&self, text: Arc<str>) -> Delivery {
        let delivery = self.outbox.push(Outbound::Text(text));
        if delivery == Delivery::Overflowed {
            log::warn!("outbound queue of {:?} overflowed, closing", self.name);
        }
        delivery
    }

    /// Queue a close frame behind everything already queued.
    ///
    /// On a full queue the close is raised out of band and still carries
    /// `reason`.
    pub fn close(&self, reason: CloseReason) -> Delivery {
        self.outbox.push(Outbound::Close(reason))
    }

    /// Send `notice` if it fits, then close with [`CloseReason::KICKED`].
    ///
    /// A notice that does not fit is dropped so the close stays a kick.
    pub fn kick(&self, notice: Option<Arc<str>>) -> Delivery {
        if let Some(text) = notice {
            if self.outbox.offer(Outbound::Text(text)) == Delivery::Overflowed {
                log::debug!("No room for kick notice to {:?}", self.name);
            }
        }
        self.close(CloseReason::KICKED)
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
