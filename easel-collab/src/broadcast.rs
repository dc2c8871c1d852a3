//! Fan-out of one encoded packet to every user of a room.
//!
//! The packet is serialised once and the same `Arc<str>` is queued for each
//! recipient. Queues are bounded and written with `try_send`, so a slow
//! client never stalls the room; it overflows and gets disconnected instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::user::{Delivery, User};

/// Snapshot of a room's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomStats {
    pub operations_applied: u64,
    pub operations_rejected: u64,
    pub compactions: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub persist_failures: u64,
}

/// Lock-free counters updated on the hot path and read via [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub(crate) struct AtomicRoomStats {
    pub operations_applied: AtomicU64,
    pub operations_rejected: AtomicU64,
    pub compactions: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub persist_failures: AtomicU64,
}

impl AtomicRoomStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RoomStats {
        RoomStats {
            operations_applied: self.operations_applied.load(Ordering::Relaxed),
            operations_rejected: self.operations_rejected.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

/// Queue `text` for every user except the one named `exclude`.
///
/// Returns the number of queues that accepted the frame.
pub(crate) fn fan_out<'a>(
    users: impl IntoIterator<Item = &'a Arc<User>>,
    text: &Arc<str>,
    exclude: Option<&str>,
    stats: &AtomicRoomStats,
) -> usize {
    let mut delivered = 0;
    for user in users {
        if exclude == Some(user.name()) {
            continue;
        }
        match user.send_text(text.clone()) {
            Delivery::Queued => {
                delivered += 1;
                AtomicRoomStats::bump(&stats.messages_sent);
            }
            Delivery::Overflowed => AtomicRoomStats::bump(&stats.messages_dropped),
            // Already closing; its slot is released when the task finishes.
            Delivery::Disconnected => {}
        }
    }
    delivered
}
