//! Per-connection protocol state machine.
//!
//! ```text
//!                connect (room exists)
//! AwaitingConnect ────────────────────► Bound ──► Closed
//!        │                                │
//!        └── anything else ──► Closed ◄───┘ binary / malformed / kick / overflow
//! ```
//!
//! The state machine never touches the socket. [`Session::handle_frame`]
//! returns a [`Step`] and the server loop performs any close it asks for.

use std::sync::Arc;

use crate::protocol::{ClientPacket, CloseReason};
use crate::registry::RoomRegistry;
use crate::room::Room;
use crate::user::{Outbox, User};

/// What the transport delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary,
}

/// What the server loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Close(CloseReason),
}

pub enum SessionState {
    AwaitingConnect,
    Bound { room: Arc<Room>, user: Arc<User> },
    Closed,
}

pub struct Session {
    registry: Arc<RoomRegistry>,
    outbox: Outbox,
    state: SessionState,
}

impl Session {
    /// `outbox` feeds this connection's outbound queue.
    pub fn new(registry: Arc<RoomRegistry>, outbox: Outbox) -> Self {
        Self {
            registry,
            outbox,
            state: SessionState::AwaitingConnect,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, SessionState::Bound { .. })
    }

    /// Display name and room, once bound.
    pub fn binding(&self) -> Option<(&str, &str)> {
        match &self.state {
            SessionState::Bound { room, user } => Some((user.name(), room.name())),
            _ => None,
        }
    }

    pub async fn handle_frame(&mut self, frame: InboundFrame) -> Step {
        let bound = match &self.state {
            SessionState::AwaitingConnect => None,
            SessionState::Bound { room, user } => Some((room.clone(), user.clone())),
            SessionState::Closed => return Step::Continue,
        };
        let step = match bound {
            None => self.handle_unbound(frame).await,
            Some((room, user)) => Self::handle_bound(room, user, frame).await,
        };
        if let Step::Close(reason) = step {
            log::debug!("Closing session: {} {}", reason.code, reason.reason);
            self.close().await;
        }
        step
    }

    async fn handle_unbound(&mut self, frame: InboundFrame) -> Step {
        let text = match frame {
            InboundFrame::Binary => return Step::Close(CloseReason::UNEXPECTED_BINARY),
            InboundFrame::Text(text) => text,
        };
        let (room_name, name) = match ClientPacket::decode(&text) {
            Ok(ClientPacket::Connect { room, name }) => (room, name),
            Ok(other) => {
                log::warn!("First packet was not connect: {other:?}");
                return Step::Close(CloseReason::NO_CONNECT);
            }
            Err(e) => {
                log::warn!("Unreadable first packet: {e}");
                return Step::Close(CloseReason::NO_CONNECT);
            }
        };

        let Some(room) = self.registry.get_room(&room_name).await else {
            log::warn!("{name:?} asked for unknown room {room_name:?}");
            return Step::Close(CloseReason::ROOM_DOES_NOT_EXIST);
        };

        let user = Arc::new(User::new(name, self.outbox.clone()));
        room.add_user(user.clone()).await;
        self.state = SessionState::Bound { room, user };
        Step::Continue
    }

    async fn handle_bound(room: Arc<Room>, user: Arc<User>, frame: InboundFrame) -> Step {
        let text = match frame {
            InboundFrame::Binary => return Step::Close(CloseReason::UNEXPECTED_BINARY_MESSAGE),
            InboundFrame::Text(text) => text,
        };
        let packet = match ClientPacket::decode(&text) {
            Ok(packet) => packet,
            Err(e) => {
                log::warn!("Malformed packet from {:?}: {e}", user.name());
                return Step::Close(CloseReason::MALFORMED_PACKET);
            }
        };

        match packet {
            ClientPacket::Operation { operation } => {
                room.handle_operation(operation, user.name()).await;
            }
            ClientPacket::Moderator { password, data } => {
                room.handle_moderator(&password, data, user.name()).await;
            }
            ClientPacket::Palette { data } => room.handle_palette(data).await,
            ClientPacket::Connect { room: target, .. } => {
                log::debug!("Ignoring repeated connect to {target:?} from {:?}", user.name());
            }
            ClientPacket::Ping => log::trace!("ping from {:?}", user.name()),
        }
        Step::Continue
    }

    /// Leave the room (if bound) and stop accepting frames.
    pub async fn close(&mut self) {
        if let SessionState::Bound { room, user } =
            std::mem::replace(&mut self.state, SessionState::Closed)
        {
            room.remove_user(&user).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerPacket;
    use crate::room::RoomConfig;
    use crate::storage::MemoryRoomStore;
    use crate::user::{outbound_channel, Inbox, Outbound};
    use easel_raster::{PngDataUrlCodec, Size};
    use futures_util::FutureExt;

    async fn registry() -> Arc<RoomRegistry> {
        let reg = RoomRegistry::new(
            Arc::new(MemoryRoomStore::new()),
            Arc::new(PngDataUrlCodec::default()),
            RoomConfig::default(),
        );
        reg.create_room("lobby", Size::new(8, 8), "ann").await.unwrap();
        Arc::new(reg)
    }

    async fn session() -> (Session, Inbox, Arc<RoomRegistry>) {
        let reg = registry().await;
        let (outbox, inbox) = outbound_channel(32);
        (Session::new(reg.clone(), outbox), inbox, reg)
    }

    fn text(s: &str) -> InboundFrame {
        InboundFrame::Text(s.to_string())
    }

    const CONNECT: &str = r#"{"type":"connect","room":"lobby","name":"bob"}"#;

    #[tokio::test]
    async fn test_first_packet_must_be_connect() {
        let (mut s, mut inbox, reg) = session().await;
        let step = s.handle_frame(text(r#"{"type":"ping"}"#)).await;
        assert_eq!(step, Step::Close(CloseReason::NO_CONNECT));
        assert!(matches!(s.state(), SessionState::Closed));
        assert!(reg.get_room("lobby").await.unwrap().user_names().await.is_empty());
        assert!(inbox.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_unbound_rejections() {
        let (mut s, _inbox, _reg) = session().await;
        assert_eq!(
            s.handle_frame(InboundFrame::Binary).await,
            Step::Close(CloseReason::UNEXPECTED_BINARY)
        );

        let (mut s, _inbox, _reg) = session().await;
        assert_eq!(s.handle_frame(text("{oops")).await, Step::Close(CloseReason::NO_CONNECT));

        let (mut s, _inbox, _reg) = session().await;
        assert_eq!(
            s.handle_frame(text(r#"{"type":"connect","room":"nowhere","name":"bob"}"#)).await,
            Step::Close(CloseReason::ROOM_DOES_NOT_EXIST)
        );
    }

    #[tokio::test]
    async fn test_connect_binds_and_sends_connected() {
        let (mut s, mut inbox, reg) = session().await;
        assert_eq!(s.handle_frame(text(CONNECT)).await, Step::Continue);
        assert!(s.is_bound());
        assert_eq!(s.binding(), Some(("bob", "lobby")));
        assert_eq!(reg.get_room("lobby").await.unwrap().user_names().await, vec!["bob"]);

        match inbox.next().await {
            Some(Outbound::Text(t)) => assert_eq!(
                ServerPacket::decode(&t).unwrap(),
                ServerPacket::Connected { size: Size::new(8, 8) }
            ),
            other => panic!("expected connected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bound_dispatch_and_ignores() {
        let (mut s, _inbox, reg) = session().await;
        s.handle_frame(text(CONNECT)).await;
        let room = reg.get_room("lobby").await.unwrap();

        assert_eq!(s.handle_frame(text(r#"{"type":"ping"}"#)).await, Step::Continue);
        assert_eq!(
            s.handle_frame(text(r#"{"type":"connect","room":"other","name":"x"}"#)).await,
            Step::Continue
        );
        assert_eq!(s.binding(), Some(("bob", "lobby")));

        let op = r##"{"type":"operation","operation":{"type":"fill","position":{"x":0,"y":0},"color":"#123456"}}"##;
        assert_eq!(s.handle_frame(text(op)).await, Step::Continue);
        assert_eq!(room.log_len().await, 1);

        let palette = r##"{"type":"palette","data":{"type":"add","color":"#abcdef"}}"##;
        s.handle_frame(text(palette)).await;
        assert_eq!(room.palette().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_palette_index_keeps_connection() {
        let (mut s, mut inbox, reg) = session().await;
        s.handle_frame(text(CONNECT)).await;
        let room = reg.get_room("lobby").await.unwrap();
        let add = r##"{"type":"palette","data":{"type":"add","color":"#abcdef"}}"##;
        s.handle_frame(text(add)).await;
        while inbox.next().now_or_never().is_some() {}

        for index in ["-1", "2.5", "7"] {
            let remove = format!(r#"{{"type":"palette","data":{{"type":"remove","index":{index}}}}}"#);
            assert_eq!(s.handle_frame(text(&remove)).await, Step::Continue);
        }

        assert!(s.is_bound());
        assert_eq!(room.user_names().await, vec!["bob"]);
        assert_eq!(room.palette().await.len(), 1);
        assert!(inbox.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_bound_violations_close_and_leave() {
        let (mut s, _inbox, reg) = session().await;
        s.handle_frame(text(CONNECT)).await;
        assert_eq!(
            s.handle_frame(text("nonsense")).await,
            Step::Close(CloseReason::MALFORMED_PACKET)
        );
        assert!(reg.get_room("lobby").await.unwrap().user_names().await.is_empty());

        let (mut s, _inbox, _reg) = session().await;
        s.handle_frame(text(CONNECT)).await;
        assert_eq!(
            s.handle_frame(InboundFrame::Binary).await,
            Step::Close(CloseReason::UNEXPECTED_BINARY_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_stale_close_does_not_remove_reconnected_user() {
        let reg = registry().await;
        let (outbox_a, _inbox_a) = outbound_channel(32);
        let (outbox_b, _inbox_b) = outbound_channel(32);
        let mut first = Session::new(reg.clone(), outbox_a);
        let mut second = Session::new(reg.clone(), outbox_b);

        first.handle_frame(text(CONNECT)).await;
        second.handle_frame(text(CONNECT)).await;
        first.close().await;

        let room = reg.get_room("lobby").await.unwrap();
        assert_eq!(room.user_names().await, vec!["bob"]);
        second.close().await;
        assert!(room.user_names().await.is_empty());
    }
}
