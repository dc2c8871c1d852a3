//! WebSocket server: one task per connection, rooms shared through the registry.
//!
//! ```text
//! Client A ──┐                         ┌── Room "lobby" ── Surface + OperationLog
//!             ├── Session ── Registry ──┤        │
//! Client B ──┘                         └── Room "studio"   ├── user outboxes (bounded)
//!                                                         └── RoomStore (RocksDB / memory)
//! ```
//!
//! Each connection task runs one `select!` loop over three sources: frames
//! from the socket, frames queued by rooms for this connection, and the
//! keepalive timer.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use easel_raster::PngDataUrlCodec;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::connection::{InboundFrame, Session, Step};
use crate::protocol::{CloseReason, ProtocolError, ServerPacket};
use crate::registry::RoomRegistry;
use crate::room::RoomConfig;
use crate::storage::{MemoryRoomStore, RocksRoomStore, RoomStore, StoreConfig, StoreError};
use crate::user::{outbound_channel, Outbound};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Seconds between server pings
    pub keepalive_interval_secs: u64,
    /// Frames buffered per connection before it is dropped as too slow
    pub outbound_queue_capacity: usize,
    /// Persistence storage path (None = in-memory only)
    pub storage_path: Option<PathBuf>,
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5174".to_string(),
            keepalive_interval_secs: 5,
            outbound_queue_capacity: 256,
            storage_path: None,
            room: RoomConfig::default(),
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub total_bytes: u64,
    /// Connections closed for breaking the protocol
    pub protocol_closes: u64,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

pub struct DrawServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    stats: Arc<RwLock<ServerStats>>,
}

impl DrawServer {
    /// Open storage and build the room registry.
    ///
    /// Uses RocksDB when `storage_path` is set, otherwise an in-memory store.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let store: Arc<dyn RoomStore> = match &config.storage_path {
            Some(path) => Arc::new(RocksRoomStore::open(StoreConfig::at(path.clone()))?),
            None => Arc::new(MemoryRoomStore::new()),
        };
        let codec = Arc::new(PngDataUrlCodec::new(config.room.max_canvas_dimension));
        let registry = Arc::new(RoomRegistry::new(store, codec, config.room.clone()));
        Ok(Self {
            config,
            registry,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        })
    }

    /// Restore persisted rooms, bind, and serve forever.
    pub async fn run(&self) -> Result<(), ServerError> {
        let restored = self.registry.restore().await?;
        if restored > 0 {
            log::info!("Restored {restored} rooms from persistent storage");
        }

        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Draw server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept WebSocket connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let registry = self.registry.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, registry, stats, config).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<RoomRegistry>,
        stats: Arc<RwLock<ServerStats>>,
        config: ServerConfig,
    ) -> Result<(), ServerError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let (outbox, mut inbox) = outbound_channel(config.outbound_queue_capacity);
        let mut session = Session::new(registry, outbox);

        let period = Duration::from_secs(config.keepalive_interval_secs.max(1));
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ping = ServerPacket::Ping.encode()?;

        let result: Result<(), ServerError> = loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    let frame = match msg {
                        Some(Ok(Message::Text(text))) => {
                            let mut s = stats.write().await;
                            s.total_frames += 1;
                            s.total_bytes += text.len() as u64;
                            InboundFrame::Text(text.as_str().to_owned())
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let mut s = stats.write().await;
                            s.total_frames += 1;
                            s.total_bytes += data.len() as u64;
                            InboundFrame::Binary
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break Ok(());
                        }
                        Some(Err(e)) => break Err(e.into()),
                        // tungstenite answers pings itself
                        Some(Ok(_)) => continue,
                    };
                    if let Step::Close(reason) = session.handle_frame(frame).await {
                        stats.write().await.protocol_closes += 1;
                        log::warn!("Closing {addr}: {} {}", reason.code, reason.reason);
                        break send_close(&mut ws_sender, reason).await;
                    }
                }

                out = inbox.next() => {
                    match out {
                        Some(Outbound::Text(text)) => {
                            if let Err(e) = ws_sender.send(Message::text(text.to_string())).await {
                                break Err(e.into());
                            }
                        }
                        Some(Outbound::Close(reason)) => {
                            log::info!("Closing {addr}: {} {}", reason.code, reason.reason);
                            break send_close(&mut ws_sender, reason).await;
                        }
                        None => break Ok(()),
                    }
                }

                _ = keepalive.tick() => {
                    log::trace!("keepalive ping to {addr}");
                    if let Err(e) = ws_sender.send(Message::text(ping.clone())).await {
                        break Err(e.into());
                    }
                }
            }
        };

        session.close().await;
        stats.write().await.active_connections -= 1;
        result
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}

async fn send_close(sink: &mut WsSink, reason: CloseReason) -> Result<(), ServerError> {
    let frame = CloseFrame {
        code: CloseCode::from(reason.code),
        reason: reason.reason.to_string().into(),
    };
    sink.send(Message::Close(Some(frame))).await?;
    Ok(())
}
