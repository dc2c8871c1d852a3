//! Easel draw server: hosts collaborative drawing rooms over WebSocket.
//!
//! Logging is controlled with `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use easel_collab::room::RoomConfig;
use easel_collab::server::{DrawServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "easel-server", version, about = "Collaborative drawing room server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "EASEL_BIND", default_value = "127.0.0.1:5174")]
    bind: String,

    /// RocksDB directory; rooms are kept in memory only when omitted
    #[arg(long, env = "EASEL_STORAGE")]
    storage_path: Option<PathBuf>,

    /// Seconds between keepalive pings
    #[arg(long, default_value_t = 5)]
    keepalive_secs: u64,

    /// Outbound frames buffered per connection
    #[arg(long, default_value_t = 256)]
    queue_capacity: usize,

    /// Operation log length that triggers compaction
    #[arg(long, default_value_t = 50)]
    compaction_threshold: usize,

    /// Largest canvas width or height accepted
    #[arg(long, default_value_t = 4096)]
    max_canvas: u32,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind,
            keepalive_interval_secs: args.keepalive_secs,
            outbound_queue_capacity: args.queue_capacity,
            storage_path: args.storage_path,
            room: RoomConfig {
                compaction_threshold: args.compaction_threshold,
                max_canvas_dimension: args.max_canvas,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    log::debug!("Starting with {config:?}");

    let server = match DrawServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            log::error!("Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        log::error!("Server stopped: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
