//! Standalone collaboration server.
//!
//! Configuration via environment:
//! - `CROSSWORD_BIND` — listen address (default `127.0.0.1:9090`)
//! - `CROSSWORD_DATA` — RocksDB directory; unset runs without persistence

use crossword_collab::storage::StoreConfig;
use crossword_collab::{CollabServer, ServerConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("CROSSWORD_BIND") {
        config.bind_addr = addr;
    }
    match std::env::var("CROSSWORD_DATA") {
        Ok(path) => {
            config.storage = Some(StoreConfig {
                path: path.into(),
                ..StoreConfig::default()
            });
        }
        Err(_) => log::warn!("CROSSWORD_DATA unset, edits will not be persisted"),
    }

    let server = Arc::new(CollabServer::new(config)?);
    server.run().await?;
    Ok(())
}
