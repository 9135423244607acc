//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use canopy_collab::{
    MemoryStore, Persistence, RegistryConfig, RocksStore, StoreConfig, StoreError,
};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "canopy-server")]
#[command(about = "Collaborative document graph server")]
#[command(version)]
pub struct ServerConfig {
    /// Address for HTTP and websocket traffic.
    #[arg(long, env = "CANOPY_BIND", default_value = "127.0.0.1:1234")]
    pub bind: SocketAddr,

    /// RocksDB directory; documents live in memory when unset.
    #[arg(long, env = "CANOPY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Frames a socket may fall behind before it is resynced.
    #[arg(long, env = "CANOPY_BROADCAST_CAPACITY", default_value_t = 256)]
    pub broadcast_capacity: usize,

    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, env = "CANOPY_LOG", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn persistence(&self) -> Result<Arc<dyn Persistence>, StoreError> {
        match &self.data_dir {
            Some(dir) => {
                let store = RocksStore::open(StoreConfig {
                    path: dir.clone(),
                    ..StoreConfig::default()
                })?;
                Ok(Arc::new(store))
            }
            None => {
                log::warn!("no data directory configured; documents are kept in memory only");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            broadcast_capacity: self.broadcast_capacity,
            ..RegistryConfig::default()
        }
    }
}

pub fn init_logging(default_filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}
