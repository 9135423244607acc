//! # canopy-collab: live rooms and socket synchronization
//!
//! ```text
//! socket ──frames──► SyncConnection ──apply──► SharedDocument
//!                                                   │ on_update
//!                                                   ▼
//!  HTTP ops ──transact──────────────────────► Session ──► BroadcastGroup ──► sockets
//!                                                   │
//!                                                   ▼
//!                                              Persistence
//! ```
//!
//! - [`protocol`]: varint-framed sync and presence messages
//! - [`broadcast`]: per-room fan-out that never waits on slow peers
//! - [`session`]: a live document bound to its room
//! - [`registry`]: lifecycle of every live session
//! - [`sync`]: per-connection state machine and driver
//! - [`storage`]: persistence collaborators

pub mod broadcast;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod storage;
pub mod sync;

pub use broadcast::{BroadcastGroup, BroadcastStats, Outbound, PeerInfo};
pub use error::{CollabError, Result};
pub use protocol::{Message, ProtocolError, SyncMessage};
pub use registry::{RegistryConfig, RoomInfo, RoomRegistry};
pub use session::Session;
pub use storage::{MemoryStore, Persistence, RocksStore, StoreConfig, StoreError};
pub use sync::{serve, ConnectionState, SyncConnection};
