//! # canopy-server
//!
//! HTTP mutation API and websocket sync endpoint over a shared
//! [`RoomRegistry`](canopy_collab::RoomRegistry).

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod state;
pub mod ws;

pub use api::router;
pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
