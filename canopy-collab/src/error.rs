use canopy_core::ModelError;
use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("room registry is not running")]
    Stopped,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport closed: {0}")]
    Transport(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, CollabError>;
