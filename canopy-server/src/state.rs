//! Shared handler state.

use std::sync::Arc;

use canopy_collab::{RoomRegistry, Session};
use canopy_core::{GraphMut, ReadGraph, UpdateOrigin};

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// The live session of an existing document.
    pub async fn session(&self, doc_id: &str) -> ApiResult<Arc<Session>> {
        self.registry
            .open_existing(doc_id)
            .await?
            .filter(|s| s.document().is_initialized())
            .ok_or_else(|| ApiError::DocumentNotFound(doc_id.to_string()))
    }

    pub async fn read<R>(
        &self,
        doc_id: &str,
        f: impl FnOnce(&ReadGraph<'_, '_>) -> canopy_core::Result<R>,
    ) -> ApiResult<R> {
        let session = self.session(doc_id).await?;
        Ok(session.document().read(f)?)
    }

    /// Run `f` as one transaction; its update reaches every socket of the
    /// room.
    pub async fn mutate<R>(
        &self,
        doc_id: &str,
        f: impl FnOnce(&mut GraphMut<'_, '_>) -> canopy_core::Result<R>,
    ) -> ApiResult<R> {
        let session = self.session(doc_id).await?;
        log::debug!("mutating document {doc_id}");
        Ok(session.document().transact(UpdateOrigin::Local, f)?)
    }
}
