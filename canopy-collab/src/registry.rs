//! The single owner of live documents.
//!
//! A room is created lazily from persisted state the first time a document
//! is touched and lives until it is deleted or the registry stops.  At most
//! one [`Session`] exists per document id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use canopy_core::{DocumentSummary, SharedDocument};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CollabError, Result};
use crate::session::Session;
use crate::storage::Persistence;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames a slow connection may fall behind before it is resynced.
    pub broadcast_capacity: usize,
    /// Save a snapshot when the last socket of a room closes.
    pub snapshot_on_last_close: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            snapshot_on_last_close: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: String,
    pub client_count: usize,
}

pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Session>>>,
    persistence: Arc<dyn Persistence>,
    config: RegistryConfig,
    running: AtomicBool,
}

impl RoomRegistry {
    /// A stopped registry; call [`RoomRegistry::start`] before use.
    pub fn new(persistence: Arc<dyn Persistence>, config: RegistryConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            persistence,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "room registry started (broadcast capacity {})",
            self.config.broadcast_capacity
        );
    }

    /// Snapshot and retire every live room.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let sessions: Vec<Arc<Session>> = self.rooms.write().await.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            if let Err(e) = session.snapshot() {
                log::error!("failed to snapshot {} on shutdown: {e}", session.doc_id());
            }
            session.retire();
        }
        log::info!("room registry stopped; {} rooms retired", sessions.len());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(CollabError::Stopped)
        }
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// The live session for `doc_id`, loading it if needed.  A document
    /// with no stored state starts empty.
    pub async fn get_or_create(&self, doc_id: &str) -> Result<Arc<Session>> {
        match self.load(doc_id, true).await? {
            Some(session) => Ok(session),
            None => Err(CollabError::Stopped),
        }
    }

    /// Like [`RoomRegistry::get_or_create`] but `None` when the document
    /// is neither live nor persisted.
    pub async fn open_existing(&self, doc_id: &str) -> Result<Option<Arc<Session>>> {
        self.load(doc_id, false).await
    }

    async fn load(&self, doc_id: &str, create: bool) -> Result<Option<Arc<Session>>> {
        self.ensure_running()?;
        if let Some(session) = self.rooms.read().await.get(doc_id) {
            return Ok(Some(session.clone()));
        }

        // Storage reads block, so they run off the runtime and outside the
        // room lock.  A concurrent loader may win the insert below.
        let persistence = self.persistence.clone();
        let key = doc_id.to_string();
        let stored = tokio::task::spawn_blocking(move || persistence.load(&key)).await??;
        let document = match &stored {
            Some(state) => Some(SharedDocument::from_state(state)?),
            None if create => Some(SharedDocument::new()),
            None => None,
        };

        let mut rooms = self.rooms.write().await;
        if let Some(session) = rooms.get(doc_id) {
            return Ok(Some(session.clone()));
        }
        self.ensure_running()?;
        let Some(document) = document else {
            return Ok(None);
        };
        match &stored {
            Some(state) => log::info!("loaded room {doc_id} ({} bytes)", state.len()),
            None => log::info!("created room {doc_id}"),
        }
        let session = Arc::new(Session::open(
            doc_id,
            document,
            self.persistence.clone(),
            self.config.broadcast_capacity,
        ));
        rooms.insert(doc_id.to_string(), session.clone());
        Ok(Some(session))
    }

    /// Report a freshly created document to persistence.
    pub fn notify_created(&self, session: &Session) -> Result<()> {
        let summary = session.summary()?;
        self.persistence.on_created(session.doc_id(), &summary)?;
        Ok(())
    }

    /// Retire the room and delete the stored document.  Returns whether
    /// anything existed.
    pub async fn remove(&self, doc_id: &str) -> Result<bool> {
        let live = self.rooms.write().await.remove(doc_id);
        if let Some(session) = &live {
            session.retire();
        }
        let stored = self.persistence.delete(doc_id)?;
        log::info!("retired room {doc_id}");
        Ok(live.is_some() || stored)
    }

    /// Detach a connection.  When it was the last one, an initialized
    /// document is snapshotted and an uninitialized room is evicted.
    pub async fn disconnect(&self, session: &Session, connection_id: Uuid) {
        let remaining = session.group().remove_peer(&connection_id).await;
        if remaining > 0 {
            return;
        }
        if !session.document().is_initialized() {
            self.evict_if_idle(session).await;
            return;
        }
        if self.config.snapshot_on_last_close {
            match session.snapshot() {
                Ok(true) => log::info!("saved snapshot of {} (last client left)", session.doc_id()),
                Ok(false) => {}
                Err(e) => log::error!("failed to snapshot {}: {e}", session.doc_id()),
            }
        }
    }

    /// Drop a room nobody is connected to and nothing was written to.
    async fn evict_if_idle(&self, session: &Session) {
        let mut rooms = self.rooms.write().await;
        let Some(live) = rooms.get(session.doc_id()) else {
            return;
        };
        if !std::ptr::eq(Arc::as_ptr(live), session)
            || live.client_count().await > 0
            || live.document().is_initialized()
        {
            return;
        }
        if let Some(evicted) = rooms.remove(session.doc_id()) {
            evicted.retire();
            log::debug!("evicted empty room {}", session.doc_id());
        }
    }

    /// Persisted documents, with live rooms reporting their current state.
    pub async fn list(&self) -> Result<Vec<DocumentSummary>> {
        let mut by_id: HashMap<String, DocumentSummary> = self
            .persistence
            .list()?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        for session in self.rooms.read().await.values() {
            if session.document().is_initialized() {
                let summary = session.summary()?;
                by_id.insert(summary.id.clone(), summary);
            }
        }
        let mut list: Vec<DocumentSummary> = by_id.into_values().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    pub async fn active_rooms(&self) -> Vec<RoomInfo> {
        let sessions: Vec<Arc<Session>> = self.rooms.read().await.values().cloned().collect();
        let mut rooms = Vec::with_capacity(sessions.len());
        for session in sessions {
            rooms.push(RoomInfo {
                room_id: session.doc_id().to_string(),
                client_count: session.client_count().await,
            });
        }
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub fn health_metadata(&self) -> Map<String, Value> {
        self.persistence.health_metadata()
    }
}
