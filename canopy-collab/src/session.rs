//! One live document and the sockets attached to it.

use std::sync::Arc;

use canopy_core::ops::documents;
use canopy_core::{DocumentSummary, SharedDocument, SubscriptionId, UpdateOrigin};

use crate::broadcast::BroadcastGroup;
use crate::error::Result;
use crate::protocol::Message;
use crate::storage::Persistence;

pub struct Session {
    doc_id: String,
    document: SharedDocument,
    group: Arc<BroadcastGroup>,
    persistence: Arc<dyn Persistence>,
    subscription: SubscriptionId,
}

impl Session {
    /// Wrap `document` and start forwarding its updates.
    ///
    /// Every committed change is encoded as a sync update frame and queued
    /// for the room; changes that did not come from persistence are also
    /// appended to it.  Frames from a connection carry that connection's
    /// id so it can skip its own echo.
    pub fn open(
        doc_id: &str,
        document: SharedDocument,
        persistence: Arc<dyn Persistence>,
        broadcast_capacity: usize,
    ) -> Self {
        let group = Arc::new(BroadcastGroup::new(broadcast_capacity));

        let fanout = group.clone();
        let store = persistence.clone();
        let id = doc_id.to_string();
        let subscription = document.on_update(move |event| {
            let sender = match event.origin {
                UpdateOrigin::Connection(conn) => Some(conn),
                UpdateOrigin::Local | UpdateOrigin::Load => None,
            };
            if event.origin != UpdateOrigin::Load {
                if let Err(e) = store.append_update(&id, &event.update) {
                    log::error!("failed to persist update for {id}: {e}");
                }
            }
            fanout.broadcast(sender, Message::update(event.update.to_vec()).encode());
        });

        Self {
            doc_id: doc_id.to_string(),
            document,
            group,
            persistence,
            subscription,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn group(&self) -> &Arc<BroadcastGroup> {
        &self.group
    }

    pub async fn client_count(&self) -> usize {
        self.group.peer_count().await
    }

    pub fn summary(&self) -> Result<DocumentSummary> {
        Ok(self
            .document
            .read(|g| Ok(documents::summary(g, &self.doc_id)))?)
    }

    /// Write the full state to persistence.  Documents that were never
    /// created are skipped.
    pub fn snapshot(&self) -> Result<bool> {
        if !self.document.is_initialized() {
            return Ok(false);
        }
        let state = self.document.encode_state()?;
        let summary = self.summary()?;
        self.persistence
            .save_snapshot(&self.doc_id, &state, &summary)?;
        log::debug!("saved snapshot of {} ({} bytes)", self.doc_id, state.len());
        Ok(true)
    }

    /// Stop forwarding updates.
    pub fn retire(&self) -> bool {
        self.document.unsubscribe(self.subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SyncMessage;
    use crate::storage::MemoryStore;
    use uuid::Uuid;

    fn session(store: Arc<MemoryStore>) -> Session {
        Session::open("doc", SharedDocument::new(), store, 16)
    }

    fn create(session: &Session) {
        session
            .document()
            .transact(UpdateOrigin::Local, |g| {
                documents::create(g, "doc", documents::CreateDocument::default())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_local_change_is_persisted_and_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let session = session(store.clone());
        let mut rx = session.group().add_peer(crate::PeerInfo::new(Uuid::new_v4())).await;

        create(&session);

        assert_eq!(store.stored_updates("doc"), 1);
        let outbound = rx.recv().await.unwrap();
        assert_eq!(outbound.origin, None);
        assert!(matches!(
            Message::decode(&outbound.frame).unwrap(),
            Message::Sync(SyncMessage::Update(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_change_carries_connection() {
        let store = Arc::new(MemoryStore::new());
        let source = SharedDocument::new();
        source
            .transact(UpdateOrigin::Local, |g| {
                documents::create(g, "doc", documents::CreateDocument::default())
            })
            .unwrap();

        let session = session(store.clone());
        let mut rx = session.group().add_peer(crate::PeerInfo::new(Uuid::new_v4())).await;
        let conn = Uuid::new_v4();
        session
            .document()
            .apply_update(&source.encode_state().unwrap(), UpdateOrigin::Connection(conn))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().origin, Some(conn));
        assert_eq!(store.stored_updates("doc"), 1);
    }

    #[test]
    fn test_snapshot_skips_uncreated_document() {
        let store = Arc::new(MemoryStore::new());
        let session = session(store.clone());
        assert!(!session.snapshot().unwrap());

        create(&session);
        assert!(session.snapshot().unwrap());
        assert_eq!(store.list().unwrap()[0].id, "doc");
    }

    #[test]
    fn test_retire_stops_forwarding() {
        let store = Arc::new(MemoryStore::new());
        let session = session(store.clone());
        assert!(session.retire());
        create(&session);
        assert_eq!(store.stored_updates("doc"), 0);
        assert!(!session.retire());
    }
}
