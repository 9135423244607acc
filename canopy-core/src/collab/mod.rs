//! Replicated document wrapper.
//!
//! [`SharedDocument`] owns a Yrs `Doc` and is the only way to touch it.
//! Every transaction, local or remote, runs behind one gate so two
//! mutations on the same document never interleave.  After a transaction
//! that changed something, the encoded update is handed to every
//! subscriber together with its [`UpdateOrigin`], still inside the gate, so
//! subscribers observe updates in commit order.

mod graph;

pub use graph::{Graph, GraphMut};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::error::{ModelError, Result};
use graph::Maps;

/// An update carrying no changes encodes as two empty varint lists.
const EMPTY_UPDATE: [u8; 2] = [0, 0];

/// Where a change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateOrigin {
    /// A structural edit made through the mutation API.
    Local,
    /// A binary update received from a socket connection.
    Connection(Uuid),
    /// State restored from persistence.
    Load,
}

/// A committed change.
#[derive(Clone, Debug)]
pub struct DocUpdate {
    pub update: Arc<[u8]>,
    pub origin: UpdateOrigin,
}

pub type SubscriptionId = u64;

/// The graph view handed to [`SharedDocument::read`] callbacks.
pub type ReadGraph<'a, 'doc> = Graph<'a, yrs::Transaction<'doc>>;

type UpdateCallback = Arc<dyn Fn(&DocUpdate) + Send + Sync>;

pub struct SharedDocument {
    doc: Doc,
    maps: Maps,
    gate: Mutex<()>,
    observers: Mutex<Vec<(SubscriptionId, UpdateCallback)>>,
    next_subscription: AtomicU64,
}

impl Default for SharedDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedDocument {
    pub fn new() -> Self {
        let doc = Doc::new();
        let maps = Maps::new(&doc);
        Self {
            doc,
            maps,
            gate: Mutex::new(()),
            observers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Rebuild a document from a persisted state update.
    pub fn from_state(state: &[u8]) -> Result<Self> {
        let shared = Self::new();
        shared.apply_update(state, UpdateOrigin::Load)?;
        Ok(shared)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.gate.lock().map_err(|_| ModelError::Poisoned)
    }

    /// Run `f` as one atomic transaction.
    ///
    /// Operations validate before they write, so an `Err` from `f` normally
    /// leaves the document untouched; anything written before the error is
    /// still committed and broadcast.
    pub fn transact<R>(
        &self,
        origin: UpdateOrigin,
        f: impl FnOnce(&mut GraphMut<'_, '_>) -> Result<R>,
    ) -> Result<R> {
        let _gate = self.lock()?;
        let (result, update) = {
            let mut graph = Graph::new(self.doc.transact_mut(), &self.maps);
            let result = f(&mut graph);
            let update = graph.txn.encode_update_v1();
            (result, update)
        };
        self.publish(update, origin);
        result
    }

    /// Run `f` against a read-only snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&ReadGraph<'_, '_>) -> Result<R>) -> Result<R> {
        let _gate = self.lock()?;
        let graph = Graph::new(self.doc.transact(), &self.maps);
        f(&graph)
    }

    /// Merge a binary update.  Returns whether the document changed;
    /// duplicates and already-known updates return `false`.
    pub fn apply_update(&self, update: &[u8], origin: UpdateOrigin) -> Result<bool> {
        let decoded =
            Update::decode_v1(update).map_err(|e| ModelError::Replication(e.to_string()))?;
        let _gate = self.lock()?;
        let delta = {
            let mut txn = self.doc.transact_mut();
            txn.apply_update(decoded)
                .map_err(|e| ModelError::Replication(e.to_string()))?;
            txn.encode_update_v1()
        };
        Ok(self.publish(delta, origin))
    }

    /// Notify subscribers when `update` carries changes.
    fn publish(&self, update: Vec<u8>, origin: UpdateOrigin) -> bool {
        if update.as_slice() == EMPTY_UPDATE {
            return false;
        }
        let event = DocUpdate {
            update: update.into(),
            origin,
        };
        let observers: Vec<UpdateCallback> = match self.observers.lock() {
            Ok(list) => list.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => {
                log::error!("observer list poisoned; update not published");
                return true;
            }
        };
        for callback in observers {
            callback(&event);
        }
        true
    }

    /// Register `callback` for every committed change.  It runs while the
    /// document gate is held and must not start a transaction on this
    /// document.
    pub fn on_update(&self, callback: impl Fn(&DocUpdate) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        match self.observers.lock() {
            Ok(mut list) => list.push((id, Arc::new(callback))),
            Err(poisoned) => poisoned.into_inner().push((id, Arc::new(callback))),
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut list = match self.observers.lock() {
            Ok(list) => list,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        list.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Encoded state vector.
    pub fn state_vector(&self) -> Result<Vec<u8>> {
        let _gate = self.lock()?;
        let txn = self.doc.transact();
        Ok(txn.state_vector().encode_v1())
    }

    /// Full state as a single update.
    pub fn encode_state(&self) -> Result<Vec<u8>> {
        let _gate = self.lock()?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&StateVector::default()))
    }

    /// Everything the holder of `state_vector` is missing.
    pub fn encode_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| ModelError::Replication(e.to_string()))?;
        let _gate = self.lock()?;
        let txn = self.doc.transact();
        Ok(txn.encode_diff_v1(&sv))
    }

    /// Whether the document has been created (has metadata).
    pub fn is_initialized(&self) -> bool {
        self.read(|g| Ok(g.is_initialized())).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Page;
    use std::sync::atomic::AtomicUsize;

    fn page(id: &str, order: i64) -> Page {
        Page {
            id: id.into(),
            name: id.to_uppercase(),
            order,
            description: None,
        }
    }

    fn add_page(doc: &SharedDocument, id: &str, order: i64) {
        doc.transact(UpdateOrigin::Local, |g| g.put_page(&page(id, order)))
            .unwrap();
    }

    #[test]
    fn test_transact_publishes_update() {
        let doc = SharedDocument::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        doc.on_update(move |u| {
            assert_eq!(u.origin, UpdateOrigin::Local);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        add_page(&doc, "p1", 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_transaction_not_published() {
        let doc = SharedDocument::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        doc.on_update(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        doc.transact(UpdateOrigin::Local, |g| Ok(g.pages().len()))
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_apply_update_duplicate_is_unchanged() {
        let a = SharedDocument::new();
        let b = SharedDocument::new();
        add_page(&a, "p1", 0);
        let state = a.encode_state().unwrap();
        assert!(b.apply_update(&state, UpdateOrigin::Load).unwrap());
        assert!(!b.apply_update(&state, UpdateOrigin::Load).unwrap());
    }

    #[test]
    fn test_convergence_any_order() {
        let a = SharedDocument::new();
        let b = SharedDocument::new();
        let c = SharedDocument::new();
        let updates = Arc::new(Mutex::new(Vec::new()));
        for doc in [&a, &b] {
            let sink = updates.clone();
            doc.on_update(move |u| sink.lock().unwrap().push(u.update.clone()));
        }
        add_page(&a, "pa", 0);
        add_page(&b, "pb", 1);
        add_page(&a, "pa2", 2);

        let all: Vec<Arc<[u8]>> = updates.lock().unwrap().clone();
        // c receives everything reversed and duplicated, a and b exchange.
        for u in all.iter().rev().chain(all.iter()) {
            c.apply_update(u, UpdateOrigin::Load).unwrap();
        }
        for u in &all {
            a.apply_update(u, UpdateOrigin::Load).unwrap();
            b.apply_update(u, UpdateOrigin::Load).unwrap();
        }

        let ids = |d: &SharedDocument| {
            d.read(|g| Ok(g.pages().into_iter().map(|p| p.id).collect::<Vec<_>>()))
                .unwrap()
        };
        assert_eq!(ids(&a), vec!["pa", "pb", "pa2"]);
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(ids(&a), ids(&c));
    }

    #[test]
    fn test_diff_against_state_vector() {
        let a = SharedDocument::new();
        let b = SharedDocument::new();
        add_page(&a, "p1", 0);
        b.apply_update(&a.encode_state().unwrap(), UpdateOrigin::Load)
            .unwrap();
        add_page(&a, "p2", 1);

        let diff = a.encode_diff(&b.state_vector().unwrap()).unwrap();
        assert!(b.apply_update(&diff, UpdateOrigin::Load).unwrap());
        assert_eq!(b.read(|g| Ok(g.pages().len())).unwrap(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let doc = SharedDocument::new();
        let id = doc.on_update(|_| {});
        assert_eq!(doc.subscriber_count(), 1);
        assert!(doc.unsubscribe(id));
        assert!(!doc.unsubscribe(id));
        assert_eq!(doc.subscriber_count(), 0);
    }

    #[test]
    fn test_malformed_update_rejected() {
        let doc = SharedDocument::new();
        let err = doc
            .apply_update(&[0xff, 0xff, 0xff], UpdateOrigin::Load)
            .unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
