//! Fan-out of encoded frames to the connections of one room.
//!
//! Uses a tokio broadcast channel: a send never waits for receivers, and a
//! receiver that falls more than `capacity` frames behind observes
//! `RecvError::Lagged` instead of slowing the others down.  Each frame
//! carries the connection it came from so receivers can skip their own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// A frame queued for every connection of a room.
#[derive(Debug)]
pub struct Outbound {
    /// Connection that produced the frame; `None` for local mutations.
    pub origin: Option<Uuid>,
    pub frame: Arc<[u8]>,
}

/// A connected socket.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub connection_id: Uuid,
    pub connected_at: Instant,
}

impl PeerInfo {
    pub fn new(connection_id: Uuid) -> Self {
        Self {
            connection_id,
            connected_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub frames_sent: u64,
    pub frames_lagged: u64,
    pub active_peers: usize,
}

pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Outbound>>,
    peers: RwLock<HashMap<Uuid, PeerInfo>>,
    capacity: usize,
    frames_sent: AtomicU64,
    frames_lagged: AtomicU64,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: RwLock::new(HashMap::new()),
            capacity,
            frames_sent: AtomicU64::new(0),
            frames_lagged: AtomicU64::new(0),
        }
    }

    /// Register a peer and return its receiver.
    pub async fn add_peer(&self, info: PeerInfo) -> broadcast::Receiver<Arc<Outbound>> {
        let mut peers = self.peers.write().await;
        peers.insert(info.connection_id, info);
        self.sender.subscribe()
    }

    /// Remove a peer; returns the number of peers left.
    pub async fn remove_peer(&self, connection_id: &Uuid) -> usize {
        let mut peers = self.peers.write().await;
        peers.remove(connection_id);
        peers.len()
    }

    /// Queue `frame` for every receiver.  Returns how many receivers it
    /// reached; zero when nobody is connected.
    pub fn broadcast(&self, origin: Option<Uuid>, frame: impl Into<Arc<[u8]>>) -> usize {
        let outbound = Arc::new(Outbound {
            origin,
            frame: frame.into(),
        });
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.sender.send(outbound).unwrap_or(0)
    }

    pub fn record_lag(&self, skipped: u64) {
        self.frames_lagged.fetch_add(skipped, Ordering::Relaxed);
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn has_peer(&self, connection_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(connection_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_lagged: self.frames_lagged.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_remove_peer() {
        let group = BroadcastGroup::new(16);
        let id = Uuid::new_v4();
        let _rx = group.add_peer(PeerInfo::new(id)).await;
        assert!(group.has_peer(&id).await);
        assert_eq!(group.remove_peer(&id).await, 0);
        assert!(!group.has_peer(&id).await);
    }

    #[tokio::test]
    async fn test_fan_out_carries_origin() {
        let group = BroadcastGroup::new(16);
        let alice = Uuid::new_v4();
        let mut rx1 = group.add_peer(PeerInfo::new(alice)).await;
        let mut rx2 = group.add_peer(PeerInfo::new(Uuid::new_v4())).await;

        let reached = group.broadcast(Some(alice), vec![1, 2, 3]);
        assert_eq!(reached, 2);

        let first = rx1.recv().await.unwrap();
        assert_eq!(first.origin, Some(alice));
        assert_eq!(&*rx2.recv().await.unwrap().frame, &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_broadcast_without_peers() {
        let group = BroadcastGroup::new(4);
        assert_eq!(group.broadcast(None, vec![0]), 0);
        assert_eq!(group.stats().await.frames_sent, 1);
    }

    #[tokio::test]
    async fn test_slow_receiver_lags_instead_of_blocking() {
        let group = BroadcastGroup::new(2);
        let mut rx = group.add_peer(PeerInfo::new(Uuid::new_v4())).await;
        for i in 0..5u8 {
            group.broadcast(None, vec![i]);
        }
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert_eq!(n, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        assert_eq!(&*rx.recv().await.unwrap().frame, &[3]);
    }

    #[tokio::test]
    async fn test_stats() {
        let group = BroadcastGroup::new(8);
        let _rx = group.add_peer(PeerInfo::new(Uuid::new_v4())).await;
        group.broadcast(None, vec![1]);
        group.record_lag(2);
        let stats = group.stats().await;
        assert_eq!(
            stats,
            BroadcastStats {
                frames_sent: 1,
                frames_lagged: 2,
                active_peers: 1,
            }
        );
        assert_eq!(group.capacity(), 8);
    }
}
