//! Per-connection sync state machine and its async driver.
//!
//! ```text
//! Connecting ──greeting()──► Synchronizing ──first step 2──► Synchronized
//!      │                          │                              │
//!      └──────────────────────────┴──────────── close() ─────────┴──► Closed
//! ```
//! The server opens with its own step 1.  A step 1 from the peer is
//! answered with the diff it is missing; step 2 and update payloads are
//! merged into the document, whose update subscription then fans the
//! change out to the rest of the room.  Presence frames are relayed as is.

use std::fmt::Display;
use std::pin::pin;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use canopy_core::UpdateOrigin;

use crate::broadcast::{Outbound, PeerInfo};
use crate::error::{CollabError, Result};
use crate::protocol::{Message, SyncMessage};
use crate::registry::RoomRegistry;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Synchronizing,
    Synchronized,
    Closed,
}

pub struct SyncConnection {
    id: Uuid,
    session: Arc<Session>,
    state: ConnectionState,
}

impl SyncConnection {
    pub fn new(id: Uuid, session: Arc<Session>) -> Self {
        Self {
            id,
            session,
            state: ConnectionState::Connecting,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// First frame sent to the peer: the server's state vector.
    pub fn greeting(&mut self) -> Result<Vec<u8>> {
        let sv = self.session.document().state_vector()?;
        self.state = ConnectionState::Synchronizing;
        Ok(Message::step1(sv).encode())
    }

    /// Process one inbound frame and return the replies for the sender.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<Vec<Vec<u8>>> {
        if self.state == ConnectionState::Closed {
            return Err(CollabError::Transport("connection closed".into()));
        }
        let document = self.session.document();
        match Message::decode(frame)? {
            Message::Sync(SyncMessage::Step1(sv)) => {
                let diff = document.encode_diff(&sv)?;
                Ok(vec![Message::step2(diff).encode()])
            }
            Message::Sync(SyncMessage::Step2(update)) => {
                document.apply_update(&update, UpdateOrigin::Connection(self.id))?;
                if self.state == ConnectionState::Synchronizing {
                    self.state = ConnectionState::Synchronized;
                    log::debug!("{} synchronized on {}", self.id, self.session.doc_id());
                }
                Ok(Vec::new())
            }
            Message::Sync(SyncMessage::Update(update)) => {
                document.apply_update(&update, UpdateOrigin::Connection(self.id))?;
                Ok(Vec::new())
            }
            Message::Awareness(_) => {
                self.session.group().broadcast(Some(self.id), frame.to_vec());
                Ok(Vec::new())
            }
            Message::Unknown(kind) => {
                log::debug!("ignoring message type {kind} from {}", self.id);
                Ok(Vec::new())
            }
        }
    }

    /// Whether a room frame should be forwarded to this peer.
    pub fn accepts(&self, outbound: &Outbound) -> bool {
        self.state != ConnectionState::Closed && outbound.origin != Some(self.id)
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

/// Drive one connection until the peer goes away.
///
/// `incoming` yields binary frames and ends when the socket closes;
/// `outgoing` accepts frames for the peer.  Malformed frames are logged
/// and skipped.  The peer is always detached from the room on return.
pub async fn serve<I, O>(
    registry: Arc<RoomRegistry>,
    session: Arc<Session>,
    connection_id: Uuid,
    incoming: I,
    outgoing: O,
) -> Result<()>
where
    I: Stream<Item = Vec<u8>>,
    O: Sink<Vec<u8>>,
    O::Error: Display,
{
    let mut incoming = pin!(incoming);
    let mut outgoing = pin!(outgoing);
    let doc_id = session.doc_id().to_string();

    let mut rx = session.group().add_peer(PeerInfo::new(connection_id)).await;
    let mut conn = SyncConnection::new(connection_id, session.clone());
    log::info!("connection {connection_id} opened on {doc_id}");

    let result: Result<()> = async {
        outgoing.send(conn.greeting()?).await.map_err(transport)?;
        loop {
            tokio::select! {
                frame = incoming.next() => {
                    let Some(frame) = frame else { break };
                    match conn.handle_frame(&frame) {
                        Ok(replies) => {
                            for reply in replies {
                                outgoing.send(reply).await.map_err(transport)?;
                            }
                        }
                        Err(e) => log::warn!("bad frame from {connection_id} on {doc_id}: {e}"),
                    }
                }
                outbound = rx.recv() => match outbound {
                    Ok(outbound) => {
                        if conn.accepts(&outbound) {
                            outgoing.send(outbound.frame.to_vec()).await.map_err(transport)?;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("connection {connection_id} lagged by {skipped} frames; resending state");
                        session.group().record_lag(skipped);
                        let state = session.document().encode_state()?;
                        outgoing.send(Message::step2(state).encode()).await.map_err(transport)?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
        Ok(())
    }
    .await;

    conn.close();
    registry.disconnect(&session, connection_id).await;
    log::info!("connection {connection_id} closed on {doc_id}");
    result
}

fn transport(e: impl Display) -> CollabError {
    CollabError::Transport(e.to_string())
}
