//! Document graph model for canopy.
//!
//! A document is a set of pages holding typed constructs, organizers and
//! connections, stored inside a replicated [`yrs`] document so that every
//! replica converges.  [`SharedDocument`] wraps the replica; the [`ops`]
//! modules perform validated structural edits inside its transactions.

pub mod collab;
pub mod error;
pub mod model;
pub mod ops;
pub mod ports;
pub mod schema;

pub use collab::{
    DocUpdate, Graph, GraphMut, ReadGraph, SharedDocument, SubscriptionId, UpdateOrigin,
};
pub use error::{ModelError, Result};
pub use model::{
    Connection, Construct, DocumentMeta, DocumentSummary, ItemResult, Organizer, OrganizerLayout,
    Page, Values,
};
pub use schema::{FieldSchema, PortConfig, Schema};
