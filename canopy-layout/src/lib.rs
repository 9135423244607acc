//! # canopy-layout: Geometry and layout algorithms for canopy documents
//!
//! Pure geometry: nothing in this crate knows about the replicated document.
//! Callers project their pages into the plain node/edge types defined here,
//! run an algorithm, and write the resulting positions back in one
//! transaction.
//!
//! ## Modules
//!
//! - [`geometry`]: `Point`, `Size`, `Rect` and default node dimensions
//! - [`spatial`]: uniform-grid index for overlap queries
//! - [`placement`]: auto-position for newly created nodes
//! - [`nesting`]: organizer nesting, absolute positions, bounds, detachment
//! - [`flow`]: layered (flow) layout along connections
//! - [`arrange`]: constraint arrangement and force relaxation

pub mod geometry;
pub mod spatial;
pub mod placement;
pub mod nesting;
pub mod flow;
pub mod arrange;

use thiserror::Error;

pub use geometry::{is_dimension, Point, Rect, Size, DEFAULT_NODE_SIZE, MAX_COORDINATE};
pub use spatial::SpatialHash;
pub use placement::{auto_position, PlacementConfig};
pub use nesting::{Detached, GeoKind, GeoNode, NodeArena, MAX_NESTING_DEPTH, ORGANIZER_HEADER, ORGANIZER_PADDING};
pub use flow::{flow_layout, FlowDirection, FlowEdge, FlowNode, FlowOptions, FlowResult};
pub use arrange::{arrange, Alignment, ArrangeNode, ArrangeOptions, ArrangeStrategy, Axis, Constraint};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Unknown node: {0}")]
    UnknownNode(String),
    #[error("Invalid layout parameter: {0}")]
    InvalidParameter(String),
}
