//! Structural edits and derived views over a document graph.
//!
//! Each operation validates everything it needs before its first write, so
//! a failed call leaves the graph unchanged.  Bulk calls run their items in
//! order inside the caller's transaction and report every item separately.

pub mod batch;
pub mod connections;
pub mod constructs;
pub mod documents;
pub mod layout;
pub mod organizers;
pub mod pages;
pub mod schemas;
pub mod views;

use canopy_layout::{is_dimension, Point, Size, MAX_COORDINATE};
use uuid::Uuid;

use crate::error::{ModelError, Result};

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Unwrap a required request field.
pub(crate) fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| ModelError::MissingField(field.to_string()))
}

/// Unwrap a required, non-blank string field.
pub(crate) fn required_str(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ModelError::MissingField(field.to_string())),
    }
}

pub(crate) fn check_position(field: &str, position: Option<&Point>) -> Result<()> {
    match position {
        Some(p) if !p.is_on_canvas() => Err(ModelError::Validation(format!(
            "{field} must be finite and within {MAX_COORDINATE} of the origin"
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn check_size(field: &str, size: Option<&Size>) -> Result<()> {
    match size {
        Some(s) if !s.is_valid() => Err(ModelError::Validation(format!(
            "{field} dimensions must be positive and at most {MAX_COORDINATE}"
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn check_dimension(field: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !is_dimension(v) => Err(ModelError::Validation(format!(
            "{field} must be positive and at most {MAX_COORDINATE}"
        ))),
        _ => Ok(()),
    }
}
