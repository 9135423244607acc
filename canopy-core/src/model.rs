//! Entities stored in the replicated document.
//!
//! Every entity is kept as a JSON string under its id in one of the
//! document's top-level maps, so concurrent edits to different entities
//! never conflict and an edit to one entity is last-writer-wins.

use std::time::{SystemTime, UNIX_EPOCH};

use canopy_layout::{Point, Size};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Version of the entity layout written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_TITLE: &str = "Untitled Project";
pub const DEFAULT_PAGE_NAME: &str = "Main";
pub const DEFAULT_ORGANIZER_COLOR: &str = "#7c7fff";

/// Field values of a construct, keyed by field name.
pub type Values = Map<String, Value>;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub version: u32,
    pub created_at: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub name: String,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Construct {
    pub id: String,
    pub semantic_id: String,
    pub page_id: String,
    pub type_name: String,
    #[serde(default)]
    pub values: Values,
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrganizerLayout {
    #[default]
    Freeform,
    Stack,
    Grid,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Organizer {
    pub id: String,
    pub page_id: String,
    pub name: String,
    pub color: String,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub layout: OrganizerLayout,
    #[serde(default)]
    pub collapsed: bool,
    /// Semantic id of the construct this organizer is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Organizer {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub page_id: String,
    pub source_semantic_id: String,
    pub source_port_id: String,
    pub target_semantic_id: String,
    pub target_port_id: String,
}

impl Connection {
    pub fn touches(&self, semantic_id: &str) -> bool {
        self.source_semantic_id == semantic_id || self.target_semantic_id == semantic_id
    }
}

/// Listing entry reported by persistence.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub page_count: usize,
    pub updated_at: u64,
}

/// Outcome of one item in a bulk or batch call.
#[derive(Clone, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult<T> {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> ItemResult<T> {
    pub fn from_result(index: usize, result: crate::Result<T>) -> Self {
        match result {
            Ok(value) => Self {
                index,
                success: true,
                result: Some(value),
                error: None,
                code: None,
            },
            Err(e) => Self {
                index,
                success: false,
                result: None,
                error: Some(e.to_string()),
                code: Some(e.code()),
            },
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in patch bodies.
pub(crate) fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_construct_wire_shape() {
        let c = Construct {
            id: "c1".into(),
            semantic_id: "svc-0001".into(),
            page_id: "p1".into(),
            type_name: "service".into(),
            values: Map::new(),
            position: Point::new(1.0, 2.0),
            parent_id: None,
            size: None,
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["semanticId"], "svc-0001");
        assert_eq!(v["position"], json!({"x": 1.0, "y": 2.0}));
        assert!(v.get("parentId").is_none());
    }

    #[test]
    fn test_organizer_defaults() {
        let o: Organizer = serde_json::from_value(json!({
            "id": "o1", "pageId": "p1", "name": "G", "color": "#fff",
            "position": {"x": 0.0, "y": 0.0}, "width": 10.0, "height": 10.0
        }))
        .unwrap();
        assert_eq!(o.layout, OrganizerLayout::Freeform);
        assert!(!o.collapsed);
        assert!(o.attached_to.is_none());
    }

    #[test]
    fn test_item_result_failure() {
        let r: ItemResult<u32> =
            ItemResult::from_result(3, Err(crate::ModelError::not_found("page", "x")));
        assert!(!r.success);
        assert_eq!(r.code, Some("NOT_FOUND"));
        assert_eq!(r.index, 3);
    }
}
