//! Construct type schemas: fields and ports.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::model::Values;
use crate::ports;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Text,
    Number,
    Boolean,
    Enum,
    Date,
    Url,
    Json,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayTier {
    Pill,
    Minimal,
    Details,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_tier: Option<DisplayTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortSide {
    Left,
    #[default]
    Right,
    Top,
    Bottom,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortConfig {
    pub id: String,
    pub port_type: String,
    #[serde(default)]
    pub position: PortSide,
    /// Fraction along the side, 0 to 1.
    #[serde(default = "default_offset")]
    pub offset: f64,
    #[serde(default)]
    pub label: String,
}

fn default_offset() -> f64 {
    0.5
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub type_name: String,
    pub display_name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn port(&self, id: &str) -> Option<&PortConfig> {
        self.ports.iter().find(|p| p.id == id)
    }

    /// Initial values for a new construct: each field's default, or null.
    pub fn default_values(&self) -> Values {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.default.clone().unwrap_or(Value::Null)))
            .collect()
    }

    /// Structural checks run before a schema is stored.
    pub fn validate(&self) -> Result<()> {
        if self.type_name.trim().is_empty() {
            return Err(ModelError::MissingField("typeName".into()));
        }
        if self.display_name.trim().is_empty() {
            return Err(ModelError::MissingField("displayName".into()));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(ModelError::Validation("field name must not be empty".into()));
            }
            if !names.insert(field.name.as_str()) {
                return Err(ModelError::Validation(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
            validate_field(field)?;
        }

        let mut ids = HashSet::new();
        for port in &self.ports {
            if !ids.insert(port.id.as_str()) {
                return Err(ModelError::Validation(format!(
                    "duplicate port '{}'",
                    port.id
                )));
            }
            validate_port(port)?;
        }
        Ok(())
    }
}

pub(crate) fn validate_field(field: &FieldSchema) -> Result<()> {
    if field.field_type == FieldType::Enum
        && field.options.as_ref().is_none_or(|o| o.is_empty())
    {
        return Err(ModelError::Validation(format!(
            "enum field '{}' needs options",
            field.name
        )));
    }
    Ok(())
}

pub(crate) fn validate_port(port: &PortConfig) -> Result<()> {
    if port.id.trim().is_empty() {
        return Err(ModelError::Validation("port id must not be empty".into()));
    }
    if ports::port_type(&port.port_type).is_none() {
        return Err(ModelError::Validation(format!(
            "unknown port type '{}' on port '{}'",
            port.port_type, port.id
        )));
    }
    if !(0.0..=1.0).contains(&port.offset) {
        return Err(ModelError::Validation(format!(
            "port '{}' offset must be between 0 and 1",
            port.id
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use serde_json::json;

    /// A service type with a name field and flow ports.
    pub fn service() -> Schema {
        serde_json::from_value(json!({
            "typeName": "service",
            "displayName": "Service",
            "color": "#336699",
            "fields": [
                {"name": "name", "type": "string", "default": ""},
                {"name": "replicas", "type": "number", "default": 1}
            ],
            "ports": [
                {"id": "in", "portType": "flow-in", "position": "left"},
                {"id": "out", "portType": "flow-out", "position": "right"},
                {"id": "peer", "portType": "symmetric", "position": "bottom"}
            ]
        }))
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let s = fixtures::service();
        let v = s.default_values();
        assert_eq!(v["name"], "");
        assert_eq!(v["replicas"], 1);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut s = fixtures::service();
        s.fields.push(s.fields[0].clone());
        assert!(matches!(s.validate(), Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_port_type() {
        let mut s = fixtures::service();
        s.ports[0].port_type = "teleport".into();
        assert!(matches!(s.validate(), Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_validate_missing_type_name() {
        let mut s = fixtures::service();
        s.type_name = " ".into();
        assert_eq!(s.validate(), Err(ModelError::MissingField("typeName".into())));
    }

    #[test]
    fn test_port_defaults() {
        let s = fixtures::service();
        assert_eq!(s.port("in").unwrap().offset, 0.5);
        assert_eq!(s.port("peer").unwrap().position, PortSide::Bottom);
    }
}
