//! Schema CRUD and migrations.
//!
//! A migration validates against the current schema first, then rewrites
//! the schema and every affected construct and connection in the same
//! transaction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use yrs::ReadTxn;

use crate::collab::{Graph, GraphMut};
use crate::error::{ModelError, Result};
use crate::model::double_option;
use crate::ports;
use crate::schema::{validate_field, validate_port, FieldSchema, PortConfig, Schema};

pub fn list<T: ReadTxn>(g: &Graph<'_, T>) -> Vec<Schema> {
    g.schemas()
}

pub fn get<T: ReadTxn>(g: &Graph<'_, T>, type_name: &str) -> Result<Schema> {
    g.require_schema(type_name)
}

pub fn create(g: &mut GraphMut<'_, '_>, schema: Schema) -> Result<Schema> {
    schema.validate()?;
    if g.schema(&schema.type_name)?.is_some() {
        return Err(ModelError::already_exists("schema", schema.type_name));
    }
    g.put_schema(&schema)?;
    Ok(schema)
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateSchema {
    pub display_name: Option<String>,
    pub color: Option<String>,
    #[serde(deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub fields: Option<Vec<FieldSchema>>,
    pub ports: Option<Vec<PortConfig>>,
}

/// Replace schema attributes.
///
/// A new `fields` list cascades to every construct of the type: values of
/// dropped fields are removed and added fields get their defaults.  Ports
/// still used by connections cannot be dropped (migrate with `removePort`),
/// and a changed port type must stay compatible with every connection on it.
pub fn update(g: &mut GraphMut<'_, '_>, type_name: &str, input: UpdateSchema) -> Result<Schema> {
    let previous = g.require_schema(type_name)?;
    let mut schema = previous.clone();
    if let Some(name) = input.display_name {
        schema.display_name = name;
    }
    if let Some(color) = input.color {
        schema.color = color;
    }
    if let Some(description) = input.description {
        schema.description = description;
    }
    if let Some(fields) = input.fields {
        schema.fields = fields;
    }
    if let Some(ports) = input.ports {
        let kept: HashSet<&str> = ports.iter().map(|p| p.id.as_str()).collect();
        for removed in schema.ports.iter().filter(|p| !kept.contains(p.id.as_str())) {
            if port_usage(g, type_name, &removed.id) > 0 {
                return Err(ModelError::Validation(format!(
                    "port '{}' is in use; migrate with removePort",
                    removed.id
                )));
            }
        }
        schema.ports = ports;
    }
    schema.validate()?;
    check_retyped_ports(g, &previous, &schema)?;

    let dropped: Vec<&str> = previous
        .fields
        .iter()
        .filter(|f| schema.field(&f.name).is_none())
        .map(|f| f.name.as_str())
        .collect();
    let added: Vec<&FieldSchema> = schema
        .fields
        .iter()
        .filter(|f| previous.field(&f.name).is_none())
        .collect();

    g.put_schema(&schema)?;
    let mut affected = 0;
    if !dropped.is_empty() || !added.is_empty() {
        for mut c in g.all_constructs().into_iter().filter(|c| c.type_name == type_name) {
            let mut changed = false;
            for name in &dropped {
                changed |= c.values.remove(*name).is_some();
            }
            for field in &added {
                if !c.values.contains_key(&field.name) {
                    let initial = field.default.clone().unwrap_or(Value::Null);
                    c.values.insert(field.name.clone(), initial);
                    changed = true;
                }
            }
            if changed {
                g.put_construct(&c)?;
                affected += 1;
            }
        }
    }
    log::debug!("schema {type_name} updated; {affected} constructs rewritten");
    Ok(schema)
}

/// Every connection on a port whose type changed must still be allowed.
fn check_retyped_ports<T: ReadTxn>(g: &Graph<'_, T>, previous: &Schema, schema: &Schema) -> Result<()> {
    let retyped: HashSet<&str> = schema
        .ports
        .iter()
        .filter(|p| {
            previous
                .port(&p.id)
                .is_some_and(|old| old.port_type != p.port_type)
        })
        .map(|p| p.id.as_str())
        .collect();
    if retyped.is_empty() {
        return Ok(());
    }

    let type_name = schema.type_name.as_str();
    let constructs = g.all_constructs();
    let port_type_of = |page_id: &str, sem: &str, port_id: &str| -> Result<Option<String>> {
        let Some(c) = constructs
            .iter()
            .find(|c| c.page_id == page_id && c.semantic_id == sem)
        else {
            return Ok(None);
        };
        if c.type_name == type_name {
            return Ok(schema.port(port_id).map(|p| p.port_type.clone()));
        }
        Ok(g
            .schema(&c.type_name)?
            .and_then(|other| other.port(port_id).map(|p| p.port_type.clone())))
    };
    let typed = typed_semantic_ids(g, type_name);

    for conn in g.all_connections() {
        let hits = |sem: &str, port: &str| {
            retyped.contains(port) && typed.contains(&(conn.page_id.clone(), sem.to_string()))
        };
        if !hits(&conn.source_semantic_id, &conn.source_port_id)
            && !hits(&conn.target_semantic_id, &conn.target_port_id)
        {
            continue;
        }
        let source = port_type_of(&conn.page_id, &conn.source_semantic_id, &conn.source_port_id)?;
        let target = port_type_of(&conn.page_id, &conn.target_semantic_id, &conn.target_port_id)?;
        if let (Some(source), Some(target)) = (source, target) {
            ports::can_connect(&source, &target).map_err(|reason| {
                ModelError::Validation(format!(
                    "port type change breaks {}.{} -> {}.{}: {reason}",
                    conn.source_semantic_id,
                    conn.source_port_id,
                    conn.target_semantic_id,
                    conn.target_port_id
                ))
            })?;
        }
    }
    Ok(())
}

/// Delete a schema no construct uses.
pub fn delete(g: &mut GraphMut<'_, '_>, type_name: &str) -> Result<bool> {
    g.require_schema(type_name)?;
    let in_use = g
        .all_constructs()
        .iter()
        .filter(|c| c.type_name == type_name)
        .count();
    if in_use > 0 {
        return Err(ModelError::Validation(format!(
            "schema '{type_name}' is used by {in_use} construct(s)"
        )));
    }
    Ok(g.remove_schema(type_name))
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(
    tag = "operation",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Migration {
    RenameField { old_name: String, new_name: String },
    RemoveField { name: String },
    AddField { field: FieldSchema },
    RenamePort { old_id: String, new_id: String },
    RemovePort { id: String },
    AddPort { port: PortConfig },
    RenameType { new_type_name: String },
}

const OPERATIONS: &[&str] = &[
    "renameField",
    "removeField",
    "addField",
    "renamePort",
    "removePort",
    "addPort",
    "renameType",
];

impl Migration {
    /// Parse a request body, mapping problems onto the error taxonomy:
    /// a missing `operation` or parameter is MISSING_FIELD, an unknown
    /// operation or malformed parameter is VALIDATION_ERROR.
    pub fn parse(body: Value) -> Result<Self> {
        let op = match body.get("operation") {
            Some(Value::String(op)) => op.clone(),
            Some(_) => return Err(ModelError::Validation("operation must be a string".into())),
            None => return Err(ModelError::MissingField("operation".into())),
        };
        if !OPERATIONS.contains(&op.as_str()) {
            return Err(ModelError::Validation(format!(
                "unknown migration operation '{op}'"
            )));
        }
        serde_json::from_value(body).map_err(ModelError::invalid_body)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::RenameField { .. } => "renameField",
            Self::RemoveField { .. } => "removeField",
            Self::AddField { .. } => "addField",
            Self::RenamePort { .. } => "renamePort",
            Self::RemovePort { .. } => "removePort",
            Self::AddPort { .. } => "addPort",
            Self::RenameType { .. } => "renameType",
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub type_name: String,
    pub operation: &'static str,
    pub affected_constructs: usize,
    pub affected_connections: usize,
}

/// Connections using `port_id` on any construct of `type_name`.
fn port_usage<T: ReadTxn>(g: &Graph<'_, T>, type_name: &str, port_id: &str) -> usize {
    let typed = typed_semantic_ids(g, type_name);
    g.all_connections()
        .iter()
        .filter(|c| {
            (c.source_port_id == port_id && typed.contains(&(c.page_id.clone(), c.source_semantic_id.clone())))
                || (c.target_port_id == port_id
                    && typed.contains(&(c.page_id.clone(), c.target_semantic_id.clone())))
        })
        .count()
}

/// `(page, semanticId)` of every construct of `type_name`.
fn typed_semantic_ids<T: ReadTxn>(g: &Graph<'_, T>, type_name: &str) -> HashSet<(String, String)> {
    g.all_constructs()
        .into_iter()
        .filter(|c| c.type_name == type_name)
        .map(|c| (c.page_id, c.semantic_id))
        .collect()
}

pub fn migrate(g: &mut GraphMut<'_, '_>, type_name: &str, migration: Migration) -> Result<MigrationSummary> {
    let mut schema = g.require_schema(type_name)?;
    let operation = migration.name();
    let mut summary = MigrationSummary {
        type_name: type_name.to_string(),
        operation,
        affected_constructs: 0,
        affected_connections: 0,
    };
    let constructs: Vec<_> = g
        .all_constructs()
        .into_iter()
        .filter(|c| c.type_name == type_name)
        .collect();

    match migration {
        Migration::RenameField { old_name, new_name } => {
            if schema.field(&old_name).is_none() {
                return Err(ModelError::not_found("field", old_name));
            }
            if new_name.trim().is_empty() {
                return Err(ModelError::MissingField("newName".into()));
            }
            if schema.field(&new_name).is_some() {
                return Err(ModelError::already_exists("field", new_name));
            }
            for field in schema.fields.iter_mut().filter(|f| f.name == old_name) {
                field.name = new_name.clone();
            }
            g.put_schema(&schema)?;
            for mut c in constructs {
                if let Some(value) = c.values.remove(&old_name) {
                    c.values.insert(new_name.clone(), value);
                    g.put_construct(&c)?;
                    summary.affected_constructs += 1;
                }
            }
        }
        Migration::RemoveField { name } => {
            if schema.field(&name).is_none() {
                return Err(ModelError::not_found("field", name));
            }
            schema.fields.retain(|f| f.name != name);
            g.put_schema(&schema)?;
            for mut c in constructs {
                if c.values.remove(&name).is_some() {
                    g.put_construct(&c)?;
                    summary.affected_constructs += 1;
                }
            }
        }
        Migration::AddField { field } => {
            if schema.field(&field.name).is_some() {
                return Err(ModelError::already_exists("field", field.name));
            }
            if field.name.trim().is_empty() {
                return Err(ModelError::MissingField("field.name".into()));
            }
            validate_field(&field)?;
            let initial = field.default.clone().unwrap_or(Value::Null);
            let name = field.name.clone();
            schema.fields.push(field);
            g.put_schema(&schema)?;
            for mut c in constructs {
                if !c.values.contains_key(&name) {
                    c.values.insert(name.clone(), initial.clone());
                    g.put_construct(&c)?;
                    summary.affected_constructs += 1;
                }
            }
        }
        Migration::RenamePort { old_id, new_id } => {
            if schema.port(&old_id).is_none() {
                return Err(ModelError::not_found("port", old_id));
            }
            if new_id.trim().is_empty() {
                return Err(ModelError::MissingField("newId".into()));
            }
            if schema.port(&new_id).is_some() {
                return Err(ModelError::already_exists("port", new_id));
            }
            for port in schema.ports.iter_mut().filter(|p| p.id == old_id) {
                port.id = new_id.clone();
            }
            g.put_schema(&schema)?;

            let typed = typed_semantic_ids(g, type_name);
            let mut touched: HashSet<(String, String)> = HashSet::new();
            for mut conn in g.all_connections() {
                let source_key = (conn.page_id.clone(), conn.source_semantic_id.clone());
                let target_key = (conn.page_id.clone(), conn.target_semantic_id.clone());
                let mut changed = false;
                if conn.source_port_id == old_id && typed.contains(&source_key) {
                    conn.source_port_id = new_id.clone();
                    touched.insert(source_key);
                    changed = true;
                }
                if conn.target_port_id == old_id && typed.contains(&target_key) {
                    conn.target_port_id = new_id.clone();
                    touched.insert(target_key);
                    changed = true;
                }
                if changed {
                    g.put_connection(&conn)?;
                    summary.affected_connections += 1;
                }
            }
            summary.affected_constructs = touched.len();
        }
        Migration::RemovePort { id } => {
            if schema.port(&id).is_none() {
                return Err(ModelError::not_found("port", id));
            }
            schema.ports.retain(|p| p.id != id);
            g.put_schema(&schema)?;

            let typed = typed_semantic_ids(g, type_name);
            let mut touched: HashSet<(String, String)> = HashSet::new();
            for conn in g.all_connections() {
                let source_key = (conn.page_id.clone(), conn.source_semantic_id.clone());
                let target_key = (conn.page_id.clone(), conn.target_semantic_id.clone());
                let hits_source = conn.source_port_id == id && typed.contains(&source_key);
                let hits_target = conn.target_port_id == id && typed.contains(&target_key);
                if hits_source {
                    touched.insert(source_key);
                }
                if hits_target {
                    touched.insert(target_key);
                }
                if (hits_source || hits_target) && g.remove_connection(&conn.id) {
                    summary.affected_connections += 1;
                }
            }
            summary.affected_constructs = touched.len();
        }
        Migration::AddPort { port } => {
            if schema.port(&port.id).is_some() {
                return Err(ModelError::already_exists("port", port.id));
            }
            validate_port(&port)?;
            schema.ports.push(port);
            g.put_schema(&schema)?;
        }
        Migration::RenameType { new_type_name } => {
            if new_type_name.trim().is_empty() {
                return Err(ModelError::MissingField("newTypeName".into()));
            }
            if new_type_name == type_name {
                return Err(ModelError::Validation("new type name is unchanged".into()));
            }
            if g.schema(&new_type_name)?.is_some() {
                return Err(ModelError::already_exists("schema", new_type_name));
            }
            schema.type_name = new_type_name.clone();
            g.remove_schema(type_name);
            g.put_schema(&schema)?;
            for mut c in constructs {
                c.type_name = new_type_name.clone();
                g.put_construct(&c)?;
                summary.affected_constructs += 1;
            }
            summary.type_name = new_type_name;
        }
    }

    log::debug!(
        "migration {operation} on {type_name}: {} constructs, {} connections",
        summary.affected_constructs,
        summary.affected_connections
    );
    Ok(summary)
}
