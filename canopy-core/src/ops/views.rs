//! Read-only projections of a whole document.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use yrs::ReadTxn;

use crate::collab::Graph;
use crate::error::{ModelError, Result};
use crate::model::{Organizer, Values};
use crate::schema::Schema;

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub port: String,
    pub semantic_id: String,
    pub remote_port: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompiledConstruct {
    pub semantic_id: String,
    pub type_name: String,
    pub values: Values,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    pub outgoing: Vec<Relationship>,
    pub incoming: Vec<Relationship>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompiledOrganizer {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
    /// Semantic ids of constructs directly inside the organizer.
    pub members: Vec<String>,
    /// Ids of organizers nested directly inside the organizer.
    pub children: Vec<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPage {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub constructs: Vec<CompiledConstruct>,
    pub organizers: Vec<CompiledOrganizer>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompiledDocument {
    pub id: String,
    pub title: String,
    pub version: u32,
    pub pages: Vec<CompiledPage>,
    /// Schemas with at least one construct, in type name order.
    pub schemas: Vec<Schema>,
}

/// Structured export of every page, keyed by semantic ids rather than
/// internal ids so the output is stable across sessions.
pub fn compile<T: ReadTxn>(g: &Graph<'_, T>) -> Result<CompiledDocument> {
    let meta = g
        .meta()?
        .ok_or_else(|| ModelError::not_found("document", "meta"))?;
    let mut used_types = BTreeSet::new();
    let mut pages = Vec::new();

    for page in g.pages() {
        let constructs = g.constructs_on(&page.id);
        let organizers = g.organizers_on(&page.id);
        let connections = g.connections_on(&page.id);

        let mut compiled = Vec::with_capacity(constructs.len());
        for c in &constructs {
            used_types.insert(c.type_name.clone());
            let outgoing = connections
                .iter()
                .filter(|e| e.source_semantic_id == c.semantic_id)
                .map(|e| Relationship {
                    port: e.source_port_id.clone(),
                    semantic_id: e.target_semantic_id.clone(),
                    remote_port: e.target_port_id.clone(),
                })
                .collect();
            let incoming = connections
                .iter()
                .filter(|e| e.target_semantic_id == c.semantic_id)
                .map(|e| Relationship {
                    port: e.target_port_id.clone(),
                    semantic_id: e.source_semantic_id.clone(),
                    remote_port: e.source_port_id.clone(),
                })
                .collect();
            compiled.push(CompiledConstruct {
                semantic_id: c.semantic_id.clone(),
                type_name: c.type_name.clone(),
                values: c.values.clone(),
                organizer: c.parent_id.clone(),
                outgoing,
                incoming,
            });
        }

        let compiled_organizers = organizers
            .iter()
            .map(|o| compile_organizer(o, &constructs, &organizers))
            .collect();

        pages.push(CompiledPage {
            id: page.id,
            name: page.name,
            description: page.description,
            constructs: compiled,
            organizers: compiled_organizers,
        });
    }

    let schemas = g
        .schemas()
        .into_iter()
        .filter(|s| used_types.contains(&s.type_name))
        .collect();

    Ok(CompiledDocument {
        id: meta.id,
        title: meta.title,
        version: meta.version,
        pages,
        schemas,
    })
}

fn compile_organizer(
    organizer: &Organizer,
    constructs: &[crate::model::Construct],
    organizers: &[Organizer],
) -> CompiledOrganizer {
    let members = constructs
        .iter()
        .filter(|c| c.parent_id.as_deref() == Some(organizer.id.as_str()))
        .map(|c| c.semantic_id.clone())
        .collect();
    let children = organizers
        .iter()
        .filter(|o| o.parent_id.as_deref() == Some(organizer.id.as_str()))
        .map(|o| o.id.clone())
        .collect();
    CompiledOrganizer {
        id: organizer.id.clone(),
        name: organizer.name.clone(),
        description: organizer.description.clone(),
        attached_to: organizer.attached_to.clone(),
        members,
        children,
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub id: String,
    pub name: String,
    pub constructs: usize,
    pub organizers: usize,
    pub connections: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: String,
    pub title: String,
    pub pages: Vec<PageSummary>,
    pub total_constructs: usize,
    pub total_connections: usize,
    /// Construct count per type name.
    pub types: BTreeMap<String, usize>,
}

pub fn summary<T: ReadTxn>(g: &Graph<'_, T>) -> Result<GraphSummary> {
    let meta = g
        .meta()?
        .ok_or_else(|| ModelError::not_found("document", "meta"))?;
    let mut types = BTreeMap::new();
    for c in g.all_constructs() {
        *types.entry(c.type_name).or_insert(0) += 1;
    }
    let pages: Vec<PageSummary> = g
        .pages()
        .into_iter()
        .map(|p| PageSummary {
            constructs: g.constructs_on(&p.id).len(),
            organizers: g.organizers_on(&p.id).len(),
            connections: g.connections_on(&p.id).len(),
            id: p.id,
            name: p.name,
        })
        .collect();
    Ok(GraphSummary {
        id: meta.id,
        title: meta.title,
        total_constructs: pages.iter().map(|p| p.constructs).sum(),
        total_connections: pages.iter().map(|p| p.connections).sum(),
        pages,
        types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::UpdateOrigin;
    use crate::ops::connections::{self, ConnectRequest};
    use crate::ops::constructs::{self, CreateConstruct};
    use crate::ops::organizers::{self, CreateOrganizer};
    use crate::ops::testing;

    fn seeded() -> crate::collab::SharedDocument {
        let doc = testing::document();
        doc.transact(UpdateOrigin::Local, |g| {
            for sem in ["api", "db"] {
                constructs::create(
                    g,
                    CreateConstruct {
                        type_name: Some("service".into()),
                        semantic_id: Some(sem.into()),
                        ..CreateConstruct::default()
                    },
                )?;
            }
            connections::connect(g, ConnectRequest::new("api", "out", "db", "in"))?;
            organizers::create(
                g,
                CreateOrganizer {
                    name: Some("Backend".into()),
                    member_ids: vec!["db".into()],
                    ..CreateOrganizer::default()
                },
            )
        })
        .unwrap();
        doc
    }

    #[test]
    fn test_compile_relationships() {
        let doc = seeded();
        let compiled = doc.read(|g| compile(g)).unwrap();
        assert_eq!(compiled.title, "Untitled Project");
        assert_eq!(compiled.schemas.len(), 1);
        let page = &compiled.pages[0];
        let api = page.constructs.iter().find(|c| c.semantic_id == "api").unwrap();
        assert_eq!(
            api.outgoing,
            vec![Relationship {
                port: "out".into(),
                semantic_id: "db".into(),
                remote_port: "in".into(),
            }]
        );
        let db = page.constructs.iter().find(|c| c.semantic_id == "db").unwrap();
        assert_eq!(db.incoming.len(), 1);
        assert_eq!(page.organizers[0].members, vec!["db".to_string()]);
        assert_eq!(db.organizer.as_deref(), Some(page.organizers[0].id.as_str()));
    }

    #[test]
    fn test_summary_counts() {
        let doc = seeded();
        let s = doc.read(|g| summary(g)).unwrap();
        assert_eq!(s.total_constructs, 2);
        assert_eq!(s.total_connections, 1);
        assert_eq!(s.pages[0].organizers, 1);
        assert_eq!(s.types.get("service"), Some(&2));
    }

    #[test]
    fn test_unused_schema_not_exported() {
        let doc = testing::document();
        let compiled = doc.read(|g| compile(g)).unwrap();
        assert!(compiled.schemas.is_empty());
        assert_eq!(compiled.pages[0].name, "Main");
    }
}
