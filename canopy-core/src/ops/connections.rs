use serde::{Deserialize, Serialize};
use yrs::ReadTxn;

use crate::collab::{Graph, GraphMut};
use crate::error::{ModelError, Result};
use crate::model::{Connection, ItemResult};
use crate::ops::{new_id, required_str};
use crate::ports;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectRequest {
    pub source_semantic_id: Option<String>,
    pub source_port_id: Option<String>,
    pub target_semantic_id: Option<String>,
    pub target_port_id: Option<String>,
    pub page_id: Option<String>,
}

impl ConnectRequest {
    pub fn new(source: &str, source_port: &str, target: &str, target_port: &str) -> Self {
        Self {
            source_semantic_id: Some(source.into()),
            source_port_id: Some(source_port.into()),
            target_semantic_id: Some(target.into()),
            target_port_id: Some(target_port.into()),
            page_id: None,
        }
    }
}

/// Selects connections to remove.  Either a connection id, or a source and
/// target with optional ports.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisconnectRequest {
    pub connection_id: Option<String>,
    pub source_semantic_id: Option<String>,
    pub source_port_id: Option<String>,
    pub target_semantic_id: Option<String>,
    pub target_port_id: Option<String>,
    pub page_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Disconnected {
    pub removed: usize,
}

pub fn list<T: ReadTxn>(g: &Graph<'_, T>, page_id: Option<&str>) -> Result<Vec<Connection>> {
    let page_id = g.resolve_page(page_id)?;
    Ok(g.connections_on(&page_id))
}

pub fn connect(g: &mut GraphMut<'_, '_>, req: ConnectRequest) -> Result<Connection> {
    let source_sem = required_str(req.source_semantic_id, "sourceSemanticId")?;
    let source_port = required_str(req.source_port_id, "sourcePortId")?;
    let target_sem = required_str(req.target_semantic_id, "targetSemanticId")?;
    let target_port = required_str(req.target_port_id, "targetPortId")?;
    let page_id = g.resolve_page(req.page_id.as_deref())?;

    let source = g.find_construct(&page_id, &source_sem)?;
    let target = g.find_construct(&page_id, &target_sem)?;
    let source_schema = g.require_schema(&source.type_name)?;
    let target_schema = g.require_schema(&target.type_name)?;

    let source_cfg = source_schema.port(&source_port).ok_or_else(|| {
        ModelError::ConnectFailed(format!(
            "port '{source_port}' is not declared on type '{}'",
            source.type_name
        ))
    })?;
    let target_cfg = target_schema.port(&target_port).ok_or_else(|| {
        ModelError::ConnectFailed(format!(
            "port '{target_port}' is not declared on type '{}'",
            target.type_name
        ))
    })?;
    if source.id == target.id && source_port == target_port {
        return Err(ModelError::ConnectFailed(
            "a port cannot connect to itself".into(),
        ));
    }
    ports::can_connect(&source_cfg.port_type, &target_cfg.port_type)
        .map_err(ModelError::ConnectFailed)?;

    let duplicate = g.connections_on(&page_id).into_iter().any(|c| {
        c.source_semantic_id == source.semantic_id
            && c.source_port_id == source_port
            && c.target_semantic_id == target.semantic_id
            && c.target_port_id == target_port
    });
    if duplicate {
        return Err(ModelError::ConnectFailed(format!(
            "{}.{source_port} is already connected to {}.{target_port}",
            source.semantic_id, target.semantic_id
        )));
    }

    let connection = Connection {
        id: new_id(),
        page_id,
        source_semantic_id: source.semantic_id,
        source_port_id: source_port,
        target_semantic_id: target.semantic_id,
        target_port_id: target_port,
    };
    g.put_connection(&connection)?;
    Ok(connection)
}

pub fn disconnect(g: &mut GraphMut<'_, '_>, req: DisconnectRequest) -> Result<Disconnected> {
    let page_id = g.resolve_page(req.page_id.as_deref())?;
    let matches: Vec<Connection> = match req.connection_id {
        Some(id) => {
            let found: Vec<Connection> = g
                .connections_on(&page_id)
                .into_iter()
                .filter(|c| c.id == id)
                .collect();
            if found.is_empty() {
                return Err(ModelError::not_found("connection", id));
            }
            found
        }
        None => {
            let source = required_str(req.source_semantic_id, "sourceSemanticId")?;
            let target = required_str(req.target_semantic_id, "targetSemanticId")?;
            let found: Vec<Connection> = g
                .connections_on(&page_id)
                .into_iter()
                .filter(|c| {
                    c.source_semantic_id == source
                        && c.target_semantic_id == target
                        && req.source_port_id.as_ref().is_none_or(|p| *p == c.source_port_id)
                        && req.target_port_id.as_ref().is_none_or(|p| *p == c.target_port_id)
                })
                .collect();
            if found.is_empty() {
                return Err(ModelError::not_found("connection", format!("{source} -> {target}")));
            }
            found
        }
    };

    let removed = matches
        .iter()
        .filter(|c| g.remove_connection(&c.id))
        .count();
    Ok(Disconnected { removed })
}

pub fn bulk_connect(g: &mut GraphMut<'_, '_>, items: Vec<ConnectRequest>) -> Vec<ItemResult<Connection>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| ItemResult::from_result(i, connect(g, item)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::UpdateOrigin;
    use crate::ops::constructs::{self, CreateConstruct};
    use crate::ops::testing;

    fn seeded() -> crate::collab::SharedDocument {
        let doc = testing::document();
        doc.transact(UpdateOrigin::Local, |g| {
            for sem in ["a", "b", "c"] {
                constructs::create(
                    g,
                    CreateConstruct {
                        type_name: Some("service".into()),
                        semantic_id: Some(sem.into()),
                        ..CreateConstruct::default()
                    },
                )?;
            }
            Ok(())
        })
        .unwrap();
        doc
    }

    #[test]
    fn test_connect_flow_ports() {
        let doc = seeded();
        let c = doc
            .transact(UpdateOrigin::Local, |g| {
                connect(g, ConnectRequest::new("a", "out", "b", "in"))
            })
            .unwrap();
        assert_eq!(c.source_semantic_id, "a");
        assert_eq!(c.target_port_id, "in");
    }

    #[test]
    fn test_incompatible_ports_rejected() {
        let doc = seeded();
        let err = doc
            .transact(UpdateOrigin::Local, |g| {
                connect(g, ConnectRequest::new("a", "out", "b", "out"))
            })
            .unwrap_err();
        assert_eq!(err.code(), "CONNECT_FAILED");
    }

    #[test]
    fn test_undeclared_port_rejected() {
        let doc = seeded();
        let err = doc
            .transact(UpdateOrigin::Local, |g| {
                connect(g, ConnectRequest::new("a", "nope", "b", "in"))
            })
            .unwrap_err();
        assert_eq!(err.code(), "CONNECT_FAILED");
    }

    #[test]
    fn test_duplicate_rejected() {
        let doc = seeded();
        doc.transact(UpdateOrigin::Local, |g| {
            connect(g, ConnectRequest::new("a", "out", "b", "in"))
        })
        .unwrap();
        let err = doc
            .transact(UpdateOrigin::Local, |g| {
                connect(g, ConnectRequest::new("a", "out", "b", "in"))
            })
            .unwrap_err();
        assert_eq!(err.code(), "CONNECT_FAILED");
    }

    #[test]
    fn test_missing_endpoint() {
        let doc = seeded();
        let err = doc
            .transact(UpdateOrigin::Local, |g| {
                connect(g, ConnectRequest::new("a", "out", "zzz", "in"))
            })
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        let err = doc
            .transact(UpdateOrigin::Local, |g| {
                connect(
                    g,
                    ConnectRequest {
                        target_port_id: None,
                        ..ConnectRequest::new("a", "out", "b", "in")
                    },
                )
            })
            .unwrap_err();
        assert_eq!(err, ModelError::MissingField("targetPortId".into()));
    }

    #[test]
    fn test_disconnect_by_endpoints() {
        let doc = seeded();
        doc.transact(UpdateOrigin::Local, |g| {
            connect(g, ConnectRequest::new("a", "out", "b", "in"))?;
            connect(g, ConnectRequest::new("a", "peer", "b", "peer"))
        })
        .unwrap();
        let removed = doc
            .transact(UpdateOrigin::Local, |g| {
                disconnect(
                    g,
                    DisconnectRequest {
                        source_semantic_id: Some("a".into()),
                        target_semantic_id: Some("b".into()),
                        source_port_id: Some("out".into()),
                        ..DisconnectRequest::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(removed.removed, 1);
        assert_eq!(doc.read(|g| Ok(g.all_connections().len())).unwrap(), 1);
    }

    #[test]
    fn test_disconnect_unmatched_endpoints_not_found() {
        let doc = seeded();
        doc.transact(UpdateOrigin::Local, |g| {
            connect(g, ConnectRequest::new("a", "out", "b", "in"))
        })
        .unwrap();
        let err = doc
            .transact(UpdateOrigin::Local, |g| {
                disconnect(
                    g,
                    DisconnectRequest {
                        source_semantic_id: Some("b".into()),
                        target_semantic_id: Some("c".into()),
                        ..DisconnectRequest::default()
                    },
                )
            })
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(doc.read(|g| Ok(g.all_connections().len())).unwrap(), 1);
    }

    #[test]
    fn test_bulk_connect_partial() {
        let doc = seeded();
        let results = doc
            .transact(UpdateOrigin::Local, |g| {
                Ok(bulk_connect(
                    g,
                    vec![
                        ConnectRequest::new("a", "out", "b", "in"),
                        ConnectRequest::new("a", "out", "b", "in"),
                        ConnectRequest::new("b", "out", "c", "in"),
                    ],
                ))
            })
            .unwrap();
        let ok: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(ok, vec![true, false, true]);
    }
}
