//! Layout requests over the top-level constructs of a page.
//!
//! Nodes are addressed by semantic id.  Constructs inside an organizer keep
//! their relative positions and are never moved by a page layout.

use std::collections::HashSet;

use canopy_layout::{
    arrange, flow_layout, ArrangeNode, ArrangeOptions, FlowEdge, FlowNode, FlowOptions, Point,
    DEFAULT_NODE_SIZE,
};
use serde::{Deserialize, Serialize};

use crate::collab::GraphMut;
use crate::error::{ModelError, Result};
use crate::model::Construct;

/// `"all"` or an explicit list of semantic ids.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Scope {
    Ids(Vec<String>),
    Keyword(String),
}

impl Default for Scope {
    fn default() -> Self {
        Self::Keyword("all".into())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRequest {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(flatten)]
    pub options: FlowOptions,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangeRequest {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(flatten)]
    pub options: ArrangeOptions,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MovedNode {
    pub semantic_id: String,
    pub position: Point,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOutcome {
    pub page_id: String,
    pub moved: Vec<MovedNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_count: Option<usize>,
}

/// Resolve the scope to top-level constructs, in page order.
fn scoped(constructs: Vec<Construct>, scope: &Scope) -> Result<Vec<Construct>> {
    match scope {
        Scope::Keyword(k) if k == "all" => Ok(constructs
            .into_iter()
            .filter(|c| c.parent_id.is_none())
            .collect()),
        Scope::Keyword(k) => Err(ModelError::Validation(format!(
            "scope must be \"all\" or a list of semantic ids, got \"{k}\""
        ))),
        Scope::Ids(ids) => {
            let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
            let selected: Vec<Construct> = constructs
                .into_iter()
                .filter(|c| wanted.contains(c.semantic_id.as_str()))
                .collect();
            if selected.len() < wanted.len() {
                let found: HashSet<&str> = selected.iter().map(|c| c.semantic_id.as_str()).collect();
                let missing = ids.iter().find(|id| !found.contains(id.as_str()));
                return Err(ModelError::not_found(
                    "construct",
                    missing.cloned().unwrap_or_default(),
                ));
            }
            if let Some(nested) = selected.iter().find(|c| c.parent_id.is_some()) {
                return Err(ModelError::Validation(format!(
                    "construct '{}' is inside an organizer",
                    nested.semantic_id
                )));
            }
            Ok(selected)
        }
    }
}

/// Write positions for the constructs that moved.
fn apply(g: &mut GraphMut<'_, '_>, nodes: &[Construct], positions: Vec<(String, Point)>) -> Result<Vec<MovedNode>> {
    let mut moved = Vec::new();
    for (sem, position) in positions {
        let Some(construct) = nodes.iter().find(|c| c.semantic_id == sem) else {
            continue;
        };
        if construct.position.approx_eq(position) {
            continue;
        }
        let mut updated = construct.clone();
        updated.position = position;
        g.put_construct(&updated)?;
        moved.push(MovedNode {
            semantic_id: sem,
            position,
        });
    }
    Ok(moved)
}

pub fn flow(g: &mut GraphMut<'_, '_>, req: FlowRequest) -> Result<LayoutOutcome> {
    let page_id = g.resolve_page(req.page_id.as_deref())?;
    let nodes = scoped(g.constructs_on(&page_id), &req.scope)?;
    let in_scope: HashSet<&str> = nodes.iter().map(|c| c.semantic_id.as_str()).collect();

    let flow_nodes: Vec<FlowNode> = nodes
        .iter()
        .map(|c| FlowNode {
            id: c.semantic_id.clone(),
            position: c.position,
            size: c.size.unwrap_or(DEFAULT_NODE_SIZE),
        })
        .collect();
    let edges: Vec<FlowEdge> = g
        .connections_on(&page_id)
        .into_iter()
        .filter(|e| {
            in_scope.contains(e.source_semantic_id.as_str())
                && in_scope.contains(e.target_semantic_id.as_str())
        })
        .map(|e| FlowEdge {
            source: e.source_semantic_id,
            source_port: e.source_port_id,
            target: e.target_semantic_id,
            target_port: e.target_port_id,
        })
        .collect();

    let result = flow_layout(&flow_nodes, &edges, &req.options)?;
    let moved = apply(g, &nodes, result.positions)?;
    log::debug!(
        "flow layout on page {page_id}: {} nodes, {} layers, {} moved",
        nodes.len(),
        result.layer_count,
        moved.len()
    );
    Ok(LayoutOutcome {
        page_id,
        moved,
        layer_count: Some(result.layer_count),
    })
}

pub fn arrange_page(g: &mut GraphMut<'_, '_>, req: ArrangeRequest) -> Result<LayoutOutcome> {
    let page_id = g.resolve_page(req.page_id.as_deref())?;
    let nodes = scoped(g.constructs_on(&page_id), &req.scope)?;
    let in_scope: HashSet<&str> = nodes.iter().map(|c| c.semantic_id.as_str()).collect();

    let arrange_nodes: Vec<ArrangeNode> = nodes
        .iter()
        .map(|c| ArrangeNode {
            id: c.semantic_id.clone(),
            position: c.position,
            size: c.size.unwrap_or(DEFAULT_NODE_SIZE),
        })
        .collect();
    let edges: Vec<(String, String)> = g
        .connections_on(&page_id)
        .into_iter()
        .filter(|e| {
            in_scope.contains(e.source_semantic_id.as_str())
                && in_scope.contains(e.target_semantic_id.as_str())
        })
        .map(|e| (e.source_semantic_id, e.target_semantic_id))
        .collect();

    let positions = arrange(&arrange_nodes, &edges, &req.options)?;
    let moved = apply(g, &nodes, positions)?;
    log::debug!("arrange on page {page_id}: {} moved", moved.len());
    Ok(LayoutOutcome {
        page_id,
        moved,
        layer_count: None,
    })
}
