use std::collections::HashSet;

use canopy_layout::{
    auto_position, PlacementConfig, Point, Rect, Size, DEFAULT_NODE_SIZE, ORGANIZER_HEADER,
    ORGANIZER_PADDING,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use yrs::ReadTxn;

use crate::collab::{Graph, GraphMut};
use crate::error::{ModelError, Result};
use crate::model::{double_option, Construct, ItemResult, Values};
use crate::ops::{check_position, check_size, new_id, required_str};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateConstruct {
    pub type_name: Option<String>,
    pub semantic_id: Option<String>,
    pub values: Option<Values>,
    /// Relative to `parent_id` when set.
    pub position: Option<Point>,
    pub parent_id: Option<String>,
    pub size: Option<Size>,
    pub page_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateConstruct {
    pub semantic_id: Option<String>,
    /// Merged into the existing values.
    pub values: Option<Values>,
    pub position: Option<Point>,
    /// `null` detaches from the current organizer.
    #[serde(deserialize_with = "double_option")]
    pub parent_id: Option<Option<String>>,
    pub size: Option<Size>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoveConstruct {
    pub position: Option<Point>,
    #[serde(deserialize_with = "double_option")]
    pub parent_id: Option<Option<String>>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeletedConstruct {
    pub deleted: bool,
    pub semantic_id: String,
    pub connections_removed: usize,
    pub organizers_detached: usize,
}

pub fn list<T: ReadTxn>(
    g: &Graph<'_, T>,
    page_id: Option<&str>,
    type_name: Option<&str>,
) -> Result<Vec<Construct>> {
    let page_id = g.resolve_page(page_id)?;
    let mut constructs = g.constructs_on(&page_id);
    if let Some(t) = type_name {
        constructs.retain(|c| c.type_name == t);
    }
    Ok(constructs)
}

pub fn get<T: ReadTxn>(g: &Graph<'_, T>, page_id: Option<&str>, key: &str) -> Result<Construct> {
    let page_id = g.resolve_page(page_id)?;
    g.find_construct(&page_id, key)
}

fn slug(type_name: &str) -> String {
    let raw: String = type_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = raw.trim_matches('-');
    if trimmed.is_empty() {
        "node".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<type>-<4 hex>`, unique among `taken`.
fn generate_semantic_id(type_name: &str, taken: &HashSet<String>) -> String {
    let prefix = slug(type_name);
    loop {
        let hex = Uuid::new_v4().simple().to_string();
        let candidate = format!("{prefix}-{}", &hex[..4]);
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
}

/// Free spot for a new node of `size`, either on the page canvas or inside
/// `parent` (in the parent's coordinates).
pub(crate) fn place<T: ReadTxn>(
    g: &Graph<'_, T>,
    page_id: &str,
    parent: Option<&str>,
    size: Size,
) -> Point {
    let arena = g.arena(page_id);
    match parent {
        None => {
            let ids = g
                .constructs_on(page_id)
                .into_iter()
                .map(|c| c.id)
                .chain(g.organizers_on(page_id).into_iter().map(|o| o.id));
            let rects: Vec<Rect> = ids.filter_map(|id| arena.absolute_rect(&id)).collect();
            auto_position(&rects, size, &PlacementConfig::default())
        }
        Some(pid) => {
            let rects: Vec<Rect> = arena
                .children_of(pid)
                .into_iter()
                .map(|n| Rect::at(n.position, n.effective_size()))
                .collect();
            let config = PlacementConfig {
                origin: Point::new(ORGANIZER_PADDING, ORGANIZER_HEADER + ORGANIZER_PADDING),
                ..PlacementConfig::default()
            };
            auto_position(&rects, size, &config)
        }
    }
}

/// Organizer `id` must exist on `page_id`.
fn require_organizer_on<T: ReadTxn>(g: &Graph<'_, T>, page_id: &str, id: &str) -> Result<()> {
    let org = g.organizer(id)?;
    if org.page_id != page_id {
        return Err(ModelError::not_found("organizer", id));
    }
    Ok(())
}

pub fn create(g: &mut GraphMut<'_, '_>, input: CreateConstruct) -> Result<Construct> {
    let type_name = required_str(input.type_name, "typeName")?;
    check_position("position", input.position.as_ref())?;
    check_size("size", input.size.as_ref())?;
    let page_id = g.resolve_page(input.page_id.as_deref())?;
    let schema = g.require_schema(&type_name)?;

    let taken: HashSet<String> = g
        .constructs_on(&page_id)
        .into_iter()
        .map(|c| c.semantic_id)
        .collect();
    let semantic_id = match input.semantic_id {
        Some(sem) if sem.trim().is_empty() => {
            return Err(ModelError::Validation("semanticId must not be empty".into()))
        }
        Some(sem) if taken.contains(&sem) => {
            return Err(ModelError::already_exists("construct", sem))
        }
        Some(sem) => sem,
        None => generate_semantic_id(&type_name, &taken),
    };

    if let Some(pid) = input.parent_id.as_deref() {
        require_organizer_on(g, &page_id, pid)?;
    }

    let size = input.size.unwrap_or(DEFAULT_NODE_SIZE);
    let position = match input.position {
        Some(p) => p,
        None => place(g, &page_id, input.parent_id.as_deref(), size),
    };

    let mut values = schema.default_values();
    if let Some(given) = input.values {
        values.extend(given);
    }

    let construct = Construct {
        id: new_id(),
        semantic_id,
        page_id,
        type_name,
        values,
        position,
        parent_id: input.parent_id,
        size: input.size,
    };
    g.put_construct(&construct)?;
    log::debug!("construct {} created on page {}", construct.semantic_id, construct.page_id);
    Ok(construct)
}

/// Point every connection and organizer attachment at a renamed construct.
fn rename_references(g: &mut GraphMut<'_, '_>, page_id: &str, old: &str, new: &str) -> Result<()> {
    for mut conn in g.connections_on(page_id) {
        if !conn.touches(old) {
            continue;
        }
        if conn.source_semantic_id == old {
            conn.source_semantic_id = new.to_string();
        }
        if conn.target_semantic_id == old {
            conn.target_semantic_id = new.to_string();
        }
        g.put_connection(&conn)?;
    }
    for mut org in g.organizers_on(page_id) {
        if org.attached_to.as_deref() == Some(old) {
            org.attached_to = Some(new.to_string());
            g.put_organizer(&org)?;
        }
    }
    Ok(())
}

pub fn update(
    g: &mut GraphMut<'_, '_>,
    page_id: Option<&str>,
    key: &str,
    input: UpdateConstruct,
) -> Result<Construct> {
    check_position("position", input.position.as_ref())?;
    check_size("size", input.size.as_ref())?;
    let page_id = g.resolve_page(page_id)?;
    let mut construct = g.find_construct(&page_id, key)?;
    let arena = g.arena(&page_id);

    let rename = match input.semantic_id {
        Some(sem) if sem.trim().is_empty() => {
            return Err(ModelError::Validation("semanticId must not be empty".into()))
        }
        Some(sem) if sem == construct.semantic_id => None,
        Some(sem) => {
            if g.constructs_on(&page_id).iter().any(|c| c.semantic_id == sem) {
                return Err(ModelError::already_exists("construct", sem));
            }
            Some(sem)
        }
        None => None,
    };
    if let Some(Some(pid)) = &input.parent_id {
        require_organizer_on(g, &page_id, pid)?;
        if !arena.can_nest(&construct.id, pid) {
            return Err(ModelError::Validation(format!(
                "{} cannot be placed in organizer {pid}",
                construct.semantic_id
            )));
        }
    }

    if let Some(values) = input.values {
        construct.values.extend(values);
    }
    if let Some(size) = input.size {
        construct.size = Some(size);
    }
    match input.parent_id {
        Some(Some(pid)) if construct.parent_id.as_deref() != Some(pid.as_str()) => {
            let absolute = arena
                .absolute_position(&construct.id)
                .unwrap_or(construct.position);
            let base = arena.absolute_position(&pid).unwrap_or(Point::ORIGIN);
            construct.position = absolute.minus(base);
            construct.parent_id = Some(pid);
        }
        Some(None) if construct.parent_id.is_some() => {
            construct.position = arena
                .absolute_position(&construct.id)
                .unwrap_or(construct.position);
            construct.parent_id = None;
        }
        _ => {}
    }
    if let Some(position) = input.position {
        construct.position = position;
    }
    if let Some(sem) = rename {
        rename_references(g, &page_id, &construct.semantic_id, &sem)?;
        construct.semantic_id = sem;
    }

    g.put_construct(&construct)?;
    Ok(construct)
}

pub fn move_to(
    g: &mut GraphMut<'_, '_>,
    page_id: Option<&str>,
    key: &str,
    input: MoveConstruct,
) -> Result<Construct> {
    if input.position.is_none() && input.parent_id.is_none() {
        return Err(ModelError::MissingField("position".into()));
    }
    update(
        g,
        page_id,
        key,
        UpdateConstruct {
            position: input.position,
            parent_id: input.parent_id,
            ..UpdateConstruct::default()
        },
    )
}

/// Delete a construct, its connections, and any organizer binding to it.
pub fn delete(g: &mut GraphMut<'_, '_>, page_id: Option<&str>, key: &str) -> Result<DeletedConstruct> {
    let page_id = g.resolve_page(page_id)?;
    let construct = g.find_construct(&page_id, key)?;
    let arena = g.arena(&page_id);
    let sem = construct.semantic_id.as_str();

    let mut connections_removed = 0;
    for conn in g.connections_on(&page_id) {
        if conn.touches(sem) && g.remove_connection(&conn.id) {
            connections_removed += 1;
        }
    }

    // A wagon loses its binding, and with it any nesting it derived.
    let mut organizers_detached = 0;
    for mut org in g.organizers_on(&page_id) {
        if org.attached_to.as_deref() != Some(sem) {
            continue;
        }
        org.attached_to = None;
        if org.parent_id.is_some() {
            org.position = arena.absolute_position(&org.id).unwrap_or(org.position);
            org.parent_id = None;
        }
        g.put_organizer(&org)?;
        organizers_detached += 1;
    }

    g.remove_construct(&construct.id);
    Ok(DeletedConstruct {
        deleted: true,
        semantic_id: construct.semantic_id,
        connections_removed,
        organizers_detached,
    })
}

pub fn bulk_create(g: &mut GraphMut<'_, '_>, items: Vec<CreateConstruct>) -> Vec<ItemResult<Construct>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| ItemResult::from_result(i, create(g, item)))
        .collect()
}

pub fn bulk_delete(
    g: &mut GraphMut<'_, '_>,
    page_id: Option<&str>,
    keys: &[String],
) -> Vec<ItemResult<DeletedConstruct>> {
    keys.iter()
        .enumerate()
        .map(|(i, key)| ItemResult::from_result(i, delete(g, page_id, key)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::UpdateOrigin;
    use crate::ops::{connections, organizers, testing};
    use serde_json::json;

    fn service(sem: Option<&str>) -> CreateConstruct {
        CreateConstruct {
            type_name: Some("service".into()),
            semantic_id: sem.map(String::from),
            ..CreateConstruct::default()
        }
    }

    #[test]
    fn test_create_generates_semantic_id_and_defaults() {
        let doc = testing::document();
        let c = doc
            .transact(UpdateOrigin::Local, |g| create(g, service(None)))
            .unwrap();
        assert!(c.semantic_id.starts_with("service-"));
        assert_eq!(c.semantic_id.len(), "service-".len() + 4);
        assert_eq!(c.values["replicas"], json!(1));
        assert_eq!(c.position, PlacementConfig::default().origin);
    }

    #[test]
    fn test_create_unknown_type() {
        let doc = testing::document();
        let err = doc
            .transact(UpdateOrigin::Local, |g| {
                create(
                    g,
                    CreateConstruct {
                        type_name: Some("database".into()),
                        ..CreateConstruct::default()
                    },
                )
            })
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_create_missing_type() {
        let doc = testing::document();
        let err = doc
            .transact(UpdateOrigin::Local, |g| create(g, CreateConstruct::default()))
            .unwrap_err();
        assert_eq!(err, ModelError::MissingField("typeName".into()));
    }

    #[test]
    fn test_duplicate_semantic_id_rejected() {
        let doc = testing::document();
        doc.transact(UpdateOrigin::Local, |g| create(g, service(Some("api"))))
            .unwrap();
        let err = doc
            .transact(UpdateOrigin::Local, |g| create(g, service(Some("api"))))
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
    }

    #[test]
    fn test_auto_position_avoids_existing() {
        let doc = testing::document();
        let (a, b) = doc
            .transact(UpdateOrigin::Local, |g| {
                Ok((create(g, service(None))?, create(g, service(None))?))
            })
            .unwrap();
        let ra = Rect::at(a.position, DEFAULT_NODE_SIZE);
        let rb = Rect::at(b.position, DEFAULT_NODE_SIZE);
        assert!(!ra.overlaps(&rb));
    }

    #[test]
    fn test_out_of_range_geometry_rejected() {
        let doc = testing::document();
        let huge = CreateConstruct {
            position: Some(Point::new(-1.0e22, 0.0)),
            size: Some(Size::new(2.0e22, 100.0)),
            ..service(Some("big"))
        };
        let err = doc
            .transact(UpdateOrigin::Local, |g| create(g, huge))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let negative = CreateConstruct {
            size: Some(Size::new(-10.0, 100.0)),
            ..service(Some("neg"))
        };
        let err = doc
            .transact(UpdateOrigin::Local, |g| create(g, negative))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        doc.transact(UpdateOrigin::Local, |g| create(g, service(Some("api"))))
            .unwrap();
        let moved: MoveConstruct =
            serde_json::from_value(json!({"position": {"x": 1.0e300, "y": 0.0}})).unwrap();
        let err = doc
            .transact(UpdateOrigin::Local, |g| move_to(g, None, "api", moved))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        // The document stays usable after the rejections.
        let next = doc
            .transact(UpdateOrigin::Local, |g| create(g, service(None)))
            .unwrap();
        assert!(next.position.is_on_canvas());
        assert_eq!(doc.read(|g| Ok(g.all_constructs().len())).unwrap(), 2);
    }

    #[test]
    fn test_auto_position_next_to_largest_allowed_node() {
        let doc = testing::document();
        let edge = canopy_layout::MAX_COORDINATE;
        doc.transact(UpdateOrigin::Local, |g| {
            create(
                g,
                CreateConstruct {
                    position: Some(Point::new(-edge, -edge)),
                    size: Some(Size::new(edge, edge)),
                    ..service(Some("wide"))
                },
            )
        })
        .unwrap();
        let placed = doc
            .transact(UpdateOrigin::Local, |g| create(g, service(None)))
            .unwrap();
        assert!(placed.position.is_on_canvas());
    }

    #[test]
    fn test_update_merges_values() {
        let doc = testing::document();
        doc.transact(UpdateOrigin::Local, |g| create(g, service(Some("api"))))
            .unwrap();
        let input: UpdateConstruct =
            serde_json::from_value(json!({"values": {"name": "gateway"}})).unwrap();
        let c = doc
            .transact(UpdateOrigin::Local, |g| update(g, None, "api", input))
            .unwrap();
        assert_eq!(c.values["name"], "gateway");
        assert_eq!(c.values["replicas"], 1);
    }

    #[test]
    fn test_rename_rewrites_connections() {
        let doc = testing::document();
        doc.transact(UpdateOrigin::Local, |g| {
            create(g, service(Some("a")))?;
            create(g, service(Some("b")))?;
            connections::connect(g, connections::ConnectRequest::new("a", "out", "b", "in"))
        })
        .unwrap();
        let input = UpdateConstruct {
            semantic_id: Some("alpha".into()),
            ..UpdateConstruct::default()
        };
        doc.transact(UpdateOrigin::Local, |g| update(g, None, "a", input))
            .unwrap();
        let conns = doc.read(|g| Ok(g.all_connections())).unwrap();
        assert_eq!(conns[0].source_semantic_id, "alpha");
    }

    #[test]
    fn test_nest_and_detach_keep_absolute_position() {
        let doc = testing::document();
        let org = doc
            .transact(UpdateOrigin::Local, |g| {
                organizers::create(
                    g,
                    organizers::CreateOrganizer {
                        name: Some("Group".into()),
                        position: Some(Point::new(100.0, 100.0)),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        doc.transact(UpdateOrigin::Local, |g| {
            create(
                g,
                CreateConstruct {
                    position: Some(Point::new(150.0, 180.0)),
                    ..service(Some("api"))
                },
            )
        })
        .unwrap();

        let nest: UpdateConstruct =
            serde_json::from_value(json!({"parentId": org.id})).unwrap();
        let nested = doc
            .transact(UpdateOrigin::Local, |g| update(g, None, "api", nest))
            .unwrap();
        assert_eq!(nested.position, Point::new(50.0, 80.0));

        let detach: UpdateConstruct = serde_json::from_value(json!({"parentId": null})).unwrap();
        let detached = doc
            .transact(UpdateOrigin::Local, |g| update(g, None, "api", detach))
            .unwrap();
        assert_eq!(detached.parent_id, None);
        assert_eq!(detached.position, Point::new(150.0, 180.0));
    }

    #[test]
    fn test_delete_removes_connections() {
        let doc = testing::document();
        doc.transact(UpdateOrigin::Local, |g| {
            create(g, service(Some("a")))?;
            create(g, service(Some("b")))?;
            connections::connect(g, connections::ConnectRequest::new("a", "out", "b", "in"))
        })
        .unwrap();
        let result = doc
            .transact(UpdateOrigin::Local, |g| delete(g, None, "b"))
            .unwrap();
        assert_eq!(result.connections_removed, 1);
        assert!(doc.read(|g| Ok(g.all_connections())).unwrap().is_empty());
    }

    #[test]
    fn test_bulk_create_is_best_effort() {
        let doc = testing::document();
        let results = doc
            .transact(UpdateOrigin::Local, |g| {
                Ok(bulk_create(
                    g,
                    vec![
                        service(Some("one")),
                        service(Some("one")),
                        CreateConstruct::default(),
                        service(Some("two")),
                    ],
                ))
            })
            .unwrap();
        let ok: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(ok, vec![true, false, false, true]);
        assert_eq!(results[1].code, Some("ALREADY_EXISTS"));
        assert_eq!(results[2].code, Some("MISSING_FIELD"));
        assert_eq!(doc.read(|g| Ok(g.all_constructs().len())).unwrap(), 2);
    }

    #[test]
    fn test_move_requires_position() {
        let doc = testing::document();
        doc.transact(UpdateOrigin::Local, |g| create(g, service(Some("a"))))
            .unwrap();
        let err = doc
            .transact(UpdateOrigin::Local, |g| {
                move_to(g, None, "a", MoveConstruct::default())
            })
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_FIELD");
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Web Service"), "web-service");
        assert_eq!(slug("***"), "node");
    }
}
