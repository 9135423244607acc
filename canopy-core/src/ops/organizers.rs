use canopy_layout::{GeoNode, Point, Size, MAX_NESTING_DEPTH};
use serde::{Deserialize, Serialize};
use yrs::ReadTxn;

use crate::collab::{Graph, GraphMut};
use crate::error::{ModelError, Result};
use crate::model::{double_option, Organizer, OrganizerLayout, DEFAULT_ORGANIZER_COLOR};
use crate::ops::constructs::place;
use crate::ops::{check_dimension, check_position, new_id};

const DEFAULT_ORGANIZER_SIZE: Size = Size {
    width: 400.0,
    height: 300.0,
};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrganizer {
    pub name: Option<String>,
    pub color: Option<String>,
    pub position: Option<Point>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub layout: Option<OrganizerLayout>,
    pub collapsed: Option<bool>,
    pub description: Option<String>,
    /// Semantic id of the construct to bind to.
    pub attached_to: Option<String>,
    pub parent_id: Option<String>,
    /// Constructs (by semantic id) or organizers (by id) to wrap.
    pub member_ids: Vec<String>,
    pub page_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateOrganizer {
    pub name: Option<String>,
    pub color: Option<String>,
    pub position: Option<Point>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub layout: Option<OrganizerLayout>,
    pub collapsed: Option<bool>,
    #[serde(deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub attached_to: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub parent_id: Option<Option<String>>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeletedOrganizer {
    pub deleted: bool,
    /// Members moved back onto the canvas.
    pub detached: usize,
    /// Descendant constructs and organizers removed with it.
    pub removed: usize,
}

pub fn list<T: ReadTxn>(g: &Graph<'_, T>, page_id: Option<&str>) -> Result<Vec<Organizer>> {
    let page_id = g.resolve_page(page_id)?;
    Ok(g.organizers_on(&page_id))
}

pub fn get<T: ReadTxn>(g: &Graph<'_, T>, id: &str) -> Result<Organizer> {
    g.organizer(id)
}

/// A member reference resolved to its arena id.
enum Member {
    Construct(crate::model::Construct),
    Organizer(Organizer),
}

impl Member {
    fn id(&self) -> &str {
        match self {
            Self::Construct(c) => &c.id,
            Self::Organizer(o) => &o.id,
        }
    }
}

fn resolve_member<T: ReadTxn>(g: &Graph<'_, T>, page_id: &str, key: &str) -> Result<Member> {
    if let Ok(c) = g.find_construct(page_id, key) {
        return Ok(Member::Construct(c));
    }
    match g.organizer(key) {
        Ok(o) if o.page_id == page_id => Ok(Member::Organizer(o)),
        _ => Err(ModelError::not_found("member", key)),
    }
}

/// Create an organizer.  With `memberIds` its bounds wrap the members, and
/// each member is re-parented keeping its absolute position.
pub fn create(g: &mut GraphMut<'_, '_>, input: CreateOrganizer) -> Result<Organizer> {
    let page_id = g.resolve_page(input.page_id.as_deref())?;
    check_dimension("width", input.width)?;
    check_dimension("height", input.height)?;
    check_position("position", input.position.as_ref())?;

    if let Some(sem) = input.attached_to.as_deref() {
        g.find_construct(&page_id, sem)?;
    }
    if let Some(pid) = input.parent_id.as_deref() {
        let parent = g.organizer(pid)?;
        if parent.page_id != page_id {
            return Err(ModelError::not_found("organizer", pid));
        }
    }
    let members = input
        .member_ids
        .iter()
        .map(|key| resolve_member(g, &page_id, key))
        .collect::<Result<Vec<_>>>()?;

    let id = new_id();
    let mut arena = g.arena(&page_id);
    let mut provisional = GeoNode::organizer(id.clone(), Point::ORIGIN, DEFAULT_ORGANIZER_SIZE);
    provisional.parent_id = input.parent_id.clone();
    if let Some(sem) = &input.attached_to {
        provisional = provisional.attached_to(sem.clone());
    }
    arena.insert(provisional);

    let member_positions: Vec<Point> = members
        .iter()
        .map(|m| arena.absolute_position(m.id()).unwrap_or(Point::ORIGIN))
        .collect();
    let member_bounds = arena.organizer_bounds(members.iter().map(Member::id));

    // Wrapped constructs count as members before organizer members are
    // checked, so a construct and its wagon can be grouped together.
    for member in &members {
        if let Member::Construct(c) = member {
            let mut node = GeoNode::construct(c.id.clone(), c.semantic_id.clone(), c.position)
                .with_parent(id.clone());
            node.size = c.size;
            arena.insert(node);
        }
    }

    if let Some(pid) = input.parent_id.as_deref() {
        if !arena.can_nest(&id, pid) {
            return Err(ModelError::Validation(
                "an organizer can only nest when attached to a member of the target".into(),
            ));
        }
    }
    for member in &members {
        if !arena.can_nest(member.id(), &id) {
            return Err(ModelError::Validation(format!(
                "{} cannot be placed in the new organizer",
                member.id()
            )));
        }
    }

    let parent_base = input
        .parent_id
        .as_deref()
        .and_then(|pid| arena.absolute_position(pid))
        .unwrap_or(Point::ORIGIN);
    let (absolute, size) = match member_bounds {
        Some(bounds) if input.position.is_none() => (
            bounds.origin(),
            Size::new(
                input.width.unwrap_or(bounds.width).max(bounds.width),
                input.height.unwrap_or(bounds.height).max(bounds.height),
            ),
        ),
        _ => {
            let size = Size::new(
                input.width.unwrap_or(DEFAULT_ORGANIZER_SIZE.width),
                input.height.unwrap_or(DEFAULT_ORGANIZER_SIZE.height),
            );
            let relative = match input.position {
                Some(p) => p,
                None => place(g, &page_id, input.parent_id.as_deref(), size),
            };
            (relative.offset(parent_base), size)
        }
    };

    let organizer = Organizer {
        id: id.clone(),
        page_id,
        name: input
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Group".to_string()),
        color: input
            .color
            .unwrap_or_else(|| DEFAULT_ORGANIZER_COLOR.to_string()),
        position: absolute.minus(parent_base),
        width: size.width,
        height: size.height,
        layout: input.layout.unwrap_or_default(),
        collapsed: input.collapsed.unwrap_or(false),
        attached_to: input.attached_to,
        parent_id: input.parent_id,
        description: input.description,
    };

    for (member, member_abs) in members.into_iter().zip(member_positions) {
        let relative = member_abs.minus(absolute);
        match member {
            Member::Construct(mut c) => {
                c.position = relative;
                c.parent_id = Some(id.clone());
                g.put_construct(&c)?;
            }
            Member::Organizer(mut o) => {
                o.position = relative;
                o.parent_id = Some(id.clone());
                g.put_organizer(&o)?;
            }
        }
    }
    g.put_organizer(&organizer)?;
    log::debug!("organizer {} created on page {}", organizer.id, organizer.page_id);
    Ok(organizer)
}

pub fn update(g: &mut GraphMut<'_, '_>, id: &str, input: UpdateOrganizer) -> Result<Organizer> {
    let mut org = g.organizer(id)?;
    check_dimension("width", input.width)?;
    check_dimension("height", input.height)?;
    check_position("position", input.position.as_ref())?;
    let mut arena = g.arena(&org.page_id);

    if let Some(Some(sem)) = &input.attached_to {
        g.find_construct(&org.page_id, sem)?;
    }
    if let Some(name) = &input.name {
        if name.trim().is_empty() {
            return Err(ModelError::Validation("organizer name must not be empty".into()));
        }
    }

    // Check nesting against the binding this update leaves in place.
    let attached = match &input.attached_to {
        Some(a) => a.clone(),
        None => org.attached_to.clone(),
    };
    let new_parent = match &input.parent_id {
        Some(p) => p.clone(),
        None => org.parent_id.clone(),
    };
    if let Some(pid) = new_parent.as_deref() {
        let parent = g.organizer(pid)?;
        if parent.page_id != org.page_id {
            return Err(ModelError::not_found("organizer", pid));
        }
        let mut candidate = GeoNode::organizer(org.id.clone(), org.position, org.size());
        candidate.parent_id = org.parent_id.clone();
        if let Some(sem) = attached.clone() {
            candidate = candidate.attached_to(sem);
        }
        arena.insert(candidate);
        if !arena.can_nest(&org.id, pid) {
            return Err(ModelError::Validation(
                "an organizer can only nest when attached to a member of the target".into(),
            ));
        }
    }

    let absolute = arena.absolute_position(&org.id).unwrap_or(org.position);
    match new_parent.as_deref() {
        Some(pid) if org.parent_id.as_deref() != Some(pid) => {
            let base = arena.absolute_position(pid).unwrap_or(Point::ORIGIN);
            org.position = absolute.minus(base);
        }
        None if org.parent_id.is_some() => org.position = absolute,
        _ => {}
    }
    org.parent_id = new_parent;
    org.attached_to = attached;

    if let Some(name) = input.name {
        org.name = name;
    }
    if let Some(color) = input.color {
        org.color = color;
    }
    if let Some(position) = input.position {
        org.position = position;
    }
    if let Some(width) = input.width {
        org.width = width;
    }
    if let Some(height) = input.height {
        org.height = height;
    }
    if let Some(layout) = input.layout {
        org.layout = layout;
    }
    if let Some(collapsed) = input.collapsed {
        org.collapsed = collapsed;
    }
    if let Some(description) = input.description {
        org.description = description;
    }

    g.put_organizer(&org)?;
    Ok(org)
}

/// Delete an organizer.  Members are detached to absolute positions, or
/// with `delete_members` removed along with every descendant.
pub fn delete(g: &mut GraphMut<'_, '_>, id: &str, delete_members: bool) -> Result<DeletedOrganizer> {
    let org = g.organizer(id)?;
    let arena = g.arena(&org.page_id);

    if !delete_members {
        let detached = arena.detach_members(id);
        for member in &detached {
            if let Ok(mut o) = g.organizer(&member.id) {
                o.position = member.position;
                o.parent_id = None;
                g.put_organizer(&o)?;
            } else if let Ok(mut c) = g.find_construct(&org.page_id, &member.id) {
                c.position = member.position;
                c.parent_id = None;
                g.put_construct(&c)?;
            }
        }
        g.remove_organizer(id);
        return Ok(DeletedOrganizer {
            deleted: true,
            detached: detached.len(),
            removed: 0,
        });
    }

    let doomed = arena.collect_descendants(id, MAX_NESTING_DEPTH);
    let constructs: Vec<_> = g
        .constructs_on(&org.page_id)
        .into_iter()
        .filter(|c| doomed.contains(&c.id))
        .collect();
    for conn in g.connections_on(&org.page_id) {
        if constructs.iter().any(|c| conn.touches(&c.semantic_id)) {
            g.remove_connection(&conn.id);
        }
    }
    // Surviving wagons bound to a removed construct are released.
    for mut wagon in g.organizers_on(&org.page_id) {
        let bound = wagon
            .attached_to
            .as_deref()
            .is_some_and(|sem| constructs.iter().any(|c| c.semantic_id == sem));
        if !bound || doomed.contains(&wagon.id) {
            continue;
        }
        wagon.attached_to = None;
        if wagon.parent_id.is_some() {
            wagon.position = arena.absolute_position(&wagon.id).unwrap_or(wagon.position);
            wagon.parent_id = None;
        }
        g.put_organizer(&wagon)?;
    }
    let mut removed = 0;
    for c in &constructs {
        if g.remove_construct(&c.id) {
            removed += 1;
        }
    }
    for oid in doomed.iter().filter(|d| d.as_str() != id) {
        if g.remove_organizer(oid) {
            removed += 1;
        }
    }
    g.remove_organizer(id);
    Ok(DeletedOrganizer {
        deleted: true,
        detached: 0,
        removed,
    })
}
