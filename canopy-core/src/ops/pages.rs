use serde::Deserialize;
use yrs::ReadTxn;

use crate::collab::{Graph, GraphMut};
use crate::error::{ModelError, Result};
use crate::model::Page;
use crate::ops::{new_id, required_str};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePage {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePage {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default, deserialize_with = "crate::model::double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActivePage {
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub page_name: Option<String>,
}

pub fn list<T: ReadTxn>(g: &Graph<'_, T>) -> Vec<Page> {
    g.pages()
}

pub fn create(g: &mut GraphMut<'_, '_>, input: CreatePage) -> Result<Page> {
    let name = required_str(input.name, "name")?;
    let order = input
        .order
        .unwrap_or_else(|| g.pages().iter().map(|p| p.order + 1).max().unwrap_or(0));
    let page = Page {
        id: new_id(),
        name,
        order,
        description: input.description,
    };
    g.put_page(&page)?;
    Ok(page)
}

pub fn update(g: &mut GraphMut<'_, '_>, page_id: &str, input: UpdatePage) -> Result<Page> {
    let mut page = g.page(page_id)?;
    if let Some(name) = input.name {
        if name.trim().is_empty() {
            return Err(ModelError::Validation("page name must not be empty".into()));
        }
        page.name = name;
    }
    if let Some(order) = input.order {
        page.order = order;
    }
    if let Some(description) = input.description {
        page.description = description;
    }
    g.put_page(&page)?;
    Ok(page)
}

/// Delete a page with everything on it.  The last page cannot be deleted;
/// deleting the active page activates the lowest-order remaining page.
pub fn delete(g: &mut GraphMut<'_, '_>, page_id: &str) -> Result<bool> {
    g.page(page_id)?;
    let pages = g.pages();
    if pages.len() <= 1 {
        return Err(ModelError::DeleteFailed(
            "a document must keep at least one page".into(),
        ));
    }

    let was_active = g.resolve_page(None)? == page_id;
    for c in g.connections_on(page_id) {
        g.remove_connection(&c.id);
    }
    for c in g.constructs_on(page_id) {
        g.remove_construct(&c.id);
    }
    for o in g.organizers_on(page_id) {
        g.remove_organizer(&o.id);
    }
    g.remove_page(page_id);

    if was_active {
        if let Some(next) = pages.iter().find(|p| p.id != page_id) {
            g.set_active_page(&next.id);
        }
    }
    Ok(true)
}

/// Activate a page by id or, failing that, by name.
pub fn set_active(g: &mut GraphMut<'_, '_>, input: SetActivePage) -> Result<Page> {
    let page = match (input.page_id, input.page_name) {
        (Some(id), _) => g.page(&id)?,
        (None, Some(name)) => g
            .pages()
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ModelError::not_found("page", name))?,
        (None, None) => return Err(ModelError::MissingField("pageId".into())),
    };
    g.set_active_page(&page.id);
    Ok(page)
}
