use serde::{Deserialize, Serialize};
use yrs::ReadTxn;

use crate::collab::{Graph, GraphMut};
use crate::error::{ModelError, Result};
use crate::model::{
    now_millis, DocumentMeta, DocumentSummary, Page, DEFAULT_PAGE_NAME, DEFAULT_TITLE,
    SCHEMA_VERSION,
};
use crate::ops::new_id;
use crate::schema::Schema;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::model::double_option")]
    pub folder: Option<Option<String>>,
}

/// A document with its pages and schemas.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub pages: Vec<Page>,
    pub active_page_id: Option<String>,
    pub schemas: Vec<Schema>,
}

/// Seed a new document: metadata plus one active page.
pub fn create(g: &mut GraphMut<'_, '_>, id: &str, input: CreateDocument) -> Result<DocumentView> {
    if g.is_initialized() {
        return Err(ModelError::already_exists("document", id));
    }
    let title = input
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let meta = DocumentMeta {
        id: id.to_string(),
        title,
        folder: input.folder,
        version: SCHEMA_VERSION,
        created_at: now_millis(),
    };
    let page = Page {
        id: new_id(),
        name: DEFAULT_PAGE_NAME.to_string(),
        order: 0,
        description: None,
    };
    g.put_meta(&meta)?;
    g.put_page(&page)?;
    g.set_active_page(&page.id);
    log::debug!("document {id} created with page {}", page.id);
    view(g)
}

pub fn view<T: ReadTxn>(g: &Graph<'_, T>) -> Result<DocumentView> {
    let meta = g
        .meta()?
        .ok_or_else(|| ModelError::not_found("document", "metadata"))?;
    let active_page_id = g.resolve_page(None).ok();
    Ok(DocumentView {
        meta,
        pages: g.pages(),
        active_page_id,
        schemas: g.schemas(),
    })
}

pub fn update(g: &mut GraphMut<'_, '_>, input: UpdateDocument) -> Result<DocumentView> {
    let mut meta = g
        .meta()?
        .ok_or_else(|| ModelError::not_found("document", "metadata"))?;
    if let Some(title) = input.title {
        if title.trim().is_empty() {
            return Err(ModelError::Validation("title must not be empty".into()));
        }
        meta.title = title;
    }
    if let Some(folder) = input.folder {
        meta.folder = folder;
    }
    g.put_meta(&meta)?;
    view(g)
}

/// Listing entry for persistence.  Documents without metadata (never
/// created through the API) are reported under their room id.
pub fn summary<T: ReadTxn>(g: &Graph<'_, T>, id: &str) -> DocumentSummary {
    let meta = g.meta().ok().flatten();
    DocumentSummary {
        id: id.to_string(),
        title: meta
            .as_ref()
            .map_or_else(|| DEFAULT_TITLE.to_string(), |m| m.title.clone()),
        folder: meta.and_then(|m| m.folder),
        page_count: g.pages().len(),
        updated_at: now_millis(),
    }
}
