//! Typed access to the document's entity maps inside one transaction.

use canopy_layout::{GeoNode, NodeArena};
use serde::de::DeserializeOwned;
use serde::Serialize;
use yrs::{Any, Map, MapRef, Out, ReadTxn, TransactionMut};

use crate::error::{ModelError, Result};
use crate::model::{Connection, Construct, DocumentMeta, Organizer, Page};
use crate::schema::Schema;

const META_KEY: &str = "document";
const ACTIVE_PAGE_KEY: &str = "activePage";

/// Root maps of a document.
pub(crate) struct Maps {
    pub meta: MapRef,
    pub pages: MapRef,
    pub schemas: MapRef,
    pub nodes: MapRef,
    pub organizers: MapRef,
    pub connections: MapRef,
}

impl Maps {
    pub fn new(doc: &yrs::Doc) -> Self {
        Self {
            meta: doc.get_or_insert_map("meta"),
            pages: doc.get_or_insert_map("pages"),
            schemas: doc.get_or_insert_map("schemas"),
            nodes: doc.get_or_insert_map("nodes"),
            organizers: doc.get_or_insert_map("organizers"),
            connections: doc.get_or_insert_map("connections"),
        }
    }
}

/// A transaction over the document graph.  Reads are available on any
/// transaction; writes only on [`GraphMut`].
pub struct Graph<'a, T> {
    pub(crate) txn: T,
    maps: &'a Maps,
}

pub type GraphMut<'a, 'doc> = Graph<'a, TransactionMut<'doc>>;

fn decode<T: DeserializeOwned>(kind: &'static str, key: &str, value: Out) -> Result<T> {
    match value {
        Out::Any(Any::String(json)) => {
            serde_json::from_str(&json).map_err(|e| ModelError::Corrupt {
                kind,
                id: key.to_string(),
                reason: e.to_string(),
            })
        }
        other => Err(ModelError::Corrupt {
            kind,
            id: key.to_string(),
            reason: format!("unexpected value {other:?}"),
        }),
    }
}

impl<'a, T: ReadTxn> Graph<'a, T> {
    pub(crate) fn new(txn: T, maps: &'a Maps) -> Self {
        Self { txn, maps }
    }

    fn get<E: DeserializeOwned>(&self, map: &MapRef, kind: &'static str, key: &str) -> Result<Option<E>> {
        match map.get(&self.txn, key) {
            Some(value) => decode(kind, key, value).map(Some),
            None => Ok(None),
        }
    }

    /// Every decodable entry of `map`.  Entries that fail to decode are
    /// skipped with a warning so one bad remote write cannot hide the rest.
    fn all<E: DeserializeOwned>(&self, map: &MapRef, kind: &'static str) -> Vec<E> {
        map.iter(&self.txn)
            .filter_map(|(key, value)| match decode(kind, key, value) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    log::warn!("skipping entry: {e}");
                    None
                }
            })
            .collect()
    }

    pub fn meta(&self) -> Result<Option<DocumentMeta>> {
        self.get(&self.maps.meta, "document", META_KEY)
    }

    pub fn is_initialized(&self) -> bool {
        self.maps.meta.get(&self.txn, META_KEY).is_some()
    }

    pub fn active_page_id(&self) -> Option<String> {
        match self.maps.meta.get(&self.txn, ACTIVE_PAGE_KEY) {
            Some(Out::Any(Any::String(id))) => Some(id.to_string()),
            _ => None,
        }
    }

    /// Pages sorted by display order.
    pub fn pages(&self) -> Vec<Page> {
        let mut pages: Vec<Page> = self.all(&self.maps.pages, "page");
        pages.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        pages
    }

    pub fn page(&self, id: &str) -> Result<Page> {
        self.get(&self.maps.pages, "page", id)?
            .ok_or_else(|| ModelError::not_found("page", id))
    }

    /// The page a page-scoped call targets: `page_id` when given, else the
    /// active page, else the lowest-order page.
    pub fn resolve_page(&self, page_id: Option<&str>) -> Result<String> {
        if let Some(id) = page_id {
            return self.page(id).map(|p| p.id);
        }
        if let Some(active) = self.active_page_id() {
            if self.maps.pages.get(&self.txn, &active).is_some() {
                return Ok(active);
            }
        }
        self.pages()
            .into_iter()
            .next()
            .map(|p| p.id)
            .ok_or_else(|| ModelError::not_found("page", "active page"))
    }

    pub fn schemas(&self) -> Vec<Schema> {
        let mut schemas: Vec<Schema> = self.all(&self.maps.schemas, "schema");
        schemas.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        schemas
    }

    pub fn schema(&self, type_name: &str) -> Result<Option<Schema>> {
        self.get(&self.maps.schemas, "schema", type_name)
    }

    pub fn require_schema(&self, type_name: &str) -> Result<Schema> {
        self.schema(type_name)?
            .ok_or_else(|| ModelError::not_found("schema", type_name))
    }

    /// Every construct in the document, sorted by semantic id.
    pub fn all_constructs(&self) -> Vec<Construct> {
        let mut nodes: Vec<Construct> = self.all(&self.maps.nodes, "construct");
        nodes.sort_by(|a, b| a.semantic_id.cmp(&b.semantic_id).then_with(|| a.id.cmp(&b.id)));
        nodes
    }

    pub fn constructs_on(&self, page_id: &str) -> Vec<Construct> {
        let mut nodes = self.all_constructs();
        nodes.retain(|c| c.page_id == page_id);
        nodes
    }

    /// Look a construct up on a page by semantic id, falling back to its
    /// internal id.
    pub fn find_construct(&self, page_id: &str, key: &str) -> Result<Construct> {
        let on_page = self.constructs_on(page_id);
        on_page
            .iter()
            .find(|c| c.semantic_id == key)
            .or_else(|| on_page.iter().find(|c| c.id == key))
            .cloned()
            .ok_or_else(|| ModelError::not_found("construct", key))
    }

    pub fn all_organizers(&self) -> Vec<Organizer> {
        let mut orgs: Vec<Organizer> = self.all(&self.maps.organizers, "organizer");
        orgs.sort_by(|a, b| a.id.cmp(&b.id));
        orgs
    }

    pub fn organizers_on(&self, page_id: &str) -> Vec<Organizer> {
        let mut orgs = self.all_organizers();
        orgs.retain(|o| o.page_id == page_id);
        orgs
    }

    pub fn organizer(&self, id: &str) -> Result<Organizer> {
        self.get(&self.maps.organizers, "organizer", id)?
            .ok_or_else(|| ModelError::not_found("organizer", id))
    }

    pub fn all_connections(&self) -> Vec<Connection> {
        let mut conns: Vec<Connection> = self.all(&self.maps.connections, "connection");
        conns.sort_by(|a, b| a.id.cmp(&b.id));
        conns
    }

    pub fn connections_on(&self, page_id: &str) -> Vec<Connection> {
        let mut conns = self.all_connections();
        conns.retain(|c| c.page_id == page_id);
        conns
    }

    /// Geometry view of a page for nesting and bounds math.
    pub fn arena(&self, page_id: &str) -> NodeArena {
        let constructs = self.constructs_on(page_id).into_iter().map(|c| {
            let mut node = GeoNode::construct(c.id, c.semantic_id, c.position);
            node.parent_id = c.parent_id;
            node.size = c.size;
            node
        });
        let organizers = self.organizers_on(page_id).into_iter().map(|o| {
            let mut node = GeoNode::organizer(o.id.clone(), o.position, o.size());
            node.parent_id = o.parent_id;
            match o.attached_to {
                Some(sem) => node.attached_to(sem),
                None => node,
            }
        });
        NodeArena::from_nodes(constructs.chain(organizers))
    }
}

impl<'a, 'doc> Graph<'a, TransactionMut<'doc>> {
    fn put<E: Serialize>(&mut self, map: &MapRef, key: &str, entity: &E) -> Result<()> {
        let json = serde_json::to_string(entity)?;
        map.insert(&mut self.txn, key.to_string(), json);
        Ok(())
    }

    pub fn put_meta(&mut self, meta: &DocumentMeta) -> Result<()> {
        let maps = self.maps;
        self.put(&maps.meta, META_KEY, meta)
    }

    pub fn set_active_page(&mut self, page_id: &str) {
        self.maps
            .meta
            .insert(&mut self.txn, ACTIVE_PAGE_KEY, page_id.to_string());
    }

    pub fn put_page(&mut self, page: &Page) -> Result<()> {
        let maps = self.maps;
        self.put(&maps.pages, &page.id, page)
    }

    pub fn remove_page(&mut self, id: &str) -> bool {
        self.maps.pages.remove(&mut self.txn, id).is_some()
    }

    pub fn put_schema(&mut self, schema: &Schema) -> Result<()> {
        let maps = self.maps;
        self.put(&maps.schemas, &schema.type_name, schema)
    }

    pub fn remove_schema(&mut self, type_name: &str) -> bool {
        self.maps.schemas.remove(&mut self.txn, type_name).is_some()
    }

    pub fn put_construct(&mut self, construct: &Construct) -> Result<()> {
        let maps = self.maps;
        self.put(&maps.nodes, &construct.id, construct)
    }

    pub fn remove_construct(&mut self, id: &str) -> bool {
        self.maps.nodes.remove(&mut self.txn, id).is_some()
    }

    pub fn put_organizer(&mut self, organizer: &Organizer) -> Result<()> {
        let maps = self.maps;
        self.put(&maps.organizers, &organizer.id, organizer)
    }

    pub fn remove_organizer(&mut self, id: &str) -> bool {
        self.maps.organizers.remove(&mut self.txn, id).is_some()
    }

    pub fn put_connection(&mut self, connection: &Connection) -> Result<()> {
        let maps = self.maps;
        self.put(&maps.connections, &connection.id, connection)
    }

    pub fn remove_connection(&mut self, id: &str) -> bool {
        self.maps.connections.remove(&mut self.txn, id).is_some()
    }
}
