//! Ordered multi-operation batches.
//!
//! Every item carries an `op` tag.  Any string value of the form `@N` is
//! replaced, before the item runs, by the reference produced by item `N` of
//! the same batch: a construct's semantic id, or the id of an organizer,
//! page or connection.  Items succeed or fail independently.

use serde::Deserialize;
use serde_json::Value;

use crate::collab::GraphMut;
use crate::error::{ModelError, Result};
use crate::model::ItemResult;
use crate::ops::connections::{self, ConnectRequest, DisconnectRequest};
use crate::ops::constructs::{self, CreateConstruct, MoveConstruct, UpdateConstruct};
use crate::ops::organizers::{self, CreateOrganizer, UpdateOrganizer};
use crate::ops::pages::{self, CreatePage};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BatchOp {
    CreateConstruct(CreateConstruct),
    UpdateConstruct {
        target: String,
        #[serde(default)]
        page_id: Option<String>,
        #[serde(flatten)]
        patch: UpdateConstruct,
    },
    MoveConstruct {
        target: String,
        #[serde(default)]
        page_id: Option<String>,
        #[serde(flatten)]
        to: MoveConstruct,
    },
    DeleteConstruct {
        target: String,
        #[serde(default)]
        page_id: Option<String>,
    },
    Connect(ConnectRequest),
    Disconnect(DisconnectRequest),
    CreateOrganizer(CreateOrganizer),
    UpdateOrganizer {
        target: String,
        #[serde(flatten)]
        patch: UpdateOrganizer,
    },
    DeleteOrganizer {
        target: String,
        #[serde(default)]
        delete_members: bool,
    },
    CreatePage(CreatePage),
}

impl BatchOp {
    pub fn parse(item: Value) -> Result<Self> {
        if item.get("op").is_none() {
            return Err(ModelError::MissingField("op".into()));
        }
        serde_json::from_value(item).map_err(|e| ModelError::Validation(e.to_string()))
    }
}

/// Output of one executed item plus the reference later items may use.
struct Outcome {
    value: Value,
    reference: Option<String>,
}

impl Outcome {
    fn new(value: impl serde::Serialize, reference: Option<String>) -> Result<Self> {
        Ok(Self {
            value: serde_json::to_value(value)?,
            reference,
        })
    }
}

fn execute(g: &mut GraphMut<'_, '_>, op: BatchOp) -> Result<Outcome> {
    match op {
        BatchOp::CreateConstruct(input) => {
            let c = constructs::create(g, input)?;
            let sem = c.semantic_id.clone();
            Outcome::new(c, Some(sem))
        }
        BatchOp::UpdateConstruct {
            target,
            page_id,
            patch,
        } => {
            let c = constructs::update(g, page_id.as_deref(), &target, patch)?;
            let sem = c.semantic_id.clone();
            Outcome::new(c, Some(sem))
        }
        BatchOp::MoveConstruct {
            target,
            page_id,
            to,
        } => {
            let c = constructs::move_to(g, page_id.as_deref(), &target, to)?;
            let sem = c.semantic_id.clone();
            Outcome::new(c, Some(sem))
        }
        BatchOp::DeleteConstruct { target, page_id } => {
            Outcome::new(constructs::delete(g, page_id.as_deref(), &target)?, None)
        }
        BatchOp::Connect(req) => {
            let conn = connections::connect(g, req)?;
            let id = conn.id.clone();
            Outcome::new(conn, Some(id))
        }
        BatchOp::Disconnect(req) => Outcome::new(connections::disconnect(g, req)?, None),
        BatchOp::CreateOrganizer(input) => {
            let org = organizers::create(g, input)?;
            let id = org.id.clone();
            Outcome::new(org, Some(id))
        }
        BatchOp::UpdateOrganizer { target, patch } => {
            let org = organizers::update(g, &target, patch)?;
            let id = org.id.clone();
            Outcome::new(org, Some(id))
        }
        BatchOp::DeleteOrganizer {
            target,
            delete_members,
        } => Outcome::new(organizers::delete(g, &target, delete_members)?, None),
        BatchOp::CreatePage(input) => {
            let page = pages::create(g, input)?;
            let id = page.id.clone();
            Outcome::new(page, Some(id))
        }
    }
}

/// Parse `@N`.
fn placeholder(s: &str) -> Option<usize> {
    let digits = s.strip_prefix('@')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Replace every `@N` string in `value` with the reference of item `N`.
fn resolve(value: &mut Value, index: usize, refs: &[Option<String>]) -> Result<()> {
    match value {
        Value::String(s) => {
            if let Some(n) = placeholder(s) {
                let reference = if n < index {
                    refs.get(n).cloned().flatten()
                } else {
                    None
                };
                match reference {
                    Some(r) => *s = r,
                    None => {
                        return Err(ModelError::Validation(format!(
                            "reference {s} does not name an earlier successful item"
                        )))
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve(item, index, refs)?;
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                resolve(item, index, refs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

pub fn run_batch(g: &mut GraphMut<'_, '_>, items: Vec<Value>) -> Vec<ItemResult<Value>> {
    let mut refs: Vec<Option<String>> = Vec::with_capacity(items.len());
    let mut results = Vec::with_capacity(items.len());

    for (index, mut item) in items.into_iter().enumerate() {
        let outcome = resolve(&mut item, index, &refs)
            .and_then(|()| BatchOp::parse(item))
            .and_then(|op| execute(g, op));
        match outcome {
            Ok(Outcome { value, reference }) => {
                refs.push(reference);
                results.push(ItemResult::from_result(index, Ok(value)));
            }
            Err(e) => {
                log::debug!("batch item {index} failed: {e}");
                refs.push(None);
                results.push(ItemResult::from_result(index, Err(e)));
            }
        }
    }
    results
}
