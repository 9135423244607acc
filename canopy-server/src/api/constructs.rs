use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use canopy_core::ops::constructs::{
    self, CreateConstruct, DeletedConstruct, MoveConstruct, UpdateConstruct,
};
use canopy_core::Construct;
use serde::Deserialize;
use serde_json::Value;

use super::{bulk_response, PageQuery};
use crate::error::ApiResult;
use crate::extract::JsonBody;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreate {
    pub constructs: Vec<CreateConstruct>,
    #[serde(default)]
    pub page_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDelete {
    pub semantic_ids: Vec<String>,
    #[serde(default)]
    pub page_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Construct>>> {
    let constructs = state
        .read(&id, |g| {
            constructs::list(g, query.page_id.as_deref(), query.type_name.as_deref())
        })
        .await?;
    Ok(Json(constructs))
}

pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
    JsonBody(mut input): JsonBody<CreateConstruct>,
) -> ApiResult<(StatusCode, Json<Construct>)> {
    if input.page_id.is_none() {
        input.page_id = query.page_id;
    }
    let construct = state.mutate(&id, |g| constructs::create(g, input)).await?;
    Ok((StatusCode::CREATED, Json(construct)))
}

/// Items run in order; a failed item does not undo the others.
pub async fn bulk_create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<BulkCreate>,
) -> ApiResult<Json<Value>> {
    let page_id = input.page_id;
    let items: Vec<CreateConstruct> = input
        .constructs
        .into_iter()
        .map(|mut item| {
            if item.page_id.is_none() {
                item.page_id = page_id.clone();
            }
            item
        })
        .collect();
    let results = state
        .mutate(&id, |g| Ok(constructs::bulk_create(g, items)))
        .await?;
    Ok(bulk_response(results))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<BulkDelete>,
) -> ApiResult<Json<Value>> {
    let results = state
        .mutate(&id, |g| {
            Ok(constructs::bulk_delete(
                g,
                input.page_id.as_deref(),
                &input.semantic_ids,
            ))
        })
        .await?;
    Ok(bulk_response(results))
}

pub async fn get(
    State(state): State<AppState>,
    Path((id, semantic_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Construct>> {
    let construct = state
        .read(&id, |g| {
            constructs::get(g, query.page_id.as_deref(), &semantic_id)
        })
        .await?;
    Ok(Json(construct))
}

pub async fn update(
    State(state): State<AppState>,
    Path((id, semantic_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
    JsonBody(input): JsonBody<UpdateConstruct>,
) -> ApiResult<Json<Construct>> {
    let construct = state
        .mutate(&id, |g| {
            constructs::update(g, query.page_id.as_deref(), &semantic_id, input)
        })
        .await?;
    Ok(Json(construct))
}

pub async fn move_to(
    State(state): State<AppState>,
    Path((id, semantic_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
    JsonBody(input): JsonBody<MoveConstruct>,
) -> ApiResult<Json<Construct>> {
    let construct = state
        .mutate(&id, |g| {
            constructs::move_to(g, query.page_id.as_deref(), &semantic_id, input)
        })
        .await?;
    Ok(Json(construct))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((id, semantic_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<DeletedConstruct>> {
    let outcome = state
        .mutate(&id, |g| {
            constructs::delete(g, query.page_id.as_deref(), &semantic_id)
        })
        .await?;
    Ok(Json(outcome))
}
