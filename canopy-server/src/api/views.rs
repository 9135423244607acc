use axum::extract::{Path, Query, State};
use axum::Json;
use canopy_core::ops::batch::run_batch;
use canopy_core::ops::layout::{self, ArrangeRequest, FlowRequest, LayoutOutcome};
use canopy_core::ops::views::{self, CompiledDocument, GraphSummary};
use serde::Deserialize;
use serde_json::Value;

use super::{bulk_response, PageQuery};
use crate::error::ApiResult;
use crate::extract::JsonBody;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchBody {
    pub operations: Vec<Value>,
}

pub async fn compile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CompiledDocument>> {
    Ok(Json(state.read(&id, |g| views::compile(g)).await?))
}

pub async fn summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GraphSummary>> {
    Ok(Json(state.read(&id, |g| views::summary(g)).await?))
}

/// Operations may reference earlier results as `@N`.
pub async fn batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<BatchBody>,
) -> ApiResult<Json<Value>> {
    let results = state
        .mutate(&id, |g| Ok(run_batch(g, body.operations)))
        .await?;
    Ok(bulk_response(results))
}

pub async fn flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
    JsonBody(mut req): JsonBody<FlowRequest>,
) -> ApiResult<Json<LayoutOutcome>> {
    if req.page_id.is_none() {
        req.page_id = query.page_id;
    }
    Ok(Json(state.mutate(&id, |g| layout::flow(g, req)).await?))
}

pub async fn arrange(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
    JsonBody(mut req): JsonBody<ArrangeRequest>,
) -> ApiResult<Json<LayoutOutcome>> {
    if req.page_id.is_none() {
        req.page_id = query.page_id;
    }
    Ok(Json(
        state.mutate(&id, |g| layout::arrange_page(g, req)).await?,
    ))
}
