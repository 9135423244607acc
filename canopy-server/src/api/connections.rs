use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use canopy_core::ops::connections::{self, ConnectRequest, DisconnectRequest, Disconnected};
use canopy_core::Connection;
use serde::Deserialize;
use serde_json::Value;

use super::{bulk_response, PageQuery};
use crate::error::ApiResult;
use crate::extract::JsonBody;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkConnect {
    pub connections: Vec<ConnectRequest>,
    #[serde(default)]
    pub page_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Connection>>> {
    let list = state
        .read(&id, |g| connections::list(g, query.page_id.as_deref()))
        .await?;
    Ok(Json(list))
}

pub async fn connect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
    JsonBody(mut input): JsonBody<ConnectRequest>,
) -> ApiResult<(StatusCode, Json<Connection>)> {
    if input.page_id.is_none() {
        input.page_id = query.page_id;
    }
    let connection = state.mutate(&id, |g| connections::connect(g, input)).await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
    JsonBody(mut input): JsonBody<DisconnectRequest>,
) -> ApiResult<Json<Disconnected>> {
    if input.page_id.is_none() {
        input.page_id = query.page_id;
    }
    Ok(Json(
        state
            .mutate(&id, |g| connections::disconnect(g, input))
            .await?,
    ))
}

pub async fn bulk_connect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<BulkConnect>,
) -> ApiResult<Json<Value>> {
    let page_id = input.page_id;
    let items: Vec<ConnectRequest> = input
        .connections
        .into_iter()
        .map(|mut item| {
            if item.page_id.is_none() {
                item.page_id = page_id.clone();
            }
            item
        })
        .collect();
    let results = state
        .mutate(&id, |g| Ok(connections::bulk_connect(g, items)))
        .await?;
    Ok(bulk_response(results))
}
