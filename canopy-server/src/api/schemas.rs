use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use canopy_core::ops::schemas::{self, Migration, MigrationSummary, UpdateSchema};
use canopy_core::Schema;
use serde_json::Value;

use super::deleted;
use crate::error::ApiResult;
use crate::extract::JsonBody;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Schema>>> {
    Ok(Json(state.read(&id, |g| Ok(schemas::list(g))).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path((id, type_name)): Path<(String, String)>,
) -> ApiResult<Json<Schema>> {
    Ok(Json(
        state.read(&id, |g| schemas::get(g, &type_name)).await?,
    ))
}

pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(schema): JsonBody<Schema>,
) -> ApiResult<(StatusCode, Json<Schema>)> {
    let schema = state.mutate(&id, |g| schemas::create(g, schema)).await?;
    Ok((StatusCode::CREATED, Json(schema)))
}

pub async fn update(
    State(state): State<AppState>,
    Path((id, type_name)): Path<(String, String)>,
    JsonBody(input): JsonBody<UpdateSchema>,
) -> ApiResult<Json<Schema>> {
    Ok(Json(
        state
            .mutate(&id, |g| schemas::update(g, &type_name, input))
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((id, type_name)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let removed = state
        .mutate(&id, |g| schemas::delete(g, &type_name))
        .await?;
    Ok(deleted(removed))
}

/// Rewrites every construct of the type in the same transaction, or
/// fails before touching any.
pub async fn migrate(
    State(state): State<AppState>,
    Path((id, type_name)): Path<(String, String)>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<MigrationSummary>> {
    let migration = Migration::parse(body)?;
    Ok(Json(
        state
            .mutate(&id, |g| schemas::migrate(g, &type_name, migration))
            .await?,
    ))
}
