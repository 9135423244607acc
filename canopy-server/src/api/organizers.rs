use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use canopy_core::ops::organizers::{self, CreateOrganizer, DeletedOrganizer, UpdateOrganizer};
use canopy_core::Organizer;
use serde::Deserialize;

use super::PageQuery;
use crate::error::ApiResult;
use crate::extract::JsonBody;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    #[serde(default)]
    pub delete_members: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Organizer>>> {
    let list = state
        .read(&id, |g| organizers::list(g, query.page_id.as_deref()))
        .await?;
    Ok(Json(list))
}

pub async fn get(
    State(state): State<AppState>,
    Path((id, organizer_id)): Path<(String, String)>,
) -> ApiResult<Json<Organizer>> {
    Ok(Json(
        state.read(&id, |g| organizers::get(g, &organizer_id)).await?,
    ))
}

/// Wraps `memberIds`, if any, re-parenting them into the new organizer.
pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
    JsonBody(mut input): JsonBody<CreateOrganizer>,
) -> ApiResult<(StatusCode, Json<Organizer>)> {
    if input.page_id.is_none() {
        input.page_id = query.page_id;
    }
    let organizer = state.mutate(&id, |g| organizers::create(g, input)).await?;
    Ok((StatusCode::CREATED, Json(organizer)))
}

pub async fn update(
    State(state): State<AppState>,
    Path((id, organizer_id)): Path<(String, String)>,
    JsonBody(input): JsonBody<UpdateOrganizer>,
) -> ApiResult<Json<Organizer>> {
    Ok(Json(
        state
            .mutate(&id, |g| organizers::update(g, &organizer_id, input))
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((id, organizer_id)): Path<(String, String)>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Json<DeletedOrganizer>> {
    Ok(Json(
        state
            .mutate(&id, |g| {
                organizers::delete(g, &organizer_id, query.delete_members)
            })
            .await?,
    ))
}
