use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use canopy_core::ops::pages::{self, CreatePage, SetActivePage, UpdatePage};
use canopy_core::Page;
use serde_json::Value;

use super::deleted;
use crate::error::ApiResult;
use crate::extract::JsonBody;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Page>>> {
    Ok(Json(state.read(&id, |g| Ok(pages::list(g))).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path((id, page_id)): Path<(String, String)>,
) -> ApiResult<Json<Page>> {
    Ok(Json(state.read(&id, |g| g.page(&page_id)).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<CreatePage>,
) -> ApiResult<(StatusCode, Json<Page>)> {
    let page = state.mutate(&id, |g| pages::create(g, input)).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

pub async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<SetActivePage>,
) -> ApiResult<Json<Page>> {
    Ok(Json(state.mutate(&id, |g| pages::set_active(g, input)).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path((id, page_id)): Path<(String, String)>,
    JsonBody(input): JsonBody<UpdatePage>,
) -> ApiResult<Json<Page>> {
    Ok(Json(
        state.mutate(&id, |g| pages::update(g, &page_id, input)).await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((id, page_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let removed = state.mutate(&id, |g| pages::delete(g, &page_id)).await?;
    Ok(deleted(removed))
}
