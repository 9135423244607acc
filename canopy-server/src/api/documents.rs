use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use canopy_core::ops::documents::{self, CreateDocument, DocumentView, UpdateDocument};
use canopy_core::{DocumentSummary, UpdateOrigin};
use serde_json::Value;
use uuid::Uuid;

use super::deleted;
use crate::error::{ApiError, ApiResult};
use crate::extract::JsonBody;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<DocumentSummary>>> {
    Ok(Json(state.registry.list().await?))
}

/// New document with one "Main" page.
pub async fn create(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateDocument>,
) -> ApiResult<(StatusCode, Json<DocumentView>)> {
    let id = Uuid::new_v4().to_string();
    let session = state.registry.get_or_create(&id).await?;
    let view = session
        .document()
        .transact(UpdateOrigin::Local, |g| documents::create(g, &id, input))?;
    state.registry.notify_created(&session)?;
    log::info!("created document {id}");
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DocumentView>> {
    Ok(Json(state.read(&id, |g| documents::view(g)).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<UpdateDocument>,
) -> ApiResult<Json<DocumentView>> {
    Ok(Json(state.mutate(&id, |g| documents::update(g, input)).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.registry.remove(&id).await? {
        return Err(ApiError::DocumentNotFound(id));
    }
    Ok(deleted(true))
}
