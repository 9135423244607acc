//! HTTP mutation API.
//!
//! Every mutating handler runs one transaction against the document's
//! live session, so its update is broadcast like any socket update.

mod connections;
mod constructs;
mod documents;
mod organizers;
mod pages;
mod schemas;
mod views;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use canopy_core::ItemResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::CorsLayer;

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws;

/// `?pageId=` and `?type=` filters shared by page-scoped routes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageQuery {
    pub page_id: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
}

/// Per-item results of a bulk call.
pub(crate) fn bulk_response<T: Serialize>(results: Vec<ItemResult<T>>) -> Json<Value> {
    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;
    Json(json!({
        "results": results,
        "succeeded": succeeded,
        "failed": failed,
    }))
}

pub(crate) fn deleted(deleted: bool) -> Json<Value> {
    Json(json!({ "deleted": deleted }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health).fallback(method_not_allowed))
        .route(
            "/api/documents",
            get(documents::list)
                .post(documents::create)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id",
            get(documents::get)
                .patch(documents::update)
                .delete(documents::delete)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/pages",
            get(pages::list).post(pages::create).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/pages/active",
            post(pages::set_active).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/pages/:page_id",
            get(pages::get)
                .patch(pages::update)
                .delete(pages::delete)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/constructs",
            get(constructs::list)
                .post(constructs::create)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/constructs/bulk",
            post(constructs::bulk_create).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/constructs/bulk-delete",
            post(constructs::bulk_delete).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/constructs/:semantic_id",
            get(constructs::get)
                .patch(constructs::update)
                .delete(constructs::delete)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/constructs/:semantic_id/move",
            post(constructs::move_to).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/organizers",
            get(organizers::list)
                .post(organizers::create)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/organizers/:organizer_id",
            get(organizers::get)
                .patch(organizers::update)
                .delete(organizers::delete)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/connections",
            get(connections::list)
                .post(connections::connect)
                .delete(connections::disconnect)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/connections/bulk",
            post(connections::bulk_connect).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/schemas",
            get(schemas::list).post(schemas::create).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/schemas/:type_name",
            get(schemas::get)
                .patch(schemas::update)
                .delete(schemas::delete)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/schemas/:type_name/migrate",
            post(schemas::migrate).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/compile",
            get(views::compile).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/summary",
            get(views::summary).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/batch",
            post(views::batch).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/layout/flow",
            post(views::flow).fallback(method_not_allowed),
        )
        .route(
            "/api/documents/:id/layout/arrange",
            post(views::arrange).fallback(method_not_allowed),
        )
        .route("/ws/:id", get(ws::upgrade).fallback(method_not_allowed))
        .fallback(route_not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let mut body = Map::new();
    body.insert("status".into(), Value::from("ok"));
    body.insert(
        "activeRooms".into(),
        serde_json::to_value(state.registry.active_rooms().await).unwrap_or_default(),
    );
    body.extend(state.registry.health_metadata());
    Json(Value::Object(body))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}
