//! Task schedule HTTP handlers
//!
//! Read surface for the external worker that fires due tasks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::services::task::TaskFactory;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub crop_id: Option<Uuid>,
}

/// List active task schedules, optionally filtered by crop
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> impl IntoResponse {
    let service = TaskFactory::new(state.db.clone());

    match service.list_active_tasks(query.crop_id).await {
        Ok(tasks) => (StatusCode::OK, Json(serde_json::json!({ "tasks": tasks }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Cancel every active task for a crop
pub async fn delete_tasks_for_crop(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = TaskFactory::new(state.db.clone());

    match service.delete_tasks_for_crop(crop_id).await {
        Ok(count) => {
            (StatusCode::OK, Json(serde_json::json!({ "deactivated": count }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}
