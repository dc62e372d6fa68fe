//! Route definitions for the Farm Operations Management Platform

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Crop lifecycle management
        .nest("/crops", crop_routes())
        // Task schedules (worker read surface)
        .nest("/tasks", task_routes())
}

/// Crop management routes
fn crop_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_crops).post(handlers::plant_crop))
        .route("/:id", get(handlers::get_crop).delete(handlers::delete_crop))
        .route("/:id/advance", post(handlers::advance_crop))
        .route("/:id/expected-harvest", get(handlers::expected_harvest))
        .route("/:id/harvest", post(handlers::record_harvest))
        .route("/:id/reschedule", post(handlers::reschedule_crop))
        .route("/:id/reset", post(handlers::reset_crop_stage))
        .route("/:id/watering/suspend", post(handlers::suspend_watering))
        .route("/:id/watering/resume", post(handlers::resume_watering))
}

/// Task schedule routes
fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_tasks))
        .route("/crop/:id", delete(handlers::delete_tasks_for_crop))
}
