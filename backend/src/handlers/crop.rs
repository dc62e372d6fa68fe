//! Crop management HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::services::crop::{
    CropService, PlantCropInput, RecordHarvestInput, RescheduleCropInput,
};
use crate::services::lifecycle::CropLifecycleService;
use crate::AppState;
use shared::Stage;

/// List all crops
pub async fn list_crops(State(state): State<AppState>) -> impl IntoResponse {
    let service = CropService::new(state.db.clone());

    match service.get_crops().await {
        Ok(crops) => (StatusCode::OK, Json(serde_json::json!({ "crops": crops }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a specific crop
pub async fn get_crop(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = CropService::new(state.db.clone());

    match service.get_crop(crop_id).await {
        Ok(crop) => (StatusCode::OK, Json(crop)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Plant a new crop tray
pub async fn plant_crop(
    State(state): State<AppState>,
    Json(input): Json<PlantCropInput>,
) -> impl IntoResponse {
    let service = CropService::new(state.db.clone());

    match service.plant_crop(input).await {
        Ok(crop) => (StatusCode::CREATED, Json(crop)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Advance a crop (and its batch) to the next applicable stage
pub async fn advance_crop(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = CropService::new(state.db.clone());

    match service.advance_crop(crop_id, None).await {
        Ok(crops) => (StatusCode::OK, Json(serde_json::json!({ "crops": crops }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Expected harvest instant for a crop, from its recipe durations
pub async fn expected_harvest(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> impl IntoResponse {
    let crop = match crate::services::crop::fetch_crop(&state.db, crop_id).await {
        Ok(crop) => crop,
        Err(e) => return e.into_response(),
    };

    let service = CropLifecycleService::new(state.db.clone());
    match service.expected_harvest_at(&crop).await {
        Ok(at) => (
            StatusCode::OK,
            Json(serde_json::json!({ "expected_harvest_at": at })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Record a harvest for a crop
pub async fn record_harvest(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
    Json(input): Json<RecordHarvestInput>,
) -> impl IntoResponse {
    let service = CropService::new(state.db.clone());

    match service.record_harvest(crop_id, input).await {
        Ok(crop) => (StatusCode::OK, Json(crop)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Correct a crop's planting time, shifting its stage timestamps
pub async fn reschedule_crop(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
    Json(input): Json<RescheduleCropInput>,
) -> impl IntoResponse {
    let service = CropService::new(state.db.clone());

    match service.reschedule_crop(crop_id, input).await {
        Ok(crop) => (StatusCode::OK, Json(crop)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Input for resetting a crop backward
#[derive(Debug, Deserialize)]
pub struct ResetStageInput {
    pub target_stage: String,
}

/// Reset a crop to an earlier stage
pub async fn reset_crop_stage(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
    Json(input): Json<ResetStageInput>,
) -> impl IntoResponse {
    let Some(target) = Stage::from_str(&input.target_stage) else {
        return crate::error::AppError::Validation {
            field: "target_stage".to_string(),
            message: format!("Unknown stage code: {}", input.target_stage),
        }
        .into_response();
    };

    let service = CropLifecycleService::new(state.db.clone());
    match service.reset_to_stage(crop_id, target).await {
        Ok(crop) => (StatusCode::OK, Json(crop)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Suspend watering for a crop's batch
pub async fn suspend_watering(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = CropLifecycleService::new(state.db.clone());

    match service.suspend_watering(crop_id, None).await {
        Ok(crops) => (StatusCode::OK, Json(serde_json::json!({ "crops": crops }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Resume watering for a crop's batch
pub async fn resume_watering(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = CropLifecycleService::new(state.db.clone());

    match service.resume_watering(crop_id).await {
        Ok(crops) => (StatusCode::OK, Json(serde_json::json!({ "crops": crops }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Delete a crop, cancelling its outstanding tasks
pub async fn delete_crop(
    State(state): State<AppState>,
    Path(crop_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = CropService::new(state.db.clone());

    match service.delete_crop(crop_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
