use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    governor::BudgetSnapshot,
    models::{
        CharacterProfile, CharacterProfileRequest, IdentifyResponse, Recommendation,
        RecommendationProfile,
    },
    services::vision::UNKNOWN_CHARACTER,
};

use super::AppState;

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Call budget usage for the current 24h window
pub async fn governor_status(State(state): State<AppState>) -> Json<BudgetSnapshot> {
    Json(state.governor.snapshot().await)
}

pub async fn recommend(
    State(state): State<AppState>,
    payload: Result<Json<RecommendationProfile>, JsonRejection>,
) -> AppResult<Json<Vec<Recommendation>>> {
    let Json(profile) = payload?;
    profile.validate()?;

    let recommendations = state
        .governor
        .request_recommendations(&profile)
        .await
        .into_result()?;

    tracing::info!(
        content_type = %profile.content_type,
        count = recommendations.len(),
        "Recommendations served"
    );
    Ok(Json(recommendations))
}

/// Identifies the character in a raw image body
pub async fn identify(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<IdentifyResponse>> {
    if body.is_empty() {
        return Err(AppError::InvalidInput("image body must not be empty".to_string()));
    }

    let name = state
        .governor
        .identify_from_image(body.to_vec())
        .await
        .into_result()?;

    Ok(Json(IdentifyResponse {
        recognized: name != UNKNOWN_CHARACTER,
        name,
    }))
}

pub async fn character_profile(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<CharacterProfileRequest>, JsonRejection>,
) -> AppResult<Json<CharacterProfile>> {
    let Path(mal_id) = path?;
    let Json(request) = payload?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("name must not be empty".to_string()));
    }

    let text = state
        .governor
        .generate_profile_text(mal_id, name, request.biography.as_deref())
        .await
        .into_result()?;

    Ok(Json(CharacterProfile {
        mal_id,
        name: name.to_string(),
        text,
    }))
}
