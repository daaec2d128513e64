use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{CreateFeaturedRequest, PaginationParams};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::types::{FeaturedCommunity, Visibility};

pub async fn create_featured(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFeaturedRequest>,
) -> impl IntoResponse {
    let community = state
        .store
        .get_community(&req.community_id)
        .api_err("Failed to get community")?
        .or_not_found("Community not found")?;

    if community.visibility != Visibility::Public {
        return Err(ApiError::bad_request(
            "Only public communities can be featured",
        ));
    }

    let entry = FeaturedCommunity {
        id: Uuid::new_v4().to_string(),
        community_id: community.id,
        start_at: req.start_at.unwrap_or_else(Utc::now),
        created_at: Utc::now(),
    };

    state
        .store
        .create_featured(&entry)
        .api_err("Failed to create featured entry")?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(entry))))
}

pub async fn list_featured(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let entries = state
        .store
        .list_featured(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list featured entries")?;

    let (entries, next_cursor, has_more) =
        paginate(entries, DEFAULT_PAGE_SIZE as usize, |f| f.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(entries, next_cursor, has_more)))
}

pub async fn delete_featured(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let deleted = state
        .store
        .delete_featured(&id)
        .api_err("Failed to delete featured entry")?;

    if !deleted {
        return Err(ApiError::not_found("Featured entry not found"));
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
