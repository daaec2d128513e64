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
use crate::server::dto::{CreateGroupRequest, PaginationParams};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::types::Group;

pub async fn create_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Group name cannot be empty"));
    }

    if state
        .store
        .get_group_by_name(&req.name)
        .api_err("Failed to check group name")?
        .is_some()
    {
        return Err(ApiError::conflict("Group already exists"));
    }

    let group = Group {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        created_at: Utc::now(),
    };

    state.store.create_group(&group).map_err(ApiError::from)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(group))))
}

pub async fn list_groups(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let groups = state
        .store
        .list_groups(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list groups")?;

    let (groups, next_cursor, has_more) =
        paginate(groups, DEFAULT_PAGE_SIZE as usize, |g| g.id.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(groups, next_cursor, has_more)))
}

pub async fn get_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let group = state
        .store
        .get_group(&id)
        .api_err("Failed to get group")?
        .or_not_found("Group not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(group)))
}

pub async fn delete_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let group = state
        .store
        .get_group(&id)
        .api_err("Failed to get group")?
        .or_not_found("Group not found")?;

    state
        .store
        .delete_group(&group.id)
        .api_err("Failed to delete group")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
