use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{MaybeUser, RequireAuth};
use crate::error::FieldViolation;
use crate::index::{self, SearchParams};
use crate::notify::MemberNotification;
use crate::policy::{Action, ActorContext};
use crate::server::AppState;
use crate::server::dto::{
    CreateCommunityRequest, DeleteCommunityParams, SearchCommunitiesParams, UpdateCommunityRequest,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreResultExt, paginate,
};
use crate::server::validation::{validate_identifier, validate_slug, validate_title};
use crate::store::Store;
use crate::types::{ChildrenFlag, Community, Member, Role, Visibility};

use super::access::{
    actor_context, parse_enum_field, require, resolve_community, search_filter_for,
};

/// Validates and resolves a parent reference. Malformed ids fail validation;
/// unknown or deleted ids are a not-found; the parent must accept children
/// and sit at the top of the (single-level) hierarchy.
fn resolve_parent(store: &dyn Store, parent_id: &str) -> Result<Community, ApiError> {
    if let Err(violation) = validate_identifier("parent_id", parent_id) {
        return Err(ApiError::validation(vec![violation]));
    }

    let parent = store
        .get_community(parent_id)
        .api_err("Failed to get parent community")?
        .ok_or_else(|| ApiError::not_found("Parent community does not exist"))?;

    if !parent.allow_children.get() {
        return Err(ApiError::validation(vec![FieldViolation::new(
            "parent_id",
            "parent community does not allow children",
        )]));
    }
    if parent.parent_id.is_some() {
        return Err(ApiError::validation(vec![FieldViolation::new(
            "parent_id",
            "nested child communities are not supported",
        )]));
    }

    Ok(parent)
}

/// Actor for operations that are not bound to an existing community yet.
fn unbound_actor(is_admin: bool, user: Option<&crate::types::User>) -> ActorContext {
    if is_admin {
        return ActorContext::admin();
    }
    match user {
        Some(user) => ActorContext::user(user.id.clone(), None),
        None => ActorContext::anonymous(),
    }
}

pub async fn search_communities(
    auth: MaybeUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchCommunitiesParams>,
) -> impl IntoResponse {
    let actor = unbound_actor(auth.is_admin(), auth.user.as_ref());
    require(&actor, Action::Search, None)?;

    let mut violations = Vec::new();
    let status = parse_enum_field(params.status.as_deref(), &mut violations);
    if !violations.is_empty() {
        return Err(ApiError::validation(violations));
    }

    let filter = search_filter_for(&state, auth.is_admin(), auth.user.as_ref())?;

    let search = SearchParams {
        q: params.q,
        status,
        kind: params.kind,
        parent: params.parent,
    };

    let cursor = params.cursor.unwrap_or_default();
    let hits: Vec<_> = state
        .index
        .query(&filter, &search)
        .into_iter()
        .filter(|doc| doc.slug.as_str() > cursor.as_str())
        .take(DEFAULT_PAGE_SIZE as usize + 1)
        .collect();

    let (hits, next_cursor, has_more) =
        paginate(hits, DEFAULT_PAGE_SIZE as usize, |doc| doc.slug.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(hits, next_cursor, has_more)))
}

pub async fn create_community(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCommunityRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let actor = unbound_actor(auth.token.is_admin, auth.user.as_ref());
    require(&actor, Action::Create, None)?;

    let mut violations = Vec::new();
    if let Err(v) = validate_slug(&req.slug) {
        violations.push(v);
    }
    if let Err(v) = validate_title(&req.title) {
        violations.push(v);
    }
    let visibility: Option<Visibility> =
        parse_enum_field(req.visibility.as_deref(), &mut violations);
    let status = parse_enum_field(req.status.as_deref(), &mut violations);
    if !violations.is_empty() {
        return Err(ApiError::validation(violations));
    }

    if store
        .get_community_by_slug(&req.slug)
        .api_err("Failed to check slug")?
        .is_some()
    {
        return Err(ApiError::conflict("Community slug already exists"));
    }

    if let Some(ref parent_id) = req.parent_id {
        resolve_parent(store, parent_id)?;
    }

    let mut allow_children = ChildrenFlag::default();
    if let Some(value) = req.allow_children {
        allow_children.set(value);
    }

    let now = Utc::now();
    let community = Community {
        id: Uuid::new_v4().to_string(),
        slug: req.slug,
        title: req.title,
        kind: req.kind.unwrap_or_else(|| "topic".to_string()),
        visibility: visibility.unwrap_or_default(),
        status: status.unwrap_or_default(),
        allow_children,
        parent_id: req.parent_id,
        bucket_id: req.bucket_id,
        revision: 1,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    store
        .create_community(&community)
        .map_err(ApiError::from)?;

    // The creating user becomes the first owner; admin-created communities
    // start without members.
    if let Some(user) = &auth.user {
        let member = Member {
            id: Uuid::new_v4().to_string(),
            community_id: community.id.clone(),
            user_id: Some(user.id.clone()),
            group_id: None,
            role: Role::Owner,
            active: true,
            visible: false,
            request_id: None,
            group_notifications: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        };
        store.create_member(&member).map_err(ApiError::from)?;

        state.identity_cache.append(&user.id, &community.id);
        state
            .notifier
            .dispatch(vec![MemberNotification::new(user, &member)]);
    }

    index::schedule_refresh(state.store.clone(), state.index.clone(), community.id.clone());

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(community))))
}

pub async fn get_community(
    auth: MaybeUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let actor = actor_context(store, auth.token.as_ref(), auth.user.as_ref(), &community.id)?;
    require(&actor, Action::Read, Some(&community))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(community)))
}

pub async fn update_community(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCommunityRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let mut community = resolve_community(store, &id)?;
    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;
    require(&actor, Action::Update, Some(&community))?;

    let mut violations = Vec::new();
    if let Some(ref title) = req.title {
        if let Err(v) = validate_title(title) {
            violations.push(v);
        }
    }
    let visibility: Option<Visibility> =
        parse_enum_field(req.visibility.as_deref(), &mut violations);
    let status = parse_enum_field(req.status.as_deref(), &mut violations);
    if !violations.is_empty() {
        return Err(ApiError::validation(violations));
    }

    if let Some(title) = req.title {
        community.title = title;
    }
    if let Some(kind) = req.kind {
        community.kind = kind;
    }
    if let Some(visibility) = visibility {
        community.visibility = visibility;
    }
    if let Some(status) = status {
        community.status = status;
    }
    if let Some(value) = req.allow_children {
        community.allow_children.set(value);
    }
    if let Some(bucket_id) = req.bucket_id {
        community.bucket_id = Some(bucket_id);
    }

    match req.parent_id {
        None => {}
        // Explicit null clears the stored parent block entirely
        Some(None) => community.parent_id = None,
        Some(Some(parent_id)) => {
            if parent_id == community.id {
                return Err(ApiError::validation(vec![FieldViolation::new(
                    "parent_id",
                    "community cannot be its own parent",
                )]));
            }
            resolve_parent(store, &parent_id)?;
            community.parent_id = Some(parent_id);
        }
    }

    // Withdrawing the children flag is only valid once no children remain
    if community.allow_children.is_dirty() && !community.allow_children.get() {
        let children = store
            .list_children(&community.id)
            .api_err("Failed to list children")?;
        if !children.is_empty() {
            return Err(ApiError::conflict(
                "Community still has child communities",
            ));
        }
    }

    if community.parent_id.is_some() {
        let children = store
            .list_children(&community.id)
            .api_err("Failed to list children")?;
        if !children.is_empty() {
            return Err(ApiError::validation(vec![FieldViolation::new(
                "parent_id",
                "a community with children cannot become a child",
            )]));
        }
    }

    community.revision = req.revision;
    let updated = store.update_community(&community).map_err(ApiError::from)?;

    index::schedule_refresh(state.store.clone(), state.index.clone(), updated.id.clone());

    Ok::<_, ApiError>(Json(ApiResponse::success(updated)))
}

pub async fn delete_community(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DeleteCommunityParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;
    require(&actor, Action::Delete, Some(&community))?;

    let children = store
        .list_children(&community.id)
        .api_err("Failed to list children")?;
    if !children.is_empty() {
        return Err(ApiError::conflict("Community still has child communities"));
    }

    let revision = params.revision.unwrap_or(community.revision);
    store
        .soft_delete_community(&community.id, revision)
        .map_err(ApiError::from)?;

    index::schedule_refresh(state.store.clone(), state.index.clone(), community.id.clone());

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_featured(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let communities = state
        .store
        .list_featured_communities()
        .api_err("Failed to list featured communities")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(communities)))
}
