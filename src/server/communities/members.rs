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
use crate::error::{Error, FieldViolation};
use crate::notify::MemberNotification;
use crate::policy::Action;
use crate::server::AppState;
use crate::server::dto::{
    AddMemberRequest, MemberResponse, PaginationParams, PublicMemberResponse, UpdateMemberRequest,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::types::{Member, Role, Subject, User};

use super::access::{actor_context, member_permissions, require, resolve_community};

/// Loads a member row and checks it belongs to the addressed community.
fn resolve_member(
    state: &AppState,
    community_id: &str,
    member_id: &str,
) -> Result<Member, ApiError> {
    let member = state
        .store
        .get_member(member_id)
        .api_err("Failed to get member")?
        .or_not_found("Member not found")?;

    if member.community_id != community_id {
        return Err(ApiError::not_found("Member not found"));
    }
    Ok(member)
}

fn notify_if_user(state: &AppState, member: &Member) {
    let Some(user_id) = &member.user_id else {
        return;
    };
    match state.store.get_user(user_id) {
        Ok(Some(user)) => state
            .notifier
            .dispatch(vec![MemberNotification::new(&user, member)]),
        Ok(None) => {}
        Err(e) => tracing::warn!("skipping membership notification: {e}"),
    }
}

pub async fn list_members(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;
    require(&actor, Action::ReadMembers, Some(&community))?;

    let cursor = params.cursor.as_deref().unwrap_or("");
    let members = store
        .list_members(&community.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list members")?;

    let (members, next_cursor, has_more) =
        paginate(members, DEFAULT_PAGE_SIZE as usize, |m| m.id.clone());

    let responses: Vec<MemberResponse> = members
        .into_iter()
        .map(|member| {
            let permissions = member_permissions(&actor, &member);
            MemberResponse {
                member,
                permissions,
            }
        })
        .collect();

    Ok::<_, ApiError>(Json(PaginatedResponse::new(responses, next_cursor, has_more)))
}

/// Redacted listing for callers outside the community: only active members
/// who opted into visibility, stripped down to their subject reference.
pub async fn list_public_members(
    auth: MaybeUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let actor = actor_context(store, auth.token.as_ref(), auth.user.as_ref(), &community.id)?;
    require(&actor, Action::Read, Some(&community))?;

    let members: Vec<PublicMemberResponse> = store
        .list_public_members(&community.id)
        .api_err("Failed to list members")?
        .into_iter()
        .map(PublicMemberResponse::from)
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(members)))
}

pub async fn add_member(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;
    require(&actor, Action::ManageMembers, Some(&community))?;

    let subject = Subject::from_refs(req.user_id, req.group_id).map_err(ApiError::from)?;

    // The groups gate overrides role: even owners cannot add group subjects
    // while groups are disabled.
    if matches!(subject, Subject::Group(_)) && !state.groups_enabled {
        return Err(ApiError::from(Error::GroupsDisabled));
    }

    let role: Role = req.role.parse().map_err(ApiError::from)?;
    if !actor.is_admin && !actor.role.is_some_and(|r| r.can_assign(role)) {
        return Err(ApiError::forbidden("Cannot assign a role above your own"));
    }

    let (user, group_id) = match &subject {
        Subject::User(user_id) => {
            let user = store
                .get_user(user_id)
                .api_err("Failed to get user")?
                .or_not_found("User not found")?;
            (Some(user), None)
        }
        Subject::Group(group_id) => {
            store
                .get_group(group_id)
                .api_err("Failed to get group")?
                .or_not_found("Group not found")?;
            (None, Some(group_id.clone()))
        }
    };

    if user.is_some() && req.group_notifications.is_some() {
        return Err(ApiError::validation(vec![FieldViolation::new(
            "group_notifications",
            "only meaningful for group subjects",
        )]));
    }

    let now = Utc::now();
    let member = Member {
        id: Uuid::new_v4().to_string(),
        community_id: community.id.clone(),
        user_id: user.as_ref().map(|u| u.id.clone()),
        group_id,
        role,
        active: true,
        visible: req.visible.unwrap_or(false),
        request_id: None,
        group_notifications: match subject {
            Subject::Group(_) => Some(req.group_notifications.unwrap_or(true)),
            Subject::User(_) => None,
        },
        revision: 1,
        created_at: now,
        updated_at: now,
    };

    store.create_member(&member).map_err(ApiError::from)?;

    if let Some(user) = &user {
        state.identity_cache.append(&user.id, &community.id);
        state
            .notifier
            .dispatch(vec![MemberNotification::new(user, &member)]);
    }

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(member))))
}

pub async fn update_member(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((id, member_id)): Path<(String, String)>,
    Json(req): Json<UpdateMemberRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let mut member = resolve_member(&state, &community.id, &member_id)?;
    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;

    let is_self = actor
        .user_id
        .as_deref()
        .is_some_and(|uid| member.user_id.as_deref() == Some(uid));
    let manages = actor.is_admin
        || (actor
            .role
            .is_some_and(|r| r.is_at_least(Role::Manager) && r >= member.role));

    if !is_self && !manages {
        require(&actor, Action::ManageMembers, Some(&community))?;
        return Err(ApiError::forbidden(
            "Cannot manage a member with a higher role",
        ));
    }

    if let Some(ref role) = req.role {
        let role: Role = role.parse().map_err(ApiError::from)?;

        if !manages {
            return Err(ApiError::forbidden("Cannot change your own role"));
        }
        if !actor.is_admin && !actor.role.is_some_and(|r| r.can_assign(role)) {
            return Err(ApiError::forbidden("Cannot assign a role above your own"));
        }

        // A community must always keep at least one active owner
        if member.active
            && member.role == Role::Owner
            && role != Role::Owner
            && store
                .count_active_owners(&community.id)
                .api_err("Failed to count owners")?
                <= 1
        {
            return Err(ApiError::conflict("Cannot demote the last owner"));
        }

        member.role = role;
    }

    if let Some(visible) = req.visible {
        member.visible = visible;
    }

    if let Some(group_notifications) = req.group_notifications {
        if !member.is_group() {
            return Err(ApiError::validation(vec![FieldViolation::new(
                "group_notifications",
                "only meaningful for group subjects",
            )]));
        }
        member.group_notifications = Some(group_notifications);
    }

    member.revision = req.revision;
    let updated = store.update_member(&member).map_err(ApiError::from)?;

    notify_if_user(&state, &updated);

    Ok::<_, ApiError>(Json(ApiResponse::success(updated)))
}

pub async fn remove_member(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((id, member_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let member = resolve_member(&state, &community.id, &member_id)?;
    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;

    let is_self = actor
        .user_id
        .as_deref()
        .is_some_and(|uid| member.user_id.as_deref() == Some(uid));
    let manages = actor.is_admin
        || actor
            .role
            .is_some_and(|r| r.is_at_least(Role::Manager) && r >= member.role);

    if !is_self && !manages {
        require(&actor, Action::ManageMembers, Some(&community))?;
        return Err(ApiError::forbidden(
            "Cannot manage a member with a higher role",
        ));
    }

    // Pending invitations conclude through the actions endpoint so an
    // archived snapshot is written.
    if !member.active && member.request_id.is_some() {
        return Err(ApiError::conflict(
            "Pending invitations are concluded via their actions endpoint",
        ));
    }

    if member.active
        && member.role == Role::Owner
        && store
            .count_active_owners(&community.id)
            .api_err("Failed to count owners")?
            <= 1
    {
        return Err(ApiError::conflict("Cannot remove the last owner"));
    }

    store
        .delete_member(&member.id)
        .api_err("Failed to delete member")?;

    if let Some(user_id) = &member.user_id {
        state.identity_cache.delete(user_id);
    }
    notify_if_user(&state, &member);

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

// Used by the invitations module as well.
pub(super) fn notify_member_change(state: &AppState, user: &User, member: &Member) {
    state
        .notifier
        .dispatch(vec![MemberNotification::new(user, member)]);
}
