use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{RequireAuth, RequireUser};
use crate::policy::Action;
use crate::server::AppState;
use crate::server::dto::{CreateInvitationRequest, UpdateInvitationRequest};
use crate::server::response::{
    ApiError, ApiResponse, StoreOptionExt, StoreResultExt,
};
use crate::store::Store;
use crate::types::{
    Member, RequestKind, RequestStatus, Role, Subject, WorkflowRequest,
};

use super::access::{actor_context, require, resolve_community};
use super::members::notify_member_change;

fn open_request(
    store: &dyn Store,
    member: &Member,
) -> Result<WorkflowRequest, ApiError> {
    let request_id = member
        .request_id
        .as_deref()
        .ok_or_else(|| ApiError::conflict("Member has no associated request"))?;

    let request = store
        .get_request(request_id)
        .api_err("Failed to get request")?
        .or_not_found("Request not found")?;

    if !request.status.is_open() {
        return Err(ApiError::conflict(format!(
            "Request is already {}",
            request.status.as_str()
        )));
    }
    Ok(request)
}

/// Creates the request row plus its pending member row. The member insert
/// carries the uniqueness constraint; on conflict the dangling request is
/// removed again.
fn create_pending_member(
    store: &dyn Store,
    kind: RequestKind,
    community_id: &str,
    subject: Subject,
    role: Role,
) -> Result<Member, ApiError> {
    let now = Utc::now();
    let request = WorkflowRequest {
        id: Uuid::new_v4().to_string(),
        kind,
        community_id: community_id.to_string(),
        status: RequestStatus::Open,
        created_at: now,
        updated_at: now,
    };
    store
        .create_request(&request)
        .api_err("Failed to create request")?;

    let (user_id, group_id) = match subject {
        Subject::User(id) => (Some(id), None),
        Subject::Group(id) => (None, Some(id)),
    };

    let member = Member {
        id: Uuid::new_v4().to_string(),
        community_id: community_id.to_string(),
        user_id,
        group_id,
        role,
        active: false,
        visible: false,
        request_id: Some(request.id.clone()),
        group_notifications: None,
        revision: 1,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = store.create_member(&member) {
        let _ = store.delete_request(&request.id);
        return Err(ApiError::from(e));
    }

    Ok(member)
}

pub async fn list_invitations(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;
    require(&actor, Action::ManageMembers, Some(&community))?;

    let pending = store
        .list_pending_members(&community.id)
        .api_err("Failed to list invitations")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(pending)))
}

pub async fn create_invitation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateInvitationRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;
    require(&actor, Action::ManageMembers, Some(&community))?;

    let role: Role = req.role.parse().map_err(ApiError::from)?;
    if !actor.is_admin && !actor.role.is_some_and(|r| r.can_assign(role)) {
        return Err(ApiError::forbidden("Cannot assign a role above your own"));
    }

    let invited = store
        .get_user(&req.user_id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let member = create_pending_member(
        store,
        RequestKind::Invitation,
        &community.id,
        Subject::User(invited.id.clone()),
        role,
    )?;

    notify_member_change(&state, &invited, &member);

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(member))))
}

/// Role can be adjusted while the invitation is still open.
pub async fn update_invitation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((id, member_id)): Path<(String, String)>,
    Json(req): Json<UpdateInvitationRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;
    require(&actor, Action::ManageMembers, Some(&community))?;

    let mut member = store
        .get_member(&member_id)
        .api_err("Failed to get member")?
        .or_not_found("Invitation not found")?;
    if member.community_id != community.id || member.active {
        return Err(ApiError::not_found("Invitation not found"));
    }
    open_request(store, &member)?;

    let role: Role = req.role.parse().map_err(ApiError::from)?;
    if !actor.is_admin && !actor.role.is_some_and(|r| r.can_assign(role)) {
        return Err(ApiError::forbidden("Cannot assign a role above your own"));
    }

    member.role = role;
    member.revision = req.revision;
    let updated = store.update_member(&member).map_err(ApiError::from)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(updated)))
}

pub async fn invitation_action(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((id, member_id, action)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let outcome = match action.as_str() {
        "accept" => RequestStatus::Accepted,
        "decline" => RequestStatus::Declined,
        "cancel" => RequestStatus::Cancelled,
        "expire" => RequestStatus::Expired,
        other => {
            return Err(ApiError::bad_request(format!("Unknown action '{other}'")));
        }
    };

    let community = resolve_community(store, &id)?;
    let member = store
        .get_member(&member_id)
        .api_err("Failed to get member")?
        .or_not_found("Invitation not found")?;
    if member.community_id != community.id {
        return Err(ApiError::not_found("Invitation not found"));
    }
    let request = open_request(store, &member)?;

    let actor = actor_context(store, Some(&auth.token), auth.user.as_ref(), &community.id)?;
    let is_subject = actor
        .user_id
        .as_deref()
        .is_some_and(|uid| member.user_id.as_deref() == Some(uid));

    // Who may drive which transition depends on the request direction: the
    // invited user answers an invitation, the community answers a join
    // request, and either side can withdraw its own.
    let permitted = match (request.kind, outcome) {
        (_, RequestStatus::Expired) => actor.is_admin,
        (RequestKind::Invitation, RequestStatus::Accepted | RequestStatus::Declined) => is_subject,
        (RequestKind::Invitation, RequestStatus::Cancelled) => {
            crate::policy::allows(&actor, Action::ManageMembers, Some(&community))
        }
        (RequestKind::MembershipRequest, RequestStatus::Accepted | RequestStatus::Declined) => {
            crate::policy::allows(&actor, Action::ManageMembers, Some(&community))
        }
        (RequestKind::MembershipRequest, RequestStatus::Cancelled) => is_subject,
        (_, RequestStatus::Open) => false,
    };
    if !permitted {
        return Err(ApiError::forbidden(
            "Not allowed to perform this action on the request",
        ));
    }

    store
        .conclude_membership_request(&member.id, outcome)
        .map_err(ApiError::from)?;

    let concluded = if outcome == RequestStatus::Accepted {
        let activated = store
            .get_member(&member.id)
            .api_err("Failed to get member")?
            .or_not_found("Member not found")?;
        if let Some(user_id) = &activated.user_id {
            state.identity_cache.append(user_id, &community.id);
            if let Ok(Some(user)) = store.get_user(user_id) {
                notify_member_change(&state, &user, &activated);
            }
        }
        activated
    } else {
        if let Some(user_id) = &member.user_id {
            if let Ok(Some(user)) = store.get_user(user_id) {
                notify_member_change(&state, &user, &member);
            }
        }
        member
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(concluded)))
}

/// Self-service join request: any user who can see the community may ask to
/// join as a reader.
pub async fn create_membership_request(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let community = resolve_community(store, &id)?;
    let actor = actor_context(store, Some(&auth.token), Some(&auth.user), &community.id)?;
    require(&actor, Action::Read, Some(&community))?;

    let subject = Subject::User(auth.user.id.clone());
    if store
        .get_member_by_subject(&community.id, &subject)
        .api_err("Failed to check membership")?
        .is_some()
    {
        return Err(ApiError::conflict(
            "Membership already exists for this subject",
        ));
    }

    let member = create_pending_member(
        store,
        RequestKind::MembershipRequest,
        &community.id,
        subject,
        Role::Reader,
    )?;

    notify_member_change(&state, &auth.user, &member);

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(member))))
}
