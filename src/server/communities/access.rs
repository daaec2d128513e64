use crate::error::FieldViolation;
use crate::policy::{self, Action, ActorContext, SearchFilter};
use crate::server::AppState;
use crate::server::dto::MemberPermissions;
use crate::server::response::{ApiError, StoreResultExt};
use crate::store::Store;
use crate::types::{Community, Member, Role, Token, User};

/// Looks up a community by internal id or external slug.
pub fn resolve_community(store: &dyn Store, id_or_slug: &str) -> Result<Community, ApiError> {
    if let Some(community) = store
        .get_community(id_or_slug)
        .api_err("Failed to get community")?
    {
        return Ok(community);
    }
    store
        .get_community_by_slug(id_or_slug)
        .api_err("Failed to get community")?
        .ok_or_else(|| ApiError::not_found("Community not found"))
}

/// Builds the policy actor for a request, resolving the caller's active role
/// in the community.
pub fn actor_context(
    store: &dyn Store,
    token: Option<&Token>,
    user: Option<&User>,
    community_id: &str,
) -> Result<ActorContext, ApiError> {
    if token.is_some_and(|t| t.is_admin) {
        return Ok(ActorContext::admin());
    }

    match user {
        Some(user) => {
            let role = policy::resolve_role(store, &user.id, community_id)
                .api_err("Failed to resolve member role")?;
            Ok(ActorContext::user(user.id.clone(), role))
        }
        None => Ok(ActorContext::anonymous()),
    }
}

pub fn require(
    actor: &ActorContext,
    action: Action,
    record: Option<&Community>,
) -> Result<(), ApiError> {
    if !policy::allows(actor, action, record) {
        return Err(ApiError::forbidden("Insufficient community permissions"));
    }
    Ok(())
}

/// Policy filter for search, memoized through the identity cache.
pub fn search_filter_for(
    state: &AppState,
    is_admin: bool,
    user: Option<&User>,
) -> Result<SearchFilter, ApiError> {
    if is_admin {
        return Ok(SearchFilter::All);
    }

    let Some(user) = user else {
        return Ok(SearchFilter::PublicOnly);
    };

    if let Some(community_ids) = state.identity_cache.get(&user.id) {
        return Ok(SearchFilter::PublicOr { community_ids });
    }

    let community_ids: Vec<String> = state
        .store
        .list_user_memberships(&user.id)
        .api_err("Failed to list memberships")?
        .into_iter()
        .map(|m| m.community_id)
        .collect();
    state.identity_cache.set(&user.id, community_ids.clone());

    Ok(SearchFilter::PublicOr { community_ids })
}

/// What the actor may do to a listed member. Managers act on members at or
/// below their own role; members may always touch their own row.
pub fn member_permissions(actor: &ActorContext, member: &Member) -> MemberPermissions {
    let is_self = actor
        .user_id
        .as_deref()
        .is_some_and(|id| member.user_id.as_deref() == Some(id));
    let manages = actor.is_admin
        || actor
            .role
            .is_some_and(|r| r.is_at_least(Role::Manager) && r >= member.role);

    MemberPermissions {
        can_update: manages || is_self,
        can_delete: manages || is_self,
    }
}

/// Parses an optional enumerated string field, pushing any violation into
/// the running list.
pub fn parse_enum_field<T>(
    value: Option<&str>,
    violations: &mut Vec<FieldViolation>,
) -> Option<T>
where
    T: std::str::FromStr<Err = crate::error::Error>,
{
    let s = value?;
    match s.parse() {
        Ok(parsed) => Some(parsed),
        Err(crate::error::Error::Validation(mut inner)) => {
            violations.append(&mut inner);
            None
        }
        Err(_) => None,
    }
}
