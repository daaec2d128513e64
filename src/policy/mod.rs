//! Permission policy for community operations.
//!
//! Policies are predicate functions over an actor and an optional community
//! record, composed from a few combinators. When an action is evaluated
//! without a record (e.g. a link object not yet bound to one), the
//! restrictive branch applies.

use crate::error::Result;
use crate::store::Store;
use crate::types::{Community, Role, Subject, Visibility};

/// Named actions a policy can decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Search,
    ReadMembers,
    ManageMembers,
    Feature,
}

/// The identity a request is evaluated for.
#[derive(Debug, Clone, Default)]
pub struct ActorContext {
    /// None for anonymous callers.
    pub user_id: Option<String>,
    pub is_admin: bool,
    /// The actor's active role in the community under evaluation, if any.
    pub role: Option<Role>,
}

impl ActorContext {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn admin() -> Self {
        Self {
            user_id: None,
            is_admin: true,
            role: None,
        }
    }

    #[must_use]
    pub fn user(user_id: impl Into<String>, role: Option<Role>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_admin: false,
            role,
        }
    }
}

type Predicate = Box<dyn Fn(&ActorContext, Option<&Community>) -> bool>;

fn anyone() -> Predicate {
    Box::new(|_, _| true)
}

fn authenticated() -> Predicate {
    Box::new(|actor, _| actor.is_admin || actor.user_id.is_some())
}

fn admin_only() -> Predicate {
    Box::new(|actor, _| actor.is_admin)
}

fn min_role(required: Role) -> Predicate {
    Box::new(move |actor, _| actor.role.is_some_and(|r| r.is_at_least(required)))
}

/// Grants when any inner predicate grants.
fn any_of(predicates: Vec<Predicate>) -> Predicate {
    Box::new(move |actor, record| predicates.iter().any(|p| p(actor, record)))
}

/// Selects between predicate sets on the record's visibility. A missing
/// record takes the restricted branch.
fn if_public(when_public: Predicate, when_restricted: Predicate) -> Predicate {
    Box::new(move |actor, record| match record {
        Some(c) if c.visibility == Visibility::Public => when_public(actor, record),
        _ => when_restricted(actor, record),
    })
}

fn policy_for(action: Action) -> Predicate {
    match action {
        Action::Create => authenticated(),
        Action::Read => if_public(
            anyone(),
            any_of(vec![admin_only(), min_role(Role::Reader)]),
        ),
        Action::Update => any_of(vec![admin_only(), min_role(Role::Manager)]),
        Action::Delete => any_of(vec![admin_only(), min_role(Role::Owner)]),
        Action::Search => anyone(),
        Action::ReadMembers => any_of(vec![admin_only(), min_role(Role::Reader)]),
        Action::ManageMembers => any_of(vec![admin_only(), min_role(Role::Manager)]),
        Action::Feature => admin_only(),
    }
}

/// Returns true if the actor may perform the action on the record.
#[must_use]
pub fn allows(actor: &ActorContext, action: Action, record: Option<&Community>) -> bool {
    policy_for(action)(actor, record)
}

/// Looks up the actor's active role in a community.
pub fn resolve_role(
    store: &dyn Store,
    user_id: &str,
    community_id: &str,
) -> Result<Option<Role>> {
    let member =
        store.get_member_by_subject(community_id, &Subject::User(user_id.to_string()))?;
    Ok(member.filter(|m| m.active).map(|m| m.role))
}

/// Restricts search results to what the actor is entitled to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    All,
    PublicOnly,
    /// Public records plus the actor's own communities.
    PublicOr { community_ids: Vec<String> },
}

impl SearchFilter {
    #[must_use]
    pub fn matches(&self, community_id: &str, visibility: Visibility) -> bool {
        match self {
            SearchFilter::All => true,
            SearchFilter::PublicOnly => visibility == Visibility::Public,
            SearchFilter::PublicOr { community_ids } => {
                visibility == Visibility::Public
                    || community_ids.iter().any(|id| id == community_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChildrenFlag, CommunityStatus};
    use chrono::Utc;

    fn community(visibility: Visibility) -> Community {
        let now = Utc::now();
        Community {
            id: "c1".to_string(),
            slug: "c1".to_string(),
            title: "C1".to_string(),
            kind: "topic".to_string(),
            visibility,
            status: CommunityStatus::default(),
            allow_children: ChildrenFlag::default(),
            parent_id: None,
            bucket_id: None,
            revision: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_anonymous_reads_public_only() {
        let actor = ActorContext::anonymous();
        assert!(allows(&actor, Action::Read, Some(&community(Visibility::Public))));
        assert!(!allows(&actor, Action::Read, Some(&community(Visibility::Restricted))));
    }

    #[test]
    fn test_missing_record_takes_restricted_branch() {
        let actor = ActorContext::anonymous();
        assert!(!allows(&actor, Action::Read, None));

        let admin = ActorContext::admin();
        assert!(allows(&admin, Action::Read, None));
    }

    #[test]
    fn test_member_reads_restricted_community() {
        let reader = ActorContext::user("u1", Some(Role::Reader));
        assert!(allows(&reader, Action::Read, Some(&community(Visibility::Restricted))));

        let outsider = ActorContext::user("u2", None);
        assert!(!allows(&outsider, Action::Read, Some(&community(Visibility::Restricted))));
    }

    #[test]
    fn test_update_requires_manager() {
        let record = community(Visibility::Public);
        assert!(allows(&ActorContext::user("u1", Some(Role::Manager)), Action::Update, Some(&record)));
        assert!(allows(&ActorContext::user("u1", Some(Role::Owner)), Action::Update, Some(&record)));
        assert!(!allows(&ActorContext::user("u1", Some(Role::Curator)), Action::Update, Some(&record)));
    }

    #[test]
    fn test_delete_requires_owner() {
        let record = community(Visibility::Public);
        assert!(!allows(&ActorContext::user("u1", Some(Role::Manager)), Action::Delete, Some(&record)));
        assert!(allows(&ActorContext::user("u1", Some(Role::Owner)), Action::Delete, Some(&record)));
        assert!(allows(&ActorContext::admin(), Action::Delete, Some(&record)));
    }

    #[test]
    fn test_feature_is_admin_only() {
        let record = community(Visibility::Public);
        assert!(!allows(&ActorContext::user("u1", Some(Role::Owner)), Action::Feature, Some(&record)));
        assert!(allows(&ActorContext::admin(), Action::Feature, Some(&record)));
    }

    #[test]
    fn test_search_filter_matching() {
        let filter = SearchFilter::PublicOr {
            community_ids: vec!["mine".to_string()],
        };
        assert!(filter.matches("other", Visibility::Public));
        assert!(filter.matches("mine", Visibility::Restricted));
        assert!(!filter.matches("other", Visibility::Restricted));

        assert!(SearchFilter::All.matches("other", Visibility::Restricted));
        assert!(!SearchFilter::PublicOnly.matches("other", Visibility::Restricted));
    }
}
