mod schema;
mod sqlite;

pub use schema::{MIGRATIONS, Migration};
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Community operations
    fn create_community(&self, community: &Community) -> Result<()>;
    fn get_community(&self, id: &str) -> Result<Option<Community>>;
    fn get_community_by_slug(&self, slug: &str) -> Result<Option<Community>>;
    fn list_communities(&self, cursor: &str, limit: i32) -> Result<Vec<Community>>;
    fn list_children(&self, parent_id: &str) -> Result<Vec<Community>>;
    /// Revision-guarded update. Fails with `StaleRevision` when the stored
    /// revision no longer matches; returns the bumped row.
    fn update_community(&self, community: &Community) -> Result<Community>;
    fn soft_delete_community(&self, id: &str, revision: i64) -> Result<()>;
    fn get_community_version(&self, id: &str, revision: i64) -> Result<Option<Community>>;
    fn list_community_revisions(&self, id: &str) -> Result<Vec<i64>>;

    // Member operations
    fn create_member(&self, member: &Member) -> Result<()>;
    fn get_member(&self, id: &str) -> Result<Option<Member>>;
    fn get_member_by_subject(
        &self,
        community_id: &str,
        subject: &Subject,
    ) -> Result<Option<Member>>;
    fn list_members(&self, community_id: &str, cursor: &str, limit: i32) -> Result<Vec<Member>>;
    /// Active, visible members only; feeds the redacted public view.
    fn list_public_members(&self, community_id: &str) -> Result<Vec<Member>>;
    /// Pending invitations and join requests (inactive rows with a request link).
    fn list_pending_members(&self, community_id: &str) -> Result<Vec<Member>>;
    fn list_user_memberships(&self, user_id: &str) -> Result<Vec<Member>>;
    fn update_member(&self, member: &Member) -> Result<Member>;
    fn delete_member(&self, id: &str) -> Result<bool>;
    fn count_active_owners(&self, community_id: &str) -> Result<i32>;

    // Request operations
    fn create_request(&self, request: &WorkflowRequest) -> Result<()>;
    fn get_request(&self, id: &str) -> Result<Option<WorkflowRequest>>;
    fn delete_request(&self, id: &str) -> Result<bool>;
    /// Concludes the member's open request in one transaction: stamps the
    /// request status, archives a snapshot, then activates (accept) or
    /// removes (decline/cancel/expire) the member row. Returns the member as
    /// it was archived.
    fn conclude_membership_request(
        &self,
        member_id: &str,
        outcome: RequestStatus,
    ) -> Result<Member>;

    // Archived invitation operations
    fn list_archived_invitations(&self, community_id: &str) -> Result<Vec<ArchivedInvitation>>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>>;
    /// Bumps the profile revision.
    fn update_user(&self, user: &User) -> Result<User>;
    fn delete_user(&self, id: &str) -> Result<bool>;

    // Group operations
    fn create_group(&self, group: &Group) -> Result<()>;
    fn get_group(&self, id: &str) -> Result<Option<Group>>;
    fn get_group_by_name(&self, name: &str) -> Result<Option<Group>>;
    fn list_groups(&self, cursor: &str, limit: i32) -> Result<Vec<Group>>;
    fn delete_group(&self, id: &str) -> Result<bool>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Featured community operations
    fn create_featured(&self, entry: &FeaturedCommunity) -> Result<()>;
    fn list_featured(&self, cursor: &str, limit: i32) -> Result<Vec<FeaturedCommunity>>;
    /// Communities currently occupying a feature slot (start_at in the past,
    /// live and public).
    fn list_featured_communities(&self) -> Result<Vec<Community>>;
    fn delete_featured(&self, id: &str) -> Result<bool>;

    // Admin token check
    fn has_admin_token(&self) -> Result<bool>;

    fn close(&self) -> Result<()>;
}
