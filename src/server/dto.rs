use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Member;

// ── Communities ──────────────────────────────────────────────────────────────

/// Enumerated fields arrive as plain strings and are parsed in the handler,
/// so a malformed value surfaces as a structured validation failure instead
/// of a body-rejection.
#[derive(Debug, Deserialize)]
pub struct CreateCommunityRequest {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub allow_children: Option<bool>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub bucket_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommunityRequest {
    /// Revision the caller read; a mismatch is a conflict.
    pub revision: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub allow_children: Option<bool>,
    /// Absent = untouched, null = clear the parent block, value = re-parent.
    #[serde(default)]
    pub parent_id: Option<Option<String>>,
    #[serde(default)]
    pub bucket_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchCommunitiesParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteCommunityParams {
    /// Revision guard; omitting it deletes whatever revision is current.
    #[serde(default)]
    pub revision: Option<i64>,
}

// ── Members ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub group_notifications: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub revision: i64,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub group_notifications: Option<bool>,
}

/// What the actor may do to one listed member.
#[derive(Debug, Serialize)]
pub struct MemberPermissions {
    pub can_update: bool,
    pub can_delete: bool,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    #[serde(flatten)]
    pub member: Member,
    pub permissions: MemberPermissions,
}

/// Redacted entry for the public member listing. Role, flags, timestamps,
/// revision, and permissions are deliberately absent.
#[derive(Debug, Serialize)]
pub struct PublicMemberResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl From<Member> for PublicMemberResponse {
    fn from(member: Member) -> Self {
        Self {
            id: member.id,
            user_id: member.user_id,
            group_id: member.group_id,
        }
    }
}

// ── Invitations ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvitationRequest {
    pub revision: i64,
    pub role: String,
}

// ── Admin ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFeaturedRequest {
    pub community_id: String,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: TokenResponse,
}

// ── Shared ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub cursor: Option<String>,
}
