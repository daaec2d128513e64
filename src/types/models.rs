use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChildrenFlag, CommunityStatus, Role};
use crate::error::{Error, FieldViolation};

/// Who may read a community and its record listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Restricted,
}

impl Visibility {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Restricted => "restricted",
        }
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "restricted" => Ok(Visibility::Restricted),
            other => Err(Error::invalid(
                "visibility",
                format!("unknown visibility '{other}', expected public or restricted"),
            )),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub slug: String,
    pub title: String,
    /// Free-form type label: organization, event, topic, project.
    pub kind: String,
    pub visibility: Visibility,
    pub status: CommunityStatus,
    pub allow_children: ChildrenFlag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<String>,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Community {
    #[must_use]
    pub fn is_safelisted(&self) -> bool {
        self.status.is_safelisted()
    }
}

/// The subject of a membership: exactly one of a user or a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    User(String),
    Group(String),
}

impl Subject {
    /// Validates that exactly one subject reference is present.
    pub fn from_refs(
        user_id: Option<String>,
        group_id: Option<String>,
    ) -> crate::error::Result<Self> {
        match (user_id, group_id) {
            (Some(u), None) => Ok(Subject::User(u)),
            (None, Some(g)) => Ok(Subject::Group(g)),
            (Some(_), Some(_)) => Err(Error::Validation(vec![
                FieldViolation::new("user_id", "only one of user_id and group_id may be set"),
                FieldViolation::new("group_id", "only one of user_id and group_id may be set"),
            ])),
            (None, None) => Err(Error::Validation(vec![
                FieldViolation::new("user_id", "one of user_id or group_id is required"),
                FieldViolation::new("group_id", "one of user_id or group_id is required"),
            ])),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub community_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub role: Role,
    pub active: bool,
    pub visible: bool,
    /// Links a pending invitation or membership request to its workflow
    /// request. Cleared when the request is deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Only meaningful for group subjects; always None for users.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_notifications: Option<bool>,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Invitation,
    MembershipRequest,
}

impl RequestKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestKind::Invitation => "invitation",
            RequestKind::MembershipRequest => "membership_request",
        }
    }
}

impl FromStr for RequestKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invitation" => Ok(RequestKind::Invitation),
            "membership_request" => Ok(RequestKind::MembershipRequest),
            other => Err(Error::invalid(
                "kind",
                format!("unknown request kind '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Accepted,
    Declined,
    Cancelled,
    Expired,
}

impl RequestStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        }
    }

    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, RequestStatus::Open)
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RequestStatus::Open),
            "accepted" => Ok(RequestStatus::Accepted),
            "declined" => Ok(RequestStatus::Declined),
            "cancelled" => Ok(RequestStatus::Cancelled),
            "expired" => Ok(RequestStatus::Expired),
            other => Err(Error::invalid(
                "status",
                format!("unknown request status '{other}'"),
            )),
        }
    }
}

/// In-flight workflow request backing a pending invitation or join request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub id: String,
    pub kind: RequestKind,
    pub community_id: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of a member row taken when its workflow request
/// concluded. Kept for audit; never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedInvitation {
    pub id: String,
    pub member_id: String,
    pub community_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub role: Role,
    pub visible: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub outcome: RequestStatus,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    /// Bumped on every profile update; embedded copies elsewhere compare
    /// against this to detect staleness.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Version tag of the denormalized profile, `{id}::{revision}`.
    #[must_use]
    pub fn profile_version(&self) -> String {
        format!("{}::{}", self.id, self.revision)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturedCommunity {
    pub id: String,
    pub community_id: String,
    pub start_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_requires_exactly_one_ref() {
        assert!(Subject::from_refs(Some("u1".into()), None).is_ok());
        assert!(Subject::from_refs(None, Some("g1".into())).is_ok());
        assert!(matches!(
            Subject::from_refs(Some("u1".into()), Some("g1".into())),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            Subject::from_refs(None, None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_profile_version_tag() {
        let user = User {
            id: "abc".into(),
            username: "alice".into(),
            display_name: "Alice".into(),
            revision: 4,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(user.profile_version(), "abc::4");
    }
}
