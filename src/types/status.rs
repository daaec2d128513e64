use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Moderation status of a community.
///
/// Stored as its lowercase string form. Any other input is a validation
/// failure; a missing value defaults to `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityStatus {
    #[default]
    New,
    Verified,
    Moderated,
}

impl CommunityStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CommunityStatus::New => "new",
            CommunityStatus::Verified => "verified",
            CommunityStatus::Moderated => "moderated",
        }
    }

    /// A community is safelisted once an operator has verified it.
    #[must_use]
    pub const fn is_safelisted(self) -> bool {
        matches!(self, CommunityStatus::Verified)
    }
}

impl FromStr for CommunityStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(CommunityStatus::New),
            "verified" => Ok(CommunityStatus::Verified),
            "moderated" => Ok(CommunityStatus::Moderated),
            other => Err(Error::invalid(
                "status",
                format!("unknown status '{other}', expected one of: new, verified, moderated"),
            )),
        }
    }
}

impl fmt::Display for CommunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for CommunityStatus {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for CommunityStatus {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
