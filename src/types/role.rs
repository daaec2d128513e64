use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Role of a member within a community.
///
/// Roles are totally ordered: owner > manager > curator > reader. Variant
/// order matters for the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Curator,
    Manager,
    Owner,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Curator => "curator",
            Role::Manager => "manager",
            Role::Owner => "owner",
        }
    }

    /// Returns true if this role is at least as privileged as `required`.
    #[must_use]
    pub fn is_at_least(self, required: Role) -> bool {
        self >= required
    }

    /// Roles a given role is allowed to assign to others. Owners may assign
    /// anything; managers may assign up to manager.
    #[must_use]
    pub fn can_assign(self, assigned: Role) -> bool {
        match self {
            Role::Owner => true,
            Role::Manager => assigned <= Role::Manager,
            _ => false,
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" => Ok(Role::Reader),
            "curator" => Ok(Role::Curator),
            "manager" => Ok(Role::Manager),
            "owner" => Ok(Role::Owner),
            other => Err(Error::invalid(
                "role",
                format!("unknown role '{other}', expected one of: owner, manager, curator, reader"),
            )),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Owner > Role::Manager);
        assert!(Role::Manager > Role::Curator);
        assert!(Role::Curator > Role::Reader);
    }

    #[test]
    fn test_is_at_least() {
        assert!(Role::Owner.is_at_least(Role::Manager));
        assert!(Role::Manager.is_at_least(Role::Manager));
        assert!(!Role::Reader.is_at_least(Role::Curator));
    }

    #[test]
    fn test_can_assign() {
        assert!(Role::Owner.can_assign(Role::Owner));
        assert!(Role::Manager.can_assign(Role::Manager));
        assert!(!Role::Manager.can_assign(Role::Owner));
        assert!(!Role::Curator.can_assign(Role::Reader));
    }

    #[test]
    fn test_parse_role() {
        assert_eq!("owner".parse::<Role>().unwrap(), Role::Owner);
        assert!("admin".parse::<Role>().is_err());
    }
}
