use serde::{Deserialize, Serialize};

/// Whether a community may have child communities.
///
/// Defaults to false and remembers whether it was explicitly set, so the
/// update path can tell an untouched default apart from a deliberate change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub struct ChildrenFlag {
    value: bool,
    dirty: bool,
}

impl ChildrenFlag {
    /// Wraps a value loaded from storage. Not considered dirty.
    #[must_use]
    pub const fn stored(value: bool) -> Self {
        Self {
            value,
            dirty: false,
        }
    }

    #[must_use]
    pub const fn get(self) -> bool {
        self.value
    }

    /// Explicitly assigns the flag and marks it dirty.
    pub fn set(&mut self, value: bool) {
        self.value = value;
        self.dirty = true;
    }

    #[must_use]
    pub const fn is_dirty(self) -> bool {
        self.dirty
    }
}

impl From<bool> for ChildrenFlag {
    fn from(value: bool) -> Self {
        // Deserialized input is an explicit assignment.
        Self { value, dirty: true }
    }
}

impl From<ChildrenFlag> for bool {
    fn from(flag: ChildrenFlag) -> Self {
        flag.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_false_and_clean() {
        let flag = ChildrenFlag::default();
        assert!(!flag.get());
        assert!(!flag.is_dirty());
    }

    #[test]
    fn test_set_marks_dirty() {
        let mut flag = ChildrenFlag::stored(false);
        assert!(!flag.is_dirty());
        flag.set(true);
        assert!(flag.get());
        assert!(flag.is_dirty());
    }

    #[test]
    fn test_stored_value_is_clean() {
        let flag = ChildrenFlag::stored(true);
        assert!(flag.get());
        assert!(!flag.is_dirty());
    }

    #[test]
    fn test_deserialized_value_is_dirty() {
        let flag: ChildrenFlag = serde_json::from_str("true").unwrap();
        assert!(flag.get());
        assert!(flag.is_dirty());
    }
}
