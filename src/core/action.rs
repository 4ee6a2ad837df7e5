//! Operation ids for nested collection actions
//!
//! Every generated route points at one of these ids. The same id is handed
//! to the access checker, so authorization rules can be written per action.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An action reachable through a nested route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NestedAction {
    /// GET /{parent}/{id}/{relation}
    Index,
    /// GET /{parent}/{id}/{relation}/{ids}
    View,
    /// POST /{parent}/{id}/{relation}
    Create,
    /// PUT /{parent}/{id}/{relation}/{ids}
    Link,
    /// DELETE /{parent}/{id}/{relation}/{ids}
    Unlink,
    /// DELETE /{parent}/{id}/{relation}
    UnlinkAll,
    /// Any verb on the options patterns
    Options,
}

impl NestedAction {
    /// All actions, in default pattern-table order
    pub const ALL: [NestedAction; 7] = [
        NestedAction::View,
        NestedAction::Index,
        NestedAction::Create,
        NestedAction::Link,
        NestedAction::Unlink,
        NestedAction::UnlinkAll,
        NestedAction::Options,
    ];

    /// The id used in route strings and configuration
    pub fn id(&self) -> &'static str {
        match self {
            NestedAction::Index => "index",
            NestedAction::View => "view",
            NestedAction::Create => "create",
            NestedAction::Link => "link",
            NestedAction::Unlink => "unlink",
            NestedAction::UnlinkAll => "unlink-all",
            NestedAction::Options => "options",
        }
    }

    /// Parse an action id, returns `None` for custom (extra pattern) actions
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|action| action.id() == id)
    }

    /// Whether the action changes link state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            NestedAction::Create
                | NestedAction::Link
                | NestedAction::Unlink
                | NestedAction::UnlinkAll
        )
    }
}

impl fmt::Display for NestedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip_through_from_id() {
        for action in NestedAction::ALL {
            assert_eq!(NestedAction::from_id(action.id()), Some(action));
        }
        assert_eq!(NestedAction::from_id("count"), None);
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&NestedAction::UnlinkAll).unwrap();
        assert_eq!(json, "\"unlink-all\"");

        let parsed: NestedAction = serde_yaml::from_str("unlink-all").unwrap();
        assert_eq!(parsed, NestedAction::UnlinkAll);
    }

    #[test]
    fn test_mutating_actions() {
        assert!(NestedAction::Link.is_mutating());
        assert!(NestedAction::UnlinkAll.is_mutating());
        assert!(!NestedAction::View.is_mutating());
        assert!(!NestedAction::Options.is_mutating());
    }
}
