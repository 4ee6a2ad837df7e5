//! Authorization hook for nested actions
//!
//! Actions call an [`AccessChecker`] with the operation id and, when one is
//! at hand, the instance being touched (parent, target or join row). A
//! rejection surfaces as `403`, never as a missing resource.

use crate::core::action::NestedAction;
use crate::core::model::Model;
use std::collections::HashMap;
use std::fmt;

/// Raised by an access checker to reject an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub reason: String,
}

impl AccessDenied {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for AccessDenied {}

/// Predicate consulted before an action touches an instance
pub trait AccessChecker: Send + Sync {
    fn check_access(&self, action: NestedAction, subject: Option<&Model>)
    -> Result<(), AccessDenied>;
}

impl<F> AccessChecker for F
where
    F: Fn(NestedAction, Option<&Model>) -> Result<(), AccessDenied> + Send + Sync,
{
    fn check_access(
        &self,
        action: NestedAction,
        subject: Option<&Model>,
    ) -> Result<(), AccessDenied> {
        self(action, subject)
    }
}

/// Checker that lets everything through
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessChecker for AllowAll {
    fn check_access(&self, _: NestedAction, _: Option<&Model>) -> Result<(), AccessDenied> {
        Ok(())
    }
}

/// Authorization policy for one action
#[derive(Debug, Clone)]
pub enum AccessPolicy {
    /// Always allowed
    Public,

    /// Always rejected
    Deny,

    /// Allowed only for subjects of these model types
    ///
    /// Calls without a subject (the pre-parent check of `index`/`create`)
    /// are allowed.
    SubjectTypes(Vec<String>),

    /// Custom policy function
    Custom(fn(NestedAction, Option<&Model>) -> bool),
}

impl AccessPolicy {
    pub fn check(&self, action: NestedAction, subject: Option<&Model>) -> bool {
        match self {
            AccessPolicy::Public => true,
            AccessPolicy::Deny => false,
            AccessPolicy::SubjectTypes(types) => {
                subject.is_none_or(|model| types.iter().any(|t| t == &model.model_type))
            }
            AccessPolicy::Custom(f) => f(action, subject),
        }
    }

    /// Parse a policy from its config string
    ///
    /// `public`, `deny`, `types:Post,Comment`. Unknown strings deny.
    pub fn parse_policy(s: &str) -> Self {
        match s {
            "public" | "allow" => AccessPolicy::Public,
            "deny" => AccessPolicy::Deny,
            s if s.starts_with("types:") => {
                let types = s["types:".len()..]
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                AccessPolicy::SubjectTypes(types)
            }
            _ => AccessPolicy::Deny,
        }
    }
}

/// Per-action policies, actions without an entry are public
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<NestedAction, AccessPolicy>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, action: NestedAction, policy: AccessPolicy) -> Self {
        self.policies.insert(action, policy);
        self
    }

    /// Build from `action id -> policy string` pairs
    pub fn from_config<'a>(entries: impl IntoIterator<Item = (&'a NestedAction, &'a String)>) -> Self {
        let policies = entries
            .into_iter()
            .map(|(action, policy)| (*action, AccessPolicy::parse_policy(policy)))
            .collect();
        Self { policies }
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl AccessChecker for PolicyTable {
    fn check_access(
        &self,
        action: NestedAction,
        subject: Option<&Model>,
    ) -> Result<(), AccessDenied> {
        match self.policies.get(&action) {
            Some(policy) if !policy.check(action, subject) => {
                let target = subject
                    .map(|m| m.model_type.as_str())
                    .unwrap_or("this resource");
                Err(AccessDenied::new(format!(
                    "action '{}' is not allowed on {}",
                    action, target
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy() {
        assert!(matches!(AccessPolicy::parse_policy("public"), AccessPolicy::Public));
        assert!(matches!(AccessPolicy::parse_policy("deny"), AccessPolicy::Deny));
        assert!(matches!(AccessPolicy::parse_policy("whatever"), AccessPolicy::Deny));

        match AccessPolicy::parse_policy("types:Post, Tag") {
            AccessPolicy::SubjectTypes(types) => assert_eq!(types, vec!["Post", "Tag"]),
            _ => panic!("Expected SubjectTypes"),
        }
    }

    #[test]
    fn test_subject_types_policy() {
        let policy = AccessPolicy::SubjectTypes(vec!["Post".to_string()]);
        let post = Model::new("Post");
        let tag = Model::new("Tag");

        assert!(policy.check(NestedAction::Link, Some(&post)));
        assert!(!policy.check(NestedAction::Link, Some(&tag)));
        assert!(policy.check(NestedAction::Link, None));
    }

    #[test]
    fn test_policy_table_denies_configured_action_only() {
        let table = PolicyTable::new().with_policy(NestedAction::UnlinkAll, AccessPolicy::Deny);

        assert!(table.check_access(NestedAction::Index, None).is_ok());
        let err = table
            .check_access(NestedAction::UnlinkAll, Some(&Model::new("Post")))
            .unwrap_err();
        assert!(err.reason.contains("unlink-all"));
        assert!(err.reason.contains("Post"));
    }

    #[test]
    fn test_closures_are_checkers() {
        let checker = |action: NestedAction, _: Option<&Model>| {
            if action == NestedAction::Unlink {
                Err(AccessDenied::new("no unlinking"))
            } else {
                Ok(())
            }
        };
        assert!(checker.check_access(NestedAction::Link, None).is_ok());
        assert!(checker.check_access(NestedAction::Unlink, None).is_err());
    }

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.check_access(NestedAction::UnlinkAll, None).is_ok());
    }
}
