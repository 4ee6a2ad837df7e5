//! Request context shared by the nested actions
//!
//! [`RouteContext`] is read back from the parameters the route factory
//! injected. [`RelationContext`] bundles it with the collaborators an action
//! needs and provides the two lookups every action starts with: the parent
//! instance and the currently related targets named in the URL.

use crate::core::action::NestedAction;
use crate::core::auth::AccessChecker;
use crate::core::error::{ConfigError, EntityError, NestedResult, ValidationError};
use crate::core::model::Model;
use crate::core::relation::RelationDescriptor;
use crate::core::service::RelationalStore;
use crate::links::registry::{LINK_ATTRIBUTE, RELATION_NAME, RELATIVE_CLASS};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

static ID_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("separator regex is valid"));

/// Parent type, relation and parent id of a routed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteContext {
    pub parent_type: String,
    pub relation_name: String,
    pub link_attribute: String,
    pub parent_id: String,
}

impl RouteContext {
    /// Read the context from route parameters
    ///
    /// A missing or empty parameter means the route was not produced by a
    /// nested route factory.
    pub fn from_params(params: &IndexMap<String, String>) -> Result<Self, ConfigError> {
        let required = |name: &str| {
            params
                .get(name)
                .filter(|value| !value.is_empty())
                .cloned()
                .ok_or_else(|| ConfigError::MissingRouteParam {
                    param: name.to_string(),
                })
        };

        let parent_type = required(RELATIVE_CLASS)?;
        let relation_name = required(RELATION_NAME)?;
        let link_attribute = required(LINK_ATTRIBUTE)?;
        let parent_id = required(&link_attribute)?;

        Ok(Self {
            parent_type,
            relation_name,
            link_attribute,
            parent_id,
        })
    }
}

/// Split a comma list of ids, dropping blanks and repeats
pub fn parse_ids(raw: &str) -> Result<Vec<String>, ValidationError> {
    let mut ids: Vec<String> = Vec::new();
    for id in ID_SEPARATOR.split(raw.trim()) {
        if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    if ids.is_empty() {
        return Err(ValidationError::EmptyIdList {
            raw: raw.to_string(),
        });
    }
    Ok(ids)
}

/// Everything an action needs to touch one relation
#[derive(Clone, Copy)]
pub struct RelationContext<'a> {
    pub store: &'a dyn RelationalStore,
    pub access: &'a dyn AccessChecker,
    pub action: NestedAction,
    pub route: &'a RouteContext,
    pub relation: &'a RelationDescriptor,
}

impl<'a> RelationContext<'a> {
    /// Run the access check for the current action
    pub fn authorize(&self, subject: Option<&Model>) -> NestedResult<()> {
        self.access.check_access(self.action, subject).map_err(|denied| {
            tracing::warn!(
                action = %self.action,
                subject = subject.map_or("-", |m| m.model_type.as_str()),
                reason = %denied,
                "Access denied"
            );
            denied.into()
        })
    }

    /// Load the parent named in the URL and check access on it
    pub async fn resolve_parent(&self) -> NestedResult<Model> {
        let parent = self
            .store
            .find_one(&self.route.parent_type, &self.route.parent_id)
            .await?
            .ok_or_else(|| EntityError::NotFound {
                entity_type: self.route.parent_type.clone(),
                id: self.route.parent_id.clone(),
            })?;
        self.authorize(Some(&parent))?;
        Ok(parent)
    }

    /// Load the related targets named by `ids_csv`
    ///
    /// Fails unless every id exists and is related to the parent.
    pub async fn resolve_current_targets(&self, ids_csv: &str) -> NestedResult<Vec<Model>> {
        let ids = parse_ids(ids_csv)?;
        let parent = self.resolve_parent().await?;
        let targets = self
            .store
            .find_related(&parent, self.relation, Some(ids.as_slice()))
            .await?;

        if targets.len() != ids.len() {
            return Err(EntityError::NotFoundOrUnrelated {
                entity_type: self.relation.target_type.clone(),
                ids,
            }
            .into());
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NestedError;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("2,3").unwrap(), vec!["2", "3"]);
        assert_eq!(parse_ids(" 2 , 3 ,2").unwrap(), vec!["2", "3"]);
        assert_eq!(parse_ids("4,,5,").unwrap(), vec!["4", "5"]);
        assert_eq!(parse_ids("7").unwrap(), vec!["7"]);
    }

    #[test]
    fn test_parse_ids_empty() {
        assert!(matches!(parse_ids(""), Err(ValidationError::EmptyIdList { .. })));
        assert!(matches!(parse_ids(" , "), Err(ValidationError::EmptyIdList { .. })));
    }

    #[test]
    fn test_route_context_from_params() {
        let ctx = RouteContext::from_params(&params(&[
            ("post_id", "1"),
            ("relativeClass", "Post"),
            ("relationName", "tags"),
            ("linkAttribute", "post_id"),
        ]))
        .unwrap();

        assert_eq!(ctx.parent_type, "Post");
        assert_eq!(ctx.relation_name, "tags");
        assert_eq!(ctx.parent_id, "1");
    }

    #[test]
    fn test_route_context_missing_param() {
        let err = RouteContext::from_params(&params(&[
            ("post_id", "1"),
            ("relativeClass", "Post"),
            ("linkAttribute", "post_id"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRouteParam { ref param } if param == "relationName"));

        let err = RouteContext::from_params(&params(&[
            ("relativeClass", "Post"),
            ("relationName", "tags"),
            ("linkAttribute", "post_id"),
        ]))
        .unwrap_err();
        let err: NestedError = err.into();
        assert_eq!(err.status_code().as_u16(), 500);
    }
}
