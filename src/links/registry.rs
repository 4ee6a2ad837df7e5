//! Route factory for nested relation resources
//!
//! A [`NestedRouteFactory`] is built from one [`RouteRuleConfig`]: for every
//! listed relation it resolves the relation metadata, derives the URL name
//! and controller id, and compiles the rule set under
//! `{resource_name}/<{link_attribute}:\d+>`. Parsing a request injects the
//! routing context (`relativeClass`, `relationName`, `linkAttribute`) the
//! actions need; creating a URL strips it again.

use crate::config::RouteRuleConfig;
use crate::core::error::ConfigError;
use crate::core::relation::{RelationCatalog, RelationDescriptor};
use crate::links::rule::{RelationRuleSet, pattern_table};
use axum::http::Method;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Route parameter naming the parent model type
pub const RELATIVE_CLASS: &str = "relativeClass";
/// Route parameter naming the relation
pub const RELATION_NAME: &str = "relationName";
/// Route parameter naming the parent id placeholder
pub const LINK_ATTRIBUTE: &str = "linkAttribute";

/// Parameters the factory injects and strips
pub const CONTEXT_PARAMS: [&str; 3] = [RELATIVE_CLASS, RELATION_NAME, LINK_ATTRIBUTE];

/// Result of routing a request
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRoute {
    /// `{controller route}/{action id}`
    pub route: String,
    pub params: IndexMap<String, String>,
}

impl ParsedRoute {
    pub fn action_id(&self) -> &str {
        self.route.rsplit('/').next().unwrap_or(&self.route)
    }

    /// Route without the action segment
    pub fn controller_route(&self) -> &str {
        self.route
            .rsplit_once('/')
            .map_or(self.route.as_str(), |(controller, _)| controller)
    }
}

/// Relation metadata plus the per-rule action settings
#[derive(Debug, Clone)]
pub struct RelationBinding {
    pub descriptor: RelationDescriptor,
    /// Body key holding the junction payload on create
    pub via_wrapper: Option<String>,
}

/// One relation exposed by a factory
#[derive(Debug, Clone)]
pub struct RelationRoute {
    pub binding: RelationBinding,
    pub rules: RelationRuleSet,
}

/// Routing for every exposed relation of one parent model
#[derive(Debug, Clone)]
pub struct NestedRouteFactory {
    parent_type: String,
    resource_name: String,
    link_attribute: String,
    relations: IndexMap<String, RelationRoute>,
}

impl NestedRouteFactory {
    /// Build the factory, resolving every relation up front
    ///
    /// Fails when a relation is unknown or malformed, or when two relations
    /// would share a URL name.
    pub fn build(rule: &RouteRuleConfig, catalog: &dyn RelationCatalog) -> Result<Self, ConfigError> {
        let resource_name = rule.resource_name();
        let link_attribute = rule.link_attribute();
        let prefix = format!(r"{}/<{}:\d+>", resource_name, link_attribute);
        let table = pattern_table(&rule.extra_patterns, &rule.only, &rule.except);

        let mut relations = IndexMap::new();
        let mut url_names = HashSet::new();

        for relation in &rule.relations {
            let name = relation.relation_name();
            let descriptor =
                catalog
                    .relation(&rule.model, name)
                    .ok_or_else(|| ConfigError::UnknownRelation {
                        parent_type: rule.model.clone(),
                        relation: name.to_string(),
                    })?;
            descriptor
                .validate()
                .map_err(|message| ConfigError::InvalidRelation { message })?;

            let url_name = relation.url_name();
            if !url_names.insert(url_name.clone()) || relations.contains_key(name) {
                return Err(ConfigError::DuplicateRoute {
                    prefix: format!("{}/{}", resource_name, url_name),
                });
            }

            let controller_route = match &rule.module_prefix {
                Some(module) => format!("{}/{}", module.trim_matches('/'), relation.controller()),
                None => relation.controller(),
            };

            let rules = RelationRuleSet::build(&prefix, &url_name, &controller_route, &table)?;
            relations.insert(
                name.to_string(),
                RelationRoute {
                    binding: RelationBinding {
                        descriptor,
                        via_wrapper: rule.via_wrapper.clone(),
                    },
                    rules,
                },
            );
        }

        tracing::info!(
            parent = %rule.model,
            resource = %resource_name,
            relations = relations.len(),
            "Registered nested routes"
        );

        Ok(Self {
            parent_type: rule.model.clone(),
            resource_name,
            link_attribute,
            relations,
        })
    }

    pub fn parent_type(&self) -> &str {
        &self.parent_type
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn link_attribute(&self) -> &str {
        &self.link_attribute
    }

    pub fn relation(&self, name: &str) -> Option<&RelationRoute> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationRoute> {
        self.relations.values()
    }

    /// `{resource_name}/{url_name}` for every exposed relation
    pub fn prefixes(&self) -> Vec<String> {
        self.relations
            .values()
            .map(|r| format!("{}/{}", self.resource_name, r.rules.url_name()))
            .collect()
    }

    /// Route a request path (no leading slash)
    ///
    /// Relations are tried in declaration order, the first match wins.
    pub fn parse_request(&self, method: &Method, path: &str) -> Option<ParsedRoute> {
        let path = path.trim_matches('/');
        if !path.starts_with(&self.resource_name) {
            return None;
        }

        self.relations.iter().find_map(|(name, relation)| {
            let (rule, mut params) = relation.rules.parse(method, path)?;
            params.insert(RELATIVE_CLASS.to_string(), self.parent_type.clone());
            params.insert(RELATION_NAME.to_string(), name.clone());
            params.insert(LINK_ATTRIBUTE.to_string(), self.link_attribute.clone());

            tracing::debug!(route = %rule.route, %path, "Matched nested route");
            Some(ParsedRoute {
                route: rule.route.clone(),
                params,
            })
        })
    }

    /// Build a URL (no leading slash) for `route`
    ///
    /// A `relationName` parameter pins the relation whose rules are used.
    /// Without it, relations are tried in order. Context parameters never
    /// reach the URL.
    pub fn create_url(&self, route: &str, params: &IndexMap<String, String>) -> Option<String> {
        let pinned = params.get(RELATION_NAME).and_then(|name| self.relations.get(name));
        let params: IndexMap<String, String> = params
            .iter()
            .filter(|(key, _)| !CONTEXT_PARAMS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match pinned {
            Some(relation) => relation.rules.create_url(route, &params),
            None => self
                .relations
                .values()
                .find_map(|relation| relation.rules.create_url(route, &params)),
        }
    }

    /// Methods served at `path` for `relation`
    pub fn allowed_methods(&self, relation: &str, path: &str) -> Vec<Method> {
        self.relations
            .get(relation)
            .map(|r| r.rules.allowed_methods(path.trim_matches('/')))
            .unwrap_or_else(|| vec![Method::OPTIONS])
    }
}

/// Immutable `(parent type, relation) -> binding` map shared by the actions
#[derive(Debug, Clone, Default)]
pub struct RelationTable {
    bindings: HashMap<(String, String), RelationBinding>,
}

impl RelationTable {
    pub fn from_factories<'a>(factories: impl IntoIterator<Item = &'a NestedRouteFactory>) -> Self {
        let mut bindings = HashMap::new();
        for factory in factories {
            for (name, route) in &factory.relations {
                bindings
                    .entry((factory.parent_type.clone(), name.clone()))
                    .or_insert_with(|| route.binding.clone());
            }
        }
        Self { bindings }
    }

    pub fn binding(&self, parent_type: &str, relation: &str) -> Option<&RelationBinding> {
        self.bindings
            .get(&(parent_type.to_string(), relation.to_string()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl RelationCatalog for RelationTable {
    fn relation(&self, parent_type: &str, name: &str) -> Option<RelationDescriptor> {
        self.binding(parent_type, name).map(|b| b.descriptor.clone())
    }
}
