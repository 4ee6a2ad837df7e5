//! Server host holding the resolved nested routing state
//!
//! The host is built once from the merged configuration, a store and an
//! access checker. It owns the route factories (one per route rule, in
//! configuration order) and the action set, and is the single source of
//! truth the HTTP exposure reads from.

use crate::config::NestedConfig;
use crate::core::auth::AccessChecker;
use crate::core::error::ConfigError;
use crate::core::service::RelationalStore;
use crate::links::actions::NestedCollectionActions;
use crate::links::handlers::AppState;
use crate::links::registry::{NestedRouteFactory, RelationTable};
use anyhow::Result;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Host context containing all nested routing state
pub struct NestedHost {
    /// Merged configuration
    pub config: Arc<NestedConfig>,

    /// One factory per route rule, tried in order
    pub factories: Arc<Vec<NestedRouteFactory>>,

    pub actions: Arc<NestedCollectionActions>,
}

impl NestedHost {
    /// Build the host, resolving every route rule up front
    ///
    /// Fails on the first invalid rule, or when two rules expose relations
    /// under the same URL prefix.
    pub fn from_builder_components(
        config: NestedConfig,
        store: Arc<dyn RelationalStore>,
        access: Arc<dyn AccessChecker>,
    ) -> Result<Self> {
        config.validate()?;

        let factories = config
            .routes
            .iter()
            .map(|rule| NestedRouteFactory::build(rule, &config))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut prefixes = HashSet::new();
        for prefix in factories.iter().flat_map(NestedRouteFactory::prefixes) {
            if !prefixes.insert(prefix.clone()) {
                return Err(ConfigError::DuplicateRoute { prefix }.into());
            }
        }

        let relations = Arc::new(RelationTable::from_factories(&factories));
        let actions = NestedCollectionActions::new(store, access, relations);

        Ok(Self {
            config: Arc::new(config),
            factories: Arc::new(factories),
            actions: Arc::new(actions),
        })
    }

    /// State handed to the nested dispatch handler
    pub fn app_state(&self) -> AppState {
        AppState {
            factories: self.factories.clone(),
            actions: self.actions.clone(),
        }
    }

    /// Build a URL (with leading slash) for `route`, trying every factory
    pub fn create_url(&self, route: &str, params: &IndexMap<String, String>) -> Option<String> {
        self.factories
            .iter()
            .find_map(|factory| factory.create_url(route, params))
            .map(|url| format!("/{}", url))
    }

    /// Parent model types with nested routes
    pub fn parent_types(&self) -> Vec<&str> {
        self.factories.iter().map(NestedRouteFactory::parent_type).collect()
    }
}
