//! # Nested REST
//!
//! Nested REST resources for the relations of a parent model.
//!
//! A route rule such as `Post: [comments, tags]` exposes every relation as
//! a collection under its parent (`/posts/{post_id}/comments`) with seven
//! actions: list, view, create a related instance, link existing ones,
//! unlink, unlink all, and options.
//!
//! ## Features
//!
//! - **Route factory**: one rule set per relation, derived names with overrides
//! - **Relation shapes**: direct foreign keys, join tables, join entities
//! - **Idempotent linking**: `304` when nothing would change
//! - **Junction payloads**: extra columns on link, junction updates for join entities
//! - **Access checks**: per action, on parent, targets and junction rows
//! - **Configuration-Based**: models, relations and routes declared in YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nested_rest::prelude::*;
//!
//! let config = NestedConfig::default_config();
//! let app = ServerBuilder::new()
//!     .with_store(InMemoryStore::new(&config))
//!     .with_config(config)
//!     .build()?;
//!
//! // PUT /posts/1/tags/2,3     -> 204
//! // PUT /posts/1/tags/2,3     -> 304
//! // GET /posts/1/comments     -> { "items": [...], "count": n }
//! ```

pub mod config;
pub mod core;
pub mod links;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        action::NestedAction,
        auth::{AccessChecker, AccessDenied, AccessPolicy, AllowAll, PolicyTable},
        error::{
            ConfigError, EntityError, LinkError, NestedError, NestedResult, RequestError,
            StorageError, ValidationError,
        },
        inflector::Inflector,
        model::{Model, SaveOutcome},
        relation::{JoinShape, Multiplicity, RelationCatalog, RelationDescriptor},
        service::{RelationalStore, StoreError},
    };

    // === Configuration ===
    pub use crate::config::{
        ModelConfig, NestedConfig, RelationConfig, RelationRouteConfig, RouteRuleConfig,
    };

    // === Nested Routes ===
    pub use crate::links::{
        ActionOutcome, AppState, LinkResult, LinkStateEngine, NestedCollectionActions,
        NestedRouteFactory, ParsedRoute, RouteContext, dispatch_nested,
    };

    // === Server ===
    pub use crate::server::{NestedHost, ServerBuilder};

    // === Storage ===
    #[cfg(feature = "in-memory")]
    pub use crate::storage::InMemoryStore;

    // === Re-exports from external crates ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
