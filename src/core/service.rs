//! Persistence collaborator used by the nested actions
//!
//! The crate does not own a query builder or a persistence engine. Whatever
//! backs the models implements [`RelationalStore`]; the link engine only asks
//! it existence questions and hands it link operations.

use crate::core::model::{Model, SaveOutcome};
use crate::core::relation::RelationDescriptor;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Failures reported by a store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("unique constraint violated: {message}")]
    Conflict { message: String },

    /// The store has no such model type or join table
    #[error("unknown model type '{0}'")]
    UnknownModel(String),

    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}

/// Persistence operations the nested actions rely on
///
/// Implementations provide find/exists lookups, the relation-scoped query
/// and link/unlink operations for every relation shape. All methods are
/// expected to run inside the request that calls them; no call is retried.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Find a model by primary key
    async fn find_one(&self, model_type: &str, id: &str) -> Result<Option<Model>, StoreError>;

    /// Whether a model with that primary key exists (global collection)
    async fn exists(&self, model_type: &str, id: &str) -> Result<bool, StoreError>;

    /// Query the relation scoped to `parent`
    ///
    /// With `ids`, only targets whose primary key is in the list are
    /// returned. Results are ordered by primary key.
    async fn find_related(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        ids: Option<&[String]>,
    ) -> Result<Vec<Model>, StoreError>;

    /// Whether target `id` is currently related to `parent`
    async fn is_related(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        id: &str,
    ) -> Result<bool, StoreError>;

    /// Find one row of a join entity by attribute equality
    async fn find_junction(
        &self,
        entity_type: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Model>, StoreError>;

    /// Validate then persist a model (insert when it has no id, update otherwise)
    async fn save(&self, model: Model) -> Result<SaveOutcome, StoreError>;

    /// Relate `target` to `parent`
    ///
    /// For join tables, `extra_columns` are stored on the new join row.
    async fn link(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        target: &Model,
        extra_columns: &Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Sever one relation: delete the join row when `delete`, otherwise
    /// null the target's foreign key
    async fn unlink(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        target: &Model,
        delete: bool,
    ) -> Result<(), StoreError>;

    /// Sever every relation of `parent`
    async fn unlink_all(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        delete: bool,
    ) -> Result<(), StoreError>;

    /// Attributes of `model_type` that may be mass-assigned
    fn safe_attributes(&self, model_type: &str) -> Vec<String>;
}
