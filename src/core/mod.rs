//! Core module containing the fundamental types and traits of nested routes

pub mod action;
pub mod auth;
pub mod error;
pub mod inflector;
pub mod model;
pub mod relation;
pub mod service;

pub use action::NestedAction;
pub use auth::{AccessChecker, AccessDenied, AccessPolicy, AllowAll, PolicyTable};
pub use error::{NestedError, NestedResult};
pub use inflector::Inflector;
pub use model::{Model, SaveOutcome};
pub use relation::{JoinShape, Multiplicity, RelationCatalog, RelationDescriptor};
pub use service::{RelationalStore, StoreError};
