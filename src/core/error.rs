//! Typed error handling for nested routes
//!
//! Every failure a nested action can produce is resolved into one of the
//! categories below before it reaches the transport, so the HTTP layer only
//! has to ask for a status code and an error body.
//!
//! # Error Categories
//!
//! - [`ConfigError`]: route or relation wiring is wrong (fatal, 500)
//! - [`EntityError`]: parent or target lookups that found nothing (404)
//! - [`LinkError`]: link/unlink requests that conflict with current link state
//! - [`ValidationError`]: malformed request input (400)
//! - [`StorageError`]: persistence failures without validation errors (500)
//! - [`RequestError`]: authorization and routing misses
//!
//! A model rejected by validation is *not* an error: actions return it as a
//! regular outcome carrying its field errors.
//!
//! # Example
//!
//! ```rust,ignore
//! match actions.view(&context, "5,6").await {
//!     Ok(outcome) => outcome.into_response(),
//!     Err(NestedError::Entity(EntityError::NotFoundOrUnrelated { .. })) => {
//!         // one of the ids is missing or belongs to another parent
//!     }
//!     Err(e) => e.into_response(),
//! }
//! ```

use crate::core::auth::AccessDenied;
use crate::core::service::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The main error type for nested actions and route building
#[derive(Debug)]
pub enum NestedError {
    /// Route context or relation wiring errors
    Config(ConfigError),

    /// Missing parent, target or unrelated target
    Entity(EntityError),

    /// Link state conflicts
    Link(LinkError),

    /// Malformed input
    Validation(ValidationError),

    /// Persistence failures
    Storage(StorageError),

    /// Authorization and routing errors
    Request(RequestError),
}

impl fmt::Display for NestedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NestedError::Config(e) => write!(f, "{}", e),
            NestedError::Entity(e) => write!(f, "{}", e),
            NestedError::Link(e) => write!(f, "{}", e),
            NestedError::Validation(e) => write!(f, "{}", e),
            NestedError::Storage(e) => write!(f, "{}", e),
            NestedError::Request(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for NestedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NestedError::Config(e) => Some(e),
            NestedError::Entity(e) => Some(e),
            NestedError::Link(e) => Some(e),
            NestedError::Validation(e) => Some(e),
            NestedError::Storage(e) => Some(e),
            NestedError::Request(e) => Some(e),
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl NestedError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            NestedError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NestedError::Entity(_) => StatusCode::NOT_FOUND,
            NestedError::Link(e) => e.status_code(),
            NestedError::Validation(_) => StatusCode::BAD_REQUEST,
            NestedError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NestedError::Request(e) => e.status_code(),
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            NestedError::Config(_) => "CONFIG_ERROR",
            NestedError::Entity(e) => e.error_code(),
            NestedError::Link(e) => e.error_code(),
            NestedError::Validation(_) => "VALIDATION_ERROR",
            NestedError::Storage(_) => "STORAGE_ERROR",
            NestedError::Request(e) => e.error_code(),
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            NestedError::Entity(EntityError::NotFound { entity_type, id }) => {
                Some(serde_json::json!({ "entity_type": entity_type, "id": id }))
            }
            NestedError::Entity(EntityError::NotFoundOrUnrelated { entity_type, ids }) => {
                Some(serde_json::json!({ "entity_type": entity_type, "ids": ids }))
            }
            NestedError::Link(LinkError::NotLinked { target_id, .. }) => {
                Some(serde_json::json!({ "id": target_id }))
            }
            _ => None,
        }
    }

    /// Shorthand for server-side failures that must be logged
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for NestedError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to route and relation configuration
#[derive(Debug)]
pub enum ConfigError {
    /// A route parameter the actions rely on was not injected
    MissingRouteParam { param: String },

    /// Missing required field in configuration
    MissingField { field: String, context: String },

    /// Model type is not declared
    UnknownModel { model: String },

    /// Relation is not declared on the parent model
    UnknownRelation { parent_type: String, relation: String },

    /// Relation declaration breaks an invariant
    InvalidRelation { message: String },

    /// Two relations would answer the same URL prefix
    DuplicateRoute { prefix: String },

    /// A URL pattern could not be compiled
    InvalidPattern { pattern: String, message: String },

    /// Failed to parse configuration
    ParseError { file: Option<String>, message: String },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRouteParam { param } => {
                write!(f, "Unexpected configuration: route parameter '{}' is missing", param)
            }
            ConfigError::MissingField { field, context } => {
                write!(f, "Missing required field '{}' in {}", field, context)
            }
            ConfigError::UnknownModel { model } => write!(f, "Unknown model type: {}", model),
            ConfigError::UnknownRelation {
                parent_type,
                relation,
            } => write!(f, "Model '{}' has no relation named '{}'", parent_type, relation),
            ConfigError::InvalidRelation { message } => write!(f, "Invalid relation: {}", message),
            ConfigError::DuplicateRoute { prefix } => {
                write!(f, "More than one relation is routed under '{}'", prefix)
            }
            ConfigError::InvalidPattern { pattern, message } => {
                write!(f, "Invalid URL pattern '{}': {}", pattern, message)
            }
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::IoError { message } => write!(f, "IO error: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for NestedError {
    fn from(err: ConfigError) -> Self {
        NestedError::Config(err)
    }
}

// =============================================================================
// Entity Errors
// =============================================================================

/// Lookups that found nothing
#[derive(Debug)]
pub enum EntityError {
    /// A single instance is missing
    NotFound { entity_type: String, id: String },

    /// Some of the requested ids do not exist or are not related to the parent
    NotFoundOrUnrelated {
        entity_type: String,
        ids: Vec<String>,
    },
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::NotFound { entity_type, id } => {
                write!(f, "{} '{}' not found.", entity_type, id)
            }
            EntityError::NotFoundOrUnrelated { .. } => write!(f, "Not found or unrelated objects."),
        }
    }
}

impl std::error::Error for EntityError {}

impl EntityError {
    pub fn error_code(&self) -> &'static str {
        match self {
            EntityError::NotFound { .. } => "ENTITY_NOT_FOUND",
            EntityError::NotFoundOrUnrelated { .. } => "ENTITY_NOT_FOUND_OR_UNRELATED",
        }
    }
}

impl From<EntityError> for NestedError {
    fn from(err: EntityError) -> Self {
        NestedError::Entity(err)
    }
}

// =============================================================================
// Link Errors
// =============================================================================

/// Link/unlink requests that conflict with the current link state
#[derive(Debug)]
pub enum LinkError {
    /// Unlink of a target that is not linked to the parent
    NotLinked {
        target_type: String,
        target_id: String,
        parent_type: String,
        parent_id: String,
    },

    /// Every target is linked already and the request carries junction
    /// data, but the relation has no join entity to update
    JunctionUpdateUnsupported { relation: String },

    /// A target is related but its join entity row cannot be loaded
    JunctionMissing { entity_type: String, target_id: String },

    /// The store refused a duplicate link
    Conflict { message: String },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::NotLinked {
                target_type,
                target_id,
                parent_type,
                parent_id,
            } => write!(
                f,
                "{} '{}' not linked to {} '{}'.",
                target_type, target_id, parent_type, parent_id
            ),
            LinkError::JunctionUpdateUnsupported { relation } => write!(
                f,
                "Objects already linked through '{}': extra columns of a plain join table cannot be updated",
                relation
            ),
            LinkError::JunctionMissing {
                entity_type,
                target_id,
            } => write!(f, "{} row for '{}' could not be loaded", entity_type, target_id),
            LinkError::Conflict { message } => write!(f, "Link conflict: {}", message),
        }
    }
}

impl std::error::Error for LinkError {}

impl LinkError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LinkError::NotLinked { .. } => StatusCode::BAD_REQUEST,
            LinkError::JunctionUpdateUnsupported { .. } => StatusCode::BAD_REQUEST,
            LinkError::JunctionMissing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            LinkError::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            LinkError::NotLinked { .. } => "NOT_LINKED",
            LinkError::JunctionUpdateUnsupported { .. } => "ALREADY_LINKED",
            LinkError::JunctionMissing { .. } => "JUNCTION_MISSING",
            LinkError::Conflict { .. } => "LINK_CONFLICT",
        }
    }
}

impl From<LinkError> for NestedError {
    fn from(err: LinkError) -> Self {
        NestedError::Link(err)
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Malformed request input
#[derive(Debug)]
pub enum ValidationError {
    /// Invalid JSON format
    InvalidJson { message: String },

    /// The body is valid JSON but not an object
    InvalidBody { message: String },

    /// The id list holds no id once split
    EmptyIdList { raw: String },
}

/// A field error carried by a rejected model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidJson { message } => write!(f, "Invalid JSON: {}", message),
            ValidationError::InvalidBody { message } => {
                write!(f, "Invalid request body: {}", message)
            }
            ValidationError::EmptyIdList { raw } => write!(f, "No id given in '{}'", raw),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for NestedError {
    fn from(err: ValidationError) -> Self {
        NestedError::Validation(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Persistence failures that carry no validation errors
#[derive(Debug)]
pub enum StorageError {
    /// Save returned false without field errors
    SaveFailed { model_type: String },

    /// Any other backend failure
    Backend { message: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::SaveFailed { model_type } => write!(
                f,
                "Failed to update the {} object for unknown reason.",
                model_type
            ),
            StorageError::Backend { message } => write!(f, "Storage error: {}", message),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for NestedError {
    fn from(err: StorageError) -> Self {
        NestedError::Storage(err)
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Authorization and routing errors
#[derive(Debug)]
pub enum RequestError {
    /// The access checker rejected the action
    Forbidden { message: String },

    /// No nested rule matches the request
    RouteNotFound { method: String, path: String },

    /// A rule matched but its action id is not implemented
    ActionNotFound { route: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Forbidden { message } => write!(f, "Forbidden: {}", message),
            RequestError::RouteNotFound { method, path } => {
                write!(f, "No route matches {} /{}", method, path)
            }
            RequestError::ActionNotFound { route } => {
                write!(f, "Unable to resolve the request \"{}\".", route)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
            RequestError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            RequestError::ActionNotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::Forbidden { .. } => "FORBIDDEN",
            RequestError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            RequestError::ActionNotFound { .. } => "ACTION_NOT_FOUND",
        }
    }
}

impl From<RequestError> for NestedError {
    fn from(err: RequestError) -> Self {
        NestedError::Request(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<AccessDenied> for NestedError {
    fn from(err: AccessDenied) -> Self {
        NestedError::Request(RequestError::Forbidden {
            message: err.to_string(),
        })
    }
}

impl From<StoreError> for NestedError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { message } => NestedError::Link(LinkError::Conflict { message }),
            other => NestedError::Storage(StorageError::Backend {
                message: other.to_string(),
            }),
        }
    }
}

impl From<serde_json::Error> for NestedError {
    fn from(err: serde_json::Error) -> Self {
        NestedError::Validation(ValidationError::InvalidJson {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for NestedError {
    fn from(err: serde_yaml::Error) -> Self {
        NestedError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for NestedError {
    fn from(err: std::io::Error) -> Self {
        NestedError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

/// A specialized Result type for nested actions
pub type NestedResult<T> = Result<T, NestedError>;
