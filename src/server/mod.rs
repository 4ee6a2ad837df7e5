//! Server module for exposing nested relation routes over HTTP
//!
//! [`ServerBuilder`] merges configurations, resolves every route rule into a
//! [`NestedHost`] and builds the axum router serving it.

pub mod builder;
pub mod host;
pub mod router;

pub use builder::ServerBuilder;
pub use host::NestedHost;
pub use router::build_router;
