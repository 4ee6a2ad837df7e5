//! Nested relation routes
//!
//! URL patterns and rule sets, the route factory, the request context, the
//! link state engine and the actions, plus the HTTP dispatch that ties them
//! together.

pub mod actions;
pub mod context;
pub mod engine;
pub mod handlers;
pub mod pattern;
pub mod registry;
pub mod rule;

pub use actions::{ActionOutcome, NestedCollectionActions};
pub use context::{RelationContext, RouteContext, parse_ids};
pub use engine::{CreateResult, LinkPlan, LinkResult, LinkStateEngine};
pub use handlers::{AppState, dispatch_nested};
pub use pattern::UrlPattern;
pub use registry::{NestedRouteFactory, ParsedRoute, RelationBinding, RelationTable};
pub use rule::RelationRuleSet;
