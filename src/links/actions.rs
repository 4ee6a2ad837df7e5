//! The seven nested collection actions
//!
//! Each action reads its [`RouteContext`], looks up the relation binding,
//! runs the access checks and delegates link state changes to the
//! [`LinkStateEngine`]. Results are returned as [`ActionOutcome`]s, which
//! know their HTTP rendering.

use crate::core::action::NestedAction;
use crate::core::auth::AccessChecker;
use crate::core::error::{ConfigError, NestedResult};
use crate::core::model::Model;
use crate::core::service::RelationalStore;
use crate::links::context::{RelationContext, RouteContext, parse_ids};
use crate::links::engine::{CreateResult, LinkResult, LinkStateEngine};
use crate::links::registry::RelationTable;
use crate::links::rule::IDS_PARAM;
use axum::Json;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Result of a nested action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Index: every related target
    Collection(Vec<Model>),
    /// View of a single id
    Item(Model),
    /// View of an id list
    Items(Vec<Model>),
    /// Create: the new target
    Created(Model),
    /// A model rejected by validation, carrying its field errors
    Invalid(Model),
    /// State changed, nothing to return
    NoContent,
    /// Nothing to change
    NotModified,
    /// Verbs served by the requested path
    Options(Vec<Method>),
    /// A verb the path does not serve, with the ones it does
    MethodNotAllowed(Vec<Method>),
}

fn allow_header(status: StatusCode, methods: &[Method]) -> Response {
    let allow = methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    match HeaderValue::from_str(&allow) {
        Ok(value) => (status, [(header::ALLOW, value)]).into_response(),
        Err(_) => status.into_response(),
    }
}

impl IntoResponse for ActionOutcome {
    fn into_response(self) -> Response {
        match self {
            ActionOutcome::Collection(items) => {
                let count = items.len();
                Json(json!({ "items": items, "count": count })).into_response()
            }
            ActionOutcome::Item(model) => Json(model).into_response(),
            ActionOutcome::Items(models) => Json(models).into_response(),
            ActionOutcome::Created(model) => (StatusCode::CREATED, Json(model)).into_response(),
            ActionOutcome::Invalid(model) => Json(model).into_response(),
            ActionOutcome::NoContent => StatusCode::NO_CONTENT.into_response(),
            ActionOutcome::NotModified => StatusCode::NOT_MODIFIED.into_response(),
            ActionOutcome::Options(methods) => allow_header(StatusCode::OK, &methods),
            ActionOutcome::MethodNotAllowed(methods) => {
                allow_header(StatusCode::METHOD_NOT_ALLOWED, &methods)
            }
        }
    }
}

impl From<LinkResult> for ActionOutcome {
    fn from(result: LinkResult) -> Self {
        match result {
            LinkResult::Unchanged => ActionOutcome::NotModified,
            LinkResult::Changed => ActionOutcome::NoContent,
            LinkResult::Rejected(model) => ActionOutcome::Invalid(model),
        }
    }
}

/// Action set shared by every nested route
#[derive(Clone)]
pub struct NestedCollectionActions {
    store: Arc<dyn RelationalStore>,
    access: Arc<dyn AccessChecker>,
    relations: Arc<RelationTable>,
}

impl NestedCollectionActions {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        access: Arc<dyn AccessChecker>,
        relations: Arc<RelationTable>,
    ) -> Self {
        Self {
            store,
            access,
            relations,
        }
    }

    pub fn relations(&self) -> &RelationTable {
        &self.relations
    }

    fn context<'a>(
        &'a self,
        action: NestedAction,
        route: &'a RouteContext,
    ) -> NestedResult<(RelationContext<'a>, Option<&'a str>)> {
        let binding = self
            .relations
            .binding(&route.parent_type, &route.relation_name)
            .ok_or_else(|| ConfigError::UnknownRelation {
                parent_type: route.parent_type.clone(),
                relation: route.relation_name.clone(),
            })?;

        let ctx = RelationContext {
            store: self.store.as_ref(),
            access: self.access.as_ref(),
            action,
            route,
            relation: &binding.descriptor,
        };
        Ok((ctx, binding.via_wrapper.as_deref()))
    }

    /// Run `action` with the routed parameters and request body
    ///
    /// `options` has no route-independent answer and is served by the
    /// transport through [`NestedCollectionActions::options`].
    pub async fn run(
        &self,
        action: NestedAction,
        params: &IndexMap<String, String>,
        body: &Map<String, Value>,
    ) -> NestedResult<ActionOutcome> {
        let route = RouteContext::from_params(params)?;
        let ids = || {
            params
                .get(IDS_PARAM)
                .map(String::as_str)
                .ok_or_else(|| ConfigError::MissingRouteParam {
                    param: IDS_PARAM.to_string(),
                })
        };

        match action {
            NestedAction::Index => self.index(&route).await,
            NestedAction::View => self.view(&route, ids()?).await,
            NestedAction::Create => self.create(&route, body).await,
            NestedAction::Link => self.link(&route, ids()?, body).await,
            NestedAction::Unlink => self.unlink(&route, ids()?).await,
            NestedAction::UnlinkAll => self.unlink_all(&route).await,
            NestedAction::Options => Ok(self.options(&Method::OPTIONS, vec![Method::OPTIONS])),
        }
    }

    /// List every target related to the parent
    pub async fn index(&self, route: &RouteContext) -> NestedResult<ActionOutcome> {
        let (ctx, _) = self.context(NestedAction::Index, route)?;
        ctx.authorize(None)?;
        let parent = ctx.resolve_parent().await?;
        let items = self.store.find_related(&parent, ctx.relation, None).await?;
        Ok(ActionOutcome::Collection(items))
    }

    /// Show the related targets named by `ids_csv`
    ///
    /// One id yields a single object, a list yields an array.
    pub async fn view(&self, route: &RouteContext, ids_csv: &str) -> NestedResult<ActionOutcome> {
        let (ctx, _) = self.context(NestedAction::View, route)?;
        let mut targets = ctx.resolve_current_targets(ids_csv).await?;
        for target in &targets {
            ctx.authorize(Some(target))?;
        }

        if targets.len() == 1 {
            if let Some(target) = targets.pop() {
                return Ok(ActionOutcome::Item(target));
            }
        }
        Ok(ActionOutcome::Items(targets))
    }

    /// Create a target from the body and relate it to the parent
    pub async fn create(
        &self,
        route: &RouteContext,
        body: &Map<String, Value>,
    ) -> NestedResult<ActionOutcome> {
        let (ctx, via_wrapper) = self.context(NestedAction::Create, route)?;
        ctx.authorize(None)?;
        let parent = ctx.resolve_parent().await?;

        match LinkStateEngine::new(ctx).create(&parent, body, via_wrapper).await? {
            CreateResult::Created(model) => Ok(ActionOutcome::Created(model)),
            CreateResult::Rejected(model) => Ok(ActionOutcome::Invalid(model)),
        }
    }

    /// Link existing targets, or update their junction rows
    pub async fn link(
        &self,
        route: &RouteContext,
        ids_csv: &str,
        body: &Map<String, Value>,
    ) -> NestedResult<ActionOutcome> {
        let (ctx, _) = self.context(NestedAction::Link, route)?;
        let ids = parse_ids(ids_csv)?;
        let parent = ctx.resolve_parent().await?;
        let result = LinkStateEngine::new(ctx).link(&parent, &ids, body).await?;
        Ok(result.into())
    }

    /// Sever the targets named by `ids_csv`
    pub async fn unlink(&self, route: &RouteContext, ids_csv: &str) -> NestedResult<ActionOutcome> {
        let (ctx, _) = self.context(NestedAction::Unlink, route)?;
        let ids = parse_ids(ids_csv)?;
        let parent = ctx.resolve_parent().await?;
        let result = LinkStateEngine::new(ctx).unlink(&parent, &ids).await?;
        Ok(result.into())
    }

    /// Sever every target of the parent
    pub async fn unlink_all(&self, route: &RouteContext) -> NestedResult<ActionOutcome> {
        let (ctx, _) = self.context(NestedAction::UnlinkAll, route)?;
        let parent = ctx.resolve_parent().await?;
        let result = LinkStateEngine::new(ctx).unlink_all(&parent).await?;
        Ok(result.into())
    }

    /// Answer a preflight with the verbs the path serves
    ///
    /// Any verb other than OPTIONS reaching an options route is refused
    /// with 405 and the same `Allow` list.
    pub fn options(&self, method: &Method, allowed: Vec<Method>) -> ActionOutcome {
        if *method == Method::OPTIONS {
            ActionOutcome::Options(allowed)
        } else {
            ActionOutcome::MethodNotAllowed(allowed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NestedConfig, RouteRuleConfig};
    use crate::core::auth::AllowAll;
    use crate::links::registry::NestedRouteFactory;
    use crate::storage::InMemoryStore;

    fn actions(config: &NestedConfig) -> (NestedCollectionActions, InMemoryStore) {
        let store = InMemoryStore::new(config);
        store.seed("Post", json!({ "title": "First" })).unwrap();
        store.seed("Comment", json!({ "text": "a", "post_id": 1 })).unwrap();
        store.seed("Comment", json!({ "text": "b", "post_id": 1 })).unwrap();
        store.seed("User", json!({ "name": "Ann" })).unwrap();

        let factory =
            NestedRouteFactory::build(&RouteRuleConfig::new("Post", &["comments", "authors"]), config)
                .unwrap();
        let relations = RelationTable::from_factories([&factory]);
        let actions = NestedCollectionActions::new(
            Arc::new(store.clone()),
            Arc::new(AllowAll),
            Arc::new(relations),
        );
        (actions, store)
    }

    fn params(relation: &str, ids: Option<&str>) -> IndexMap<String, String> {
        let mut params = IndexMap::new();
        params.insert("post_id".to_string(), "1".to_string());
        if let Some(ids) = ids {
            params.insert(IDS_PARAM.to_string(), ids.to_string());
        }
        params.insert("relativeClass".to_string(), "Post".to_string());
        params.insert("relationName".to_string(), relation.to_string());
        params.insert("linkAttribute".to_string(), "post_id".to_string());
        params
    }

    #[test]
    fn test_link_results_render_statuses() {
        let rendered = |result: LinkResult| ActionOutcome::from(result).into_response().status();

        assert_eq!(rendered(LinkResult::Unchanged), StatusCode::NOT_MODIFIED);
        assert_eq!(rendered(LinkResult::Changed), StatusCode::NO_CONTENT);
        assert_eq!(rendered(LinkResult::Rejected(Model::new("PostAuthor"))), StatusCode::OK);
    }

    #[test]
    fn test_options_answers_preflight_only() {
        let config = NestedConfig::default_config();
        let (actions, _) = actions(&config);
        let allowed = vec![Method::GET, Method::OPTIONS];

        let response = actions.options(&Method::OPTIONS, allowed.clone()).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ALLOW], "GET, OPTIONS");

        let response = actions.options(&Method::PATCH, allowed).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, OPTIONS");
    }

    #[tokio::test]
    async fn test_view_shape_follows_id_count() {
        let config = NestedConfig::default_config();
        let (actions, _) = actions(&config);

        let outcome = actions
            .run(NestedAction::View, &params("comments", Some("2")), &Map::new())
            .await
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Item(ref model) if model.id.as_deref() == Some("2")));

        let outcome = actions
            .run(NestedAction::View, &params("comments", Some("1,2")), &Map::new())
            .await
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Items(ref models) if models.len() == 2));
    }

    #[tokio::test]
    async fn test_rejected_join_row_renders_ok_with_errors() {
        let mut config = NestedConfig::default_config();
        if let Some(author) = config.models.iter_mut().find(|m| m.name == "PostAuthor") {
            author.required.push("role".to_string());
        }
        let (actions, store) = actions(&config);

        let outcome = actions
            .run(NestedAction::Link, &params("authors", Some("1")), &Map::new())
            .await
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Invalid(_)));
        assert_eq!(outcome.into_response().status(), StatusCode::OK);
        assert!(store.rows("PostAuthor").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_relation_is_a_config_error() {
        let config = NestedConfig::default_config();
        let (actions, _) = actions(&config);

        let err = actions
            .run(NestedAction::Index, &params("likes", None), &Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
