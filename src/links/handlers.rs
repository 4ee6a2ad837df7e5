//! HTTP dispatch for nested routes
//!
//! Nested URLs are matched by the route factories rather than by axum's
//! router, so a single fallback handler serves every nested path: it routes
//! the request, decodes the body, runs the action and renders the outcome
//! or the error.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::core::action::NestedAction;
use crate::core::error::{NestedError, NestedResult, RequestError, ValidationError};
use crate::links::actions::{ActionOutcome, NestedCollectionActions};
use crate::links::registry::{NestedRouteFactory, ParsedRoute, RELATION_NAME};
use crate::links::rule::IDS_PARAM;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub factories: Arc<Vec<NestedRouteFactory>>,
    pub actions: Arc<NestedCollectionActions>,
}

impl AppState {
    /// First factory that routes the request
    pub fn route(&self, method: &Method, path: &str) -> Option<(&NestedRouteFactory, ParsedRoute)> {
        self.factories
            .iter()
            .find_map(|factory| factory.parse_request(method, path).map(|parsed| (factory, parsed)))
    }
}

/// Fallback handler for every nested route
pub async fn dispatch_nested(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri.path().trim_matches('/');

    match dispatch(&state, &method, path, &body).await {
        Ok(response) => response,
        Err(err) => {
            if err.is_server_error() {
                tracing::error!(%method, %path, error = %err, "Nested action failed");
            } else if err.status_code() == StatusCode::CONFLICT {
                tracing::warn!(%method, %path, error = %err, "Nested action conflicted");
            } else {
                tracing::debug!(%method, %path, error = %err, "Nested action rejected");
            }
            err.into_response()
        }
    }
}

async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    body: &[u8],
) -> NestedResult<Response> {
    let (factory, parsed) =
        state
            .route(method, path)
            .ok_or_else(|| RequestError::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            })?;

    let action = NestedAction::from_id(parsed.action_id()).ok_or_else(|| {
        RequestError::ActionNotFound {
            route: parsed.route.clone(),
        }
    })?;

    if action == NestedAction::Options {
        let relation = parsed
            .params
            .get(RELATION_NAME)
            .map(String::as_str)
            .unwrap_or_default();
        let allowed = factory.allowed_methods(relation, path);
        return Ok(state.actions.options(method, allowed).into_response());
    }

    let body = match action {
        NestedAction::Create | NestedAction::Link => parse_body(body)?,
        _ => Map::new(),
    };

    let outcome = state.actions.run(action, &parsed.params, &body).await?;
    let location = match &outcome {
        ActionOutcome::Created(model) => model
            .id
            .as_deref()
            .map(|id| created_location(factory, &parsed, path, id)),
        _ => None,
    };

    let mut response = outcome.into_response();
    if let Some(location) = location.and_then(|l| HeaderValue::from_str(&l).ok()) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

/// Decode a JSON object body, an empty body is an empty object
fn parse_body(body: &[u8]) -> NestedResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(map) => Ok(map),
        other => Err(NestedError::Validation(ValidationError::InvalidBody {
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        })),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// URL of the view route for a created target
fn created_location(factory: &NestedRouteFactory, parsed: &ParsedRoute, path: &str, id: &str) -> String {
    let mut params: IndexMap<String, String> = parsed.params.clone();
    params.insert(IDS_PARAM.to_string(), id.to_string());
    let view_route = format!("{}/{}", parsed.controller_route(), NestedAction::View.id());

    match factory.create_url(&view_route, &params) {
        Some(url) => format!("/{}", url),
        None => format!("/{}/{}", path, id),
    }
}
