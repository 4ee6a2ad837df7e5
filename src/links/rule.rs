//! Per-relation URL rules
//!
//! Each exposed relation gets a [`RelationRuleSet`]: an ordered list of
//! verb-restricted patterns under `{prefix}/{url_name}`, each mapped to one
//! action of the relation's controller. The first matching rule wins.

use crate::core::action::NestedAction;
use crate::core::error::ConfigError;
use crate::links::pattern::UrlPattern;
use axum::http::Method;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

/// Regex substituted for the `{id}` and `{IDs}` tokens
pub const IDS_REGEX: &str = r"\d[\d,]*";

/// Name of the placeholder holding the target id list
pub const IDS_PARAM: &str = "IDs";

static VERBS_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^((?:(?:GET|HEAD|POST|PUT|PATCH|DELETE|OPTIONS),)*(?:GET|HEAD|POST|PUT|PATCH|DELETE|OPTIONS))(?:\s+(.*))?$",
    )
    .expect("verbs regex is valid")
});

/// The default pattern table, in matching order
pub fn default_patterns() -> Vec<(String, String)> {
    [
        ("GET,HEAD {IDs}", NestedAction::View),
        ("GET,HEAD", NestedAction::Index),
        ("POST", NestedAction::Create),
        ("PUT {IDs}", NestedAction::Link),
        ("DELETE {IDs}", NestedAction::Unlink),
        ("DELETE", NestedAction::UnlinkAll),
        ("{id}", NestedAction::Options),
        ("", NestedAction::Options),
    ]
    .into_iter()
    .map(|(key, action)| (key.to_string(), action.id().to_string()))
    .collect()
}

/// Replace the id tokens with their placeholder syntax
pub fn replace_tokens(pattern: &str) -> String {
    pattern
        .replace("{IDs}", &format!("<{}:{}>", IDS_PARAM, IDS_REGEX))
        .replace("{id}", &format!("<id:{}>", IDS_REGEX))
}

/// Split a table key (`"GET,HEAD {IDs}"`) into verbs and URL suffix
///
/// Verbs are matched in any case. Keys that do not start with a verb list
/// apply to every verb.
pub fn split_key(key: &str) -> (Vec<Method>, String) {
    match VERBS_KEY.captures(key.trim()) {
        Some(caps) => {
            let verbs = caps[1]
                .split(',')
                .filter_map(|v| Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok())
                .collect();
            let suffix = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
            (verbs, suffix)
        }
        None => (Vec::new(), key.trim().to_string()),
    }
}

/// Resolve the table for a rule: extra patterns first, then the defaults,
/// filtered by `only`/`except`
///
/// A default entry with the same key as an extra pattern is dropped.
pub fn pattern_table(
    extra_patterns: &IndexMap<String, String>,
    only: &[String],
    except: &[String],
) -> Vec<(String, String)> {
    let mut table: Vec<(String, String)> = extra_patterns
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, action) in default_patterns() {
        if !extra_patterns.contains_key(&key) {
            table.push((key, action));
        }
    }

    table
        .into_iter()
        .filter(|(_, action)| {
            !except.iter().any(|a| a == action)
                && (only.is_empty() || only.iter().any(|a| a == action))
        })
        .collect()
}

/// One verb-restricted URL rule
#[derive(Debug, Clone)]
pub struct NestedRule {
    /// Empty means any verb
    pub verbs: Vec<Method>,
    pub pattern: UrlPattern,
    /// `{controller route}/{action id}`
    pub route: String,
}

impl NestedRule {
    pub fn accepts(&self, method: &Method) -> bool {
        self.verbs.is_empty() || self.verbs.contains(method)
    }

    /// Action id, the last route segment
    pub fn action_id(&self) -> &str {
        self.route.rsplit('/').next().unwrap_or(&self.route)
    }
}

/// Rules of one relation under a parent resource
#[derive(Debug, Clone)]
pub struct RelationRuleSet {
    url_name: String,
    controller_route: String,
    rules: Vec<NestedRule>,
}

impl RelationRuleSet {
    /// Build the rules for `{prefix}/{url_name}` from a pattern table
    pub fn build(
        prefix: &str,
        url_name: &str,
        controller_route: &str,
        table: &[(String, String)],
    ) -> Result<Self, ConfigError> {
        let base = format!("{}/{}", prefix, url_name);
        let rules = table
            .iter()
            .map(|(key, action)| {
                let (verbs, suffix) = split_key(key);
                let template = if suffix.is_empty() {
                    base.clone()
                } else {
                    format!("{}/{}", base, replace_tokens(&suffix))
                };
                Ok(NestedRule {
                    verbs,
                    pattern: UrlPattern::compile(&template)?,
                    route: format!("{}/{}", controller_route, action),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            url_name: url_name.to_string(),
            controller_route: controller_route.to_string(),
            rules,
        })
    }

    pub fn url_name(&self) -> &str {
        &self.url_name
    }

    pub fn controller_route(&self) -> &str {
        &self.controller_route
    }

    /// First rule accepting the verb and matching the path
    pub fn parse(&self, method: &Method, path: &str) -> Option<(&NestedRule, IndexMap<String, String>)> {
        self.rules
            .iter()
            .filter(|rule| rule.accepts(method))
            .find_map(|rule| rule.pattern.matches(path).map(|params| (rule, params)))
    }

    /// Build a URL for `route`, trying every rule mapped to it
    pub fn create_url(&self, route: &str, params: &IndexMap<String, String>) -> Option<String> {
        self.rules
            .iter()
            .filter(|rule| rule.route == route)
            .find_map(|rule| rule.pattern.build(params))
    }

    /// Verbs served at `path` by non-options rules, plus `OPTIONS`
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut allowed: Vec<Method> = Vec::new();
        let options = NestedAction::Options.id();
        for rule in &self.rules {
            if rule.action_id() == options || rule.pattern.matches(path).is_none() {
                continue;
            }
            for verb in &rule.verbs {
                if !allowed.contains(verb) {
                    allowed.push(verb.clone());
                }
            }
        }
        allowed.push(Method::OPTIONS);
        allowed
    }
}
