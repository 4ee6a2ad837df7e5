//! URL pattern templates with named placeholders
//!
//! A template such as `posts/<post_id:\d+>/comments/<IDs:\d[\d,]*>` is
//! compiled once into an anchored regex for matching inbound paths and a
//! segment list for building outbound URLs. A placeholder without a regex
//! (`<slug>`) matches one path segment.

use crate::core::error::ConfigError;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([\w._-]+)(?::([^>]+))?>").expect("placeholder regex is valid")
});

const DEFAULT_PARAM_REGEX: &str = "[^/]+";

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param { name: String, check: Regex },
}

/// A compiled URL template
#[derive(Debug, Clone)]
pub struct UrlPattern {
    template: String,
    regex: Regex,
    segments: Vec<Segment>,
}

impl UrlPattern {
    /// Compile a template (no leading or trailing slash)
    pub fn compile(template: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidPattern {
            pattern: template.to_string(),
            message,
        };

        let mut source = String::from("^");
        let mut segments = Vec::new();
        let mut last = 0;

        // Param names may hold '-' (`blog-post_id`), so groups get positional names
        for (index, caps) in PLACEHOLDER.captures_iter(template).enumerate() {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let literal = &template[last..whole.start()];
            if !literal.is_empty() {
                source.push_str(&regex::escape(literal));
                segments.push(Segment::Literal(literal.to_string()));
            }

            let name = caps[1].to_string();
            let param_regex = caps.get(2).map_or(DEFAULT_PARAM_REGEX, |m| m.as_str());
            source.push_str(&format!("(?P<p{}>{})", index, param_regex));

            let check = Regex::new(&format!("^(?:{})$", param_regex))
                .map_err(|e| invalid(e.to_string()))?;
            segments.push(Segment::Param { name, check });
            last = whole.end();
        }

        let tail = &template[last..];
        if !tail.is_empty() {
            source.push_str(&regex::escape(tail));
            segments.push(Segment::Literal(tail.to_string()));
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            regex,
            segments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Names of the placeholders, in template order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param_names().any(|n| n == name)
    }

    /// Match a path, returning the placeholder values
    pub fn matches(&self, path: &str) -> Option<IndexMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let params = self
            .param_names()
            .enumerate()
            .filter_map(|(index, name)| {
                caps.name(&format!("p{}", index))
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(params)
    }

    /// Build a path from parameters
    ///
    /// Fails when a placeholder has no value or its value does not satisfy
    /// the placeholder regex. Parameters the template does not use are
    /// ignored.
    pub fn build(&self, params: &IndexMap<String, String>) -> Option<String> {
        let mut url = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => url.push_str(literal),
                Segment::Param { name, check } => {
                    let value = params.get(name)?;
                    if !check.is_match(value) {
                        return None;
                    }
                    url.push_str(value);
                }
            }
        }
        Some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_match_extracts_named_values() {
        let pattern = UrlPattern::compile(r"posts/<post_id:\d+>/comments/<IDs:\d[\d,]*>").unwrap();

        let found = pattern.matches("posts/1/comments/2,3").unwrap();
        assert_eq!(found, params(&[("post_id", "1"), ("IDs", "2,3")]));

        assert!(pattern.matches("posts/x/comments/2").is_none());
        assert!(pattern.matches("posts/1/comments/,2").is_none());
        assert!(pattern.matches("posts/1/comments").is_none());
        assert!(pattern.matches("posts/1/comments/2/extra").is_none());
    }

    #[test]
    fn test_hyphenated_param_names() {
        let pattern = UrlPattern::compile(r"blog-posts/<blog-post_id:\d+>/tags").unwrap();
        let found = pattern.matches("blog-posts/12/tags").unwrap();
        assert_eq!(found.get("blog-post_id").map(String::as_str), Some("12"));
    }

    #[test]
    fn test_literals_are_escaped() {
        let pattern = UrlPattern::compile("v1.0/items").unwrap();
        assert!(pattern.matches("v1.0/items").is_some());
        assert!(pattern.matches("v1x0/items").is_none());
    }

    #[test]
    fn test_default_placeholder_is_one_segment() {
        let pattern = UrlPattern::compile("files/<name>").unwrap();
        assert!(pattern.matches("files/readme").is_some());
        assert!(pattern.matches("files/a/b").is_none());
    }

    #[test]
    fn test_build_checks_values() {
        let pattern = UrlPattern::compile(r"posts/<post_id:\d+>/comments/<IDs:\d[\d,]*>").unwrap();

        let url = pattern.build(&params(&[("post_id", "1"), ("IDs", "4,5"), ("page", "2")]));
        assert_eq!(url.as_deref(), Some("posts/1/comments/4,5"));

        assert!(pattern.build(&params(&[("post_id", "1")])).is_none());
        assert!(pattern.build(&params(&[("post_id", "one"), ("IDs", "4")])).is_none());
    }

    #[test]
    fn test_param_names_in_order() {
        let pattern = UrlPattern::compile(r"posts/<post_id:\d+>/tags/<IDs:\d[\d,]*>").unwrap();
        let names: Vec<_> = pattern.param_names().collect();
        assert_eq!(names, vec!["post_id", "IDs"]);
        assert!(pattern.has_param("IDs"));
        assert!(!pattern.has_param("id"));
    }

    #[test]
    fn test_invalid_param_regex() {
        let err = UrlPattern::compile("posts/<id:(>").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
