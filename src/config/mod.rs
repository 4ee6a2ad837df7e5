//! Configuration loading and management
//!
//! A [`NestedConfig`] declares the models the store knows, the relations
//! between them and which parent models expose nested routes for which
//! relations. It is usually loaded from YAML:
//!
//! ```yaml
//! models:
//!   - name: Post
//!     attributes: [title]
//!   - name: Comment
//!     attributes: [text, post_id]
//!     required: [text]
//! relations:
//!   - parent: Post
//!     name: comments
//!     target: Comment
//! routes:
//!   - model: Post
//!     relations: [comments]
//! ```

use crate::core::action::NestedAction;
use crate::core::error::ConfigError;
use crate::core::inflector::Inflector;
use crate::core::relation::{JoinShape, Multiplicity, RelationCatalog, RelationDescriptor};
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Schema of one model type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Model type name (e.g. "Post")
    pub name: String,

    /// Attributes that may be mass-assigned
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Attributes that must be present and non-empty on save
    #[serde(default)]
    pub required: Vec<String>,

    /// Attribute groups whose values must be unique together
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
}

/// Declaration of one relation of a parent model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationConfig {
    pub parent: String,
    pub name: String,
    pub target: String,

    #[serde(default)]
    pub multiplicity: Multiplicity,

    /// Plain join table name
    #[serde(default)]
    pub via_table: Option<String>,

    /// Join entity type
    #[serde(default)]
    pub via_entity: Option<String>,

    /// Join column holding the parent key, defaults to `<parent>_id`
    #[serde(default)]
    pub via_parent_column: Option<String>,

    /// Relation-side column -> referenced key
    ///
    /// Defaults to `{<parent>_id: id}` for direct relations and
    /// `{<target>_id: id}` for join relations.
    #[serde(default)]
    pub link: IndexMap<String, String>,
}

impl RelationConfig {
    /// Resolve the declaration into a descriptor, applying defaults
    pub fn to_descriptor(&self) -> Result<RelationDescriptor, ConfigError> {
        let parent_column = self
            .via_parent_column
            .clone()
            .unwrap_or_else(|| Inflector::link_attribute(&self.parent));

        let via = match (&self.via_table, &self.via_entity) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidRelation {
                    message: format!(
                        "relation '{}.{}' declares both via_table and via_entity",
                        self.parent, self.name
                    ),
                });
            }
            (Some(table), None) => Some(JoinShape::Table {
                table: table.clone(),
                parent_column,
            }),
            (None, Some(entity_type)) => Some(JoinShape::Entity {
                entity_type: entity_type.clone(),
                parent_column,
            }),
            (None, None) => None,
        };

        let link_columns = if self.link.is_empty() {
            let column = match via {
                Some(_) => Inflector::link_attribute(&self.target),
                None => Inflector::link_attribute(&self.parent),
            };
            IndexMap::from([(column, "id".to_string())])
        } else {
            self.link.clone()
        };

        let descriptor = RelationDescriptor {
            parent_type: self.parent.clone(),
            name: self.name.clone(),
            target_type: self.target.clone(),
            multiplicity: self.multiplicity,
            via,
            link_columns,
        };
        descriptor
            .validate()
            .map_err(|message| ConfigError::InvalidRelation { message })?;
        Ok(descriptor)
    }
}

/// A relation exposed under a parent resource
///
/// Either a bare relation name or a map overriding the URL segment and the
/// controller id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RelationRouteConfig {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        url_name: Option<String>,
        #[serde(default)]
        controller: Option<String>,
    },
}

impl RelationRouteConfig {
    pub fn relation_name(&self) -> &str {
        match self {
            RelationRouteConfig::Name(name) => name,
            RelationRouteConfig::Detailed { name, .. } => name,
        }
    }

    /// URL segment, defaults to the kebab-cased plural of the relation
    pub fn url_name(&self) -> String {
        match self {
            RelationRouteConfig::Detailed {
                url_name: Some(url_name),
                ..
            } => url_name.clone(),
            _ => Inflector::camel_to_id(&Inflector::pluralize(self.relation_name())),
        }
    }

    /// Controller id, defaults to the kebab-cased singular of the relation
    pub fn controller(&self) -> String {
        match self {
            RelationRouteConfig::Detailed {
                controller: Some(controller),
                ..
            } => controller.clone(),
            _ => Inflector::camel_to_id(&Inflector::singularize(self.relation_name())),
        }
    }
}

impl From<&str> for RelationRouteConfig {
    fn from(name: &str) -> Self {
        RelationRouteConfig::Name(name.to_string())
    }
}

/// One nested route rule: a parent model and the relations it exposes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteRuleConfig {
    /// Parent model type
    pub model: String,

    /// Relations to expose, in routing order
    pub relations: Vec<RelationRouteConfig>,

    /// URL segment of the parent, defaults to the plural of the model
    #[serde(default)]
    pub resource_name: Option<String>,

    /// Name of the parent id parameter, defaults to `<model>_id`
    #[serde(default)]
    pub link_attribute: Option<String>,

    /// Prefix of the generated controller routes
    #[serde(default)]
    pub module_prefix: Option<String>,

    /// When non-empty, only these action ids get rules
    #[serde(default)]
    pub only: Vec<String>,

    /// Action ids that get no rules
    #[serde(default)]
    pub except: Vec<String>,

    /// `"VERBS pattern" -> action id`, matched before the default table
    #[serde(default)]
    pub extra_patterns: IndexMap<String, String>,

    /// Body key holding junction payload on create
    #[serde(default)]
    pub via_wrapper: Option<String>,
}

impl RouteRuleConfig {
    pub fn new(model: impl Into<String>, relations: &[&str]) -> Self {
        Self {
            model: model.into(),
            relations: relations.iter().map(|r| RelationRouteConfig::from(*r)).collect(),
            resource_name: None,
            link_attribute: None,
            module_prefix: None,
            only: Vec::new(),
            except: Vec::new(),
            extra_patterns: IndexMap::new(),
            via_wrapper: None,
        }
    }

    pub fn resource_name(&self) -> String {
        self.resource_name
            .clone()
            .unwrap_or_else(|| Inflector::resource_name(&self.model))
    }

    pub fn link_attribute(&self) -> String {
        self.link_attribute
            .clone()
            .unwrap_or_else(|| Inflector::link_attribute(&self.model))
    }
}

/// Complete configuration for nested routes
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NestedConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,

    #[serde(default)]
    pub relations: Vec<RelationConfig>,

    #[serde(default)]
    pub routes: Vec<RouteRuleConfig>,

    /// Action id -> access policy string (see `AccessPolicy::parse_policy`)
    #[serde(default)]
    pub access: IndexMap<NestedAction, String>,
}

impl NestedConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(path.to_string()),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every relation resolves and references declared models
    pub fn validate(&self) -> Result<(), ConfigError> {
        for relation in &self.relations {
            for model in [&relation.parent, &relation.target] {
                if self.find_model(model).is_none() {
                    return Err(ConfigError::UnknownModel {
                        model: model.clone(),
                    });
                }
            }
            if let Some(entity) = &relation.via_entity {
                if self.find_model(entity).is_none() {
                    return Err(ConfigError::UnknownModel {
                        model: entity.clone(),
                    });
                }
            }
            relation.to_descriptor()?;
        }
        for route in &self.routes {
            if route.relations.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "relations".to_string(),
                    context: format!("route rule for '{}'", route.model),
                });
            }
        }
        Ok(())
    }

    /// Merge several configurations
    ///
    /// Models and relations declared again replace earlier declarations,
    /// route rules and access entries accumulate in order.
    pub fn merge(configs: Vec<NestedConfig>) -> Self {
        let mut merged = NestedConfig::default();
        for config in configs {
            for model in config.models {
                merged.models.retain(|m| m.name != model.name);
                merged.models.push(model);
            }
            for relation in config.relations {
                merged
                    .relations
                    .retain(|r| !(r.parent == relation.parent && r.name == relation.name));
                merged.relations.push(relation);
            }
            merged.routes.extend(config.routes);
            merged.access.extend(config.access);
        }
        merged
    }

    pub fn find_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn find_relation(&self, parent_type: &str, name: &str) -> Option<&RelationConfig> {
        self.relations
            .iter()
            .find(|r| r.parent == parent_type && r.name == name)
    }

    /// Create a blog configuration for tests and demos
    ///
    /// `Post` has `comments` (has-many), `tags` (many-to-many through the
    /// `post_tag` table) and `authors` (many-to-many through the `PostAuthor`
    /// join entity), plus a single-valued `cover` image.
    pub fn default_config() -> Self {
        let model = |name: &str, attributes: &[&str], required: &[&str]| ModelConfig {
            name: name.to_string(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
            required: required.iter().map(|a| a.to_string()).collect(),
            unique: Vec::new(),
        };
        let relation = |name: &str, target: &str| RelationConfig {
            parent: "Post".to_string(),
            name: name.to_string(),
            target: target.to_string(),
            multiplicity: Multiplicity::Many,
            via_table: None,
            via_entity: None,
            via_parent_column: None,
            link: IndexMap::new(),
        };

        let mut post_author = model("PostAuthor", &["post_id", "user_id", "role"], &["post_id", "user_id"]);
        post_author.unique = vec![vec!["post_id".to_string(), "user_id".to_string()]];

        Self {
            models: vec![
                model("Post", &["title"], &["title"]),
                model("Comment", &["text", "post_id"], &["text"]),
                model("Tag", &["name"], &["name"]),
                model("User", &["name"], &["name"]),
                model("Image", &["url", "post_id"], &["url"]),
                post_author,
            ],
            relations: vec![
                relation("comments", "Comment"),
                RelationConfig {
                    via_table: Some("post_tag".to_string()),
                    ..relation("tags", "Tag")
                },
                RelationConfig {
                    via_entity: Some("PostAuthor".to_string()),
                    ..relation("authors", "User")
                },
                RelationConfig {
                    multiplicity: Multiplicity::Single,
                    ..relation("cover", "Image")
                },
            ],
            routes: vec![RouteRuleConfig::new(
                "Post",
                &["comments", "tags", "authors", "cover"],
            )],
            access: IndexMap::new(),
        }
    }
}

impl RelationCatalog for NestedConfig {
    fn relation(&self, parent_type: &str, name: &str) -> Option<RelationDescriptor> {
        self.find_relation(parent_type, name)
            .and_then(|r| r.to_descriptor().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NestedConfig::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.relations.len(), 4);
        assert_eq!(config.routes.len(), 1);
    }

    #[test]
    fn test_descriptor_defaults() {
        let config = NestedConfig::default_config();

        let comments = config.relation("Post", "comments").unwrap();
        assert!(comments.via.is_none());
        assert_eq!(comments.link_column(), Some("post_id"));

        let tags = config.relation("Post", "tags").unwrap();
        assert_eq!(
            tags.via,
            Some(JoinShape::Table {
                table: "post_tag".to_string(),
                parent_column: "post_id".to_string(),
            })
        );
        assert_eq!(tags.link_column(), Some("tag_id"));

        let authors = config.relation("Post", "authors").unwrap();
        assert_eq!(authors.join_entity(), Some("PostAuthor"));
        assert_eq!(authors.link_column(), Some("user_id"));

        assert!(config.relation("Post", "likes").is_none());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = NestedConfig::default_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = NestedConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_relation_route_forms() {
        let yaml = r#"
            models:
              - name: Post
              - name: Tag
            relations:
              - parent: Post
                name: postTags
                target: Tag
                via_table: post_tag
            routes:
              - model: Post
                relations:
                  - postTags
                  - name: postTags
                    url_name: labels
                    controller: label
                module_prefix: v1
            access:
              unlink-all: deny
        "#;
        let config = NestedConfig::from_yaml_str(yaml).unwrap();
        let relations = &config.routes[0].relations;

        assert_eq!(relations[0].url_name(), "post-tags");
        assert_eq!(relations[0].controller(), "post-tag");
        assert_eq!(relations[1].url_name(), "labels");
        assert_eq!(relations[1].controller(), "label");
        assert_eq!(config.routes[0].module_prefix.as_deref(), Some("v1"));
        assert_eq!(config.access.get(&NestedAction::UnlinkAll).map(String::as_str), Some("deny"));
    }

    #[test]
    fn test_both_join_kinds_is_rejected() {
        let mut config = NestedConfig::default_config();
        config.relations[1].via_entity = Some("PostAuthor".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRelation { .. }));
    }

    #[test]
    fn test_single_relation_with_join_is_rejected() {
        let mut config = NestedConfig::default_config();
        config.relations[3].via_table = Some("post_image".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let mut config = NestedConfig::default_config();
        config.relations[0].target = "Reply".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Reply"));
    }

    #[test]
    fn test_merge_replaces_models_and_appends_routes() {
        let base = NestedConfig::default_config();
        let mut extra = NestedConfig::default();
        extra.models.push(ModelConfig {
            name: "Tag".to_string(),
            attributes: vec!["name".to_string(), "color".to_string()],
            required: Vec::new(),
            unique: Vec::new(),
        });
        extra.routes.push(RouteRuleConfig::new("Post", &["tags"]));

        let merged = NestedConfig::merge(vec![base, extra]);
        assert_eq!(merged.models.len(), 6);
        assert_eq!(merged.find_model("Tag").unwrap().attributes.len(), 2);
        assert_eq!(merged.routes.len(), 2);
    }
}
