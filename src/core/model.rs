//! Dynamic model records exchanged with the persistence layer

use crate::core::error::FieldValidationError;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A persisted (or about to be persisted) instance of some model type
///
/// The crate never knows concrete model structs: rows travel as a type name,
/// a primary key and a bag of JSON attributes. Field errors are attached by
/// the store when validation fails on save.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub model_type: String,

    /// Primary key, `None` until the row is saved
    pub id: Option<String>,

    pub attributes: Map<String, Value>,

    pub errors: Vec<FieldValidationError>,
}

impl Model {
    /// Create an unsaved instance of `model_type`
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Mass-assign `data`, keeping only `safe` attributes
    ///
    /// Returns whether at least one attribute was assigned.
    pub fn load(&mut self, data: &Map<String, Value>, safe: &[String]) -> bool {
        let mut loaded = false;
        for (name, value) in data {
            if safe.iter().any(|s| s == name) {
                self.attributes.insert(name.clone(), value.clone());
                loaded = true;
            }
        }
        loaded
    }

    /// Value of a key attribute, `"id"` resolving to the primary key
    pub fn key_of(&self, attribute: &str) -> Option<Value> {
        if attribute == "id" {
            return self.id.as_deref().map(key_value);
        }
        self.attributes.get(attribute).cloned()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// JSON view: `{ "id": .., ..attributes, "errors": [..] }`
    ///
    /// Numeric keys are emitted as numbers, errors only when present.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        if let Some(id) = &self.id {
            object.insert("id".to_string(), key_value(id));
        }
        for (name, value) in &self.attributes {
            object.insert(name.clone(), value.clone());
        }
        if self.has_errors() {
            object.insert(
                "errors".to_string(),
                serde_json::to_value(&self.errors).unwrap_or(Value::Null),
            );
        }
        Value::Object(object)
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// JSON form of a key: numeric keys become numbers
pub fn key_value(key: &str) -> Value {
    key.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(key.to_string()))
}

/// Comparable form of a key attribute, `None` for null and non-scalars
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Result of asking the store to persist a model
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Persisted, with its primary key assigned
    Saved(Model),
    /// Rejected by validation, the model carries its field errors
    Invalid(Model),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_keeps_safe_attributes_only() {
        let mut model = Model::new("Comment");
        let data = json!({ "text": "hi", "admin": true });
        let loaded = model.load(data.as_object().unwrap(), &["text".to_string()]);

        assert!(loaded);
        assert_eq!(model.get("text"), Some(&json!("hi")));
        assert!(model.get("admin").is_none());
    }

    #[test]
    fn test_load_nothing_safe() {
        let mut model = Model::new("Comment");
        let data = json!({ "admin": true });
        assert!(!model.load(data.as_object().unwrap(), &[]));
        assert!(model.attributes.is_empty());
    }

    #[test]
    fn test_to_json_numeric_id_and_errors() {
        let mut model = Model::new("Comment")
            .with_id("7")
            .with_attribute("text", "hi");
        assert_eq!(model.to_json(), json!({ "id": 7, "text": "hi" }));

        model.add_error("text", "too short");
        let value = model.to_json();
        assert_eq!(value["errors"][0]["field"], "text");
        assert_eq!(value["errors"][0]["message"], "too short");
    }

    #[test]
    fn test_key_helpers() {
        let post = Model::new("Post").with_id("3").with_attribute("slug", "intro");
        assert_eq!(post.key_of("id"), Some(json!(3)));
        assert_eq!(post.key_of("slug"), Some(json!("intro")));
        assert_eq!(post.key_of("missing"), None);

        assert_eq!(key_string(&json!(3)), Some("3".to_string()));
        assert_eq!(key_string(&json!("3")), Some("3".to_string()));
        assert_eq!(key_string(&Value::Null), None);
    }

    #[test]
    fn test_non_numeric_id_stays_a_string() {
        let model = Model::new("Tag").with_id("abc");
        assert_eq!(model.to_json()["id"], json!("abc"));
    }
}
