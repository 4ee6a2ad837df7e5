//! In-memory implementation of RelationalStore for testing and development

use crate::config::{ModelConfig, NestedConfig};
use crate::core::model::{Model, SaveOutcome, key_string, key_value};
use crate::core::relation::{JoinShape, RelationDescriptor};
use crate::core::service::{RelationalStore, StoreError};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Row = Map<String, Value>;

#[derive(Debug, Default)]
struct Tables {
    /// model type -> primary key -> attributes
    rows: HashMap<String, IndexMap<String, Row>>,
    /// join table -> rows
    junctions: HashMap<String, Vec<Row>>,
    sequences: HashMap<String, u64>,
    writes: u64,
}

impl Tables {
    fn next_id(&mut self, model_type: &str) -> String {
        let seq = self.sequences.entry(model_type.to_string()).or_insert(0);
        *seq += 1;
        seq.to_string()
    }

    fn find(&self, model_type: &str, id: &str) -> Option<Model> {
        self.rows
            .get(model_type)
            .and_then(|rows| rows.get(id))
            .map(|attributes| Model {
                model_type: model_type.to_string(),
                id: Some(id.to_string()),
                attributes: attributes.clone(),
                errors: Vec::new(),
            })
    }

    /// Join rows of a many-to-many relation, table or entity
    fn join_rows(&self, via: &JoinShape) -> Vec<&Row> {
        match via {
            JoinShape::Table { table, .. } => self
                .junctions
                .get(table)
                .map(|rows| rows.iter().collect())
                .unwrap_or_default(),
            JoinShape::Entity { entity_type, .. } => self
                .rows
                .get(entity_type)
                .map(|rows| rows.values().collect())
                .unwrap_or_default(),
        }
    }

    /// Primary keys of the targets related to `parent`, ordered by key
    fn related_ids(&self, parent: &Model, relation: &RelationDescriptor) -> Vec<String> {
        let Some((column, key)) = relation.link_columns.first() else {
            return Vec::new();
        };
        let empty = IndexMap::new();
        let targets = self.rows.get(&relation.target_type).unwrap_or(&empty);

        let mut ids: Vec<String> = match &relation.via {
            None => {
                let Some(parent_key) = parent.key_of(key).as_ref().and_then(key_string) else {
                    return Vec::new();
                };
                targets
                    .iter()
                    .filter(|(_, row)| {
                        row.get(column).and_then(key_string).as_deref() == Some(parent_key.as_str())
                    })
                    .map(|(id, _)| id.clone())
                    .collect()
            }
            Some(via) => {
                let Some(parent_id) = parent.id.as_deref() else {
                    return Vec::new();
                };
                let linked: Vec<String> = self
                    .join_rows(via)
                    .into_iter()
                    .filter(|row| {
                        row.get(via.parent_column()).and_then(key_string).as_deref()
                            == Some(parent_id)
                    })
                    .filter_map(|row| row.get(column).and_then(key_string))
                    .collect();
                targets
                    .iter()
                    .filter(|(id, row)| {
                        let target_key = if key == "id" {
                            Some((*id).clone())
                        } else {
                            row.get(key).and_then(key_string)
                        };
                        target_key.is_some_and(|k| linked.contains(&k))
                    })
                    .map(|(id, _)| id.clone())
                    .collect()
            }
        };

        ids.sort_by_key(|id| (id.parse::<u64>().unwrap_or(u64::MAX), id.clone()));
        ids
    }

    /// Remove the join rows tying `parent_id` to `target_key`
    fn remove_join_rows(&mut self, via: &JoinShape, column: &str, parent_id: &str, target_key: &str) {
        let matches = |row: &Row| {
            row.get(via.parent_column()).and_then(key_string).as_deref() == Some(parent_id)
                && row.get(column).and_then(key_string).as_deref() == Some(target_key)
        };
        match via {
            JoinShape::Table { table, .. } => {
                if let Some(rows) = self.junctions.get_mut(table) {
                    rows.retain(|row| !matches(row));
                }
            }
            JoinShape::Entity { entity_type, .. } => {
                if let Some(rows) = self.rows.get_mut(entity_type) {
                    rows.retain(|_, row| !matches(row));
                }
            }
        }
    }
}

/// In-memory relational store
///
/// Model types, their safe attributes, required attributes and unique
/// groups come from a [`NestedConfig`]. Primary keys are sequential per
/// type. Uses RwLock for thread-safe access.
#[derive(Clone)]
pub struct InMemoryStore {
    schema: Arc<HashMap<String, ModelConfig>>,
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Create an empty store for the models declared in `config`
    pub fn new(config: &NestedConfig) -> Self {
        let schema = config
            .models
            .iter()
            .map(|model| (model.name.clone(), model.clone()))
            .collect();
        Self {
            schema: Arc::new(schema),
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|e| StoreError::Backend(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|e| StoreError::Backend(format!("Failed to acquire write lock: {}", e)))
    }

    fn model_config(&self, model_type: &str) -> Result<&ModelConfig, StoreError> {
        self.schema
            .get(model_type)
            .ok_or_else(|| StoreError::UnknownModel(model_type.to_string()))
    }

    /// Insert a row without validation, returning its primary key
    pub fn seed(&self, model_type: &str, attributes: Value) -> Result<String, StoreError> {
        self.model_config(model_type)?;
        let Value::Object(attributes) = attributes else {
            return Err(StoreError::Backend("seed attributes must be an object".to_string()));
        };
        let mut tables = self.write()?;
        let id = tables.next_id(model_type);
        tables
            .rows
            .entry(model_type.to_string())
            .or_default()
            .insert(id.clone(), attributes);
        Ok(id)
    }

    /// Insert a join table row without checks
    pub fn seed_junction(&self, table: &str, row: Value) -> Result<(), StoreError> {
        let Value::Object(row) = row else {
            return Err(StoreError::Backend("junction row must be an object".to_string()));
        };
        self.write()?
            .junctions
            .entry(table.to_string())
            .or_default()
            .push(row);
        Ok(())
    }

    /// Every row of a model type, ordered by insertion
    pub fn rows(&self, model_type: &str) -> Result<Vec<Model>, StoreError> {
        let tables = self.read()?;
        let ids: Vec<String> = tables
            .rows
            .get(model_type)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default();
        Ok(ids.iter().filter_map(|id| tables.find(model_type, id)).collect())
    }

    /// Every row of a join table
    pub fn junction_rows(&self, table: &str) -> Result<Vec<Map<String, Value>>, StoreError> {
        Ok(self.read()?.junctions.get(table).cloned().unwrap_or_default())
    }

    /// Number of mutating operations applied so far
    pub fn write_count(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.writes)
    }

    fn validate(&self, model: &mut Model, tables: &Tables) -> Result<(), StoreError> {
        let config = self.model_config(&model.model_type)?;

        for field in &config.required {
            let blank = match model.get(field) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if blank {
                model.add_error(field.clone(), format!("{} cannot be blank.", field));
            }
        }
        if model.has_errors() {
            return Ok(());
        }

        let Some(rows) = tables.rows.get(&model.model_type) else {
            return Ok(());
        };
        for group in &config.unique {
            let taken = rows.iter().any(|(id, row)| {
                model.id.as_deref() != Some(id.as_str())
                    && group.iter().all(|field| {
                        let ours = model.get(field).and_then(key_string);
                        ours.is_some() && row.get(field).and_then(key_string) == ours
                    })
            });
            if taken {
                return Err(StoreError::Conflict {
                    message: format!("{} ({}) is already taken", model.model_type, group.join(", ")),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RelationalStore for InMemoryStore {
    async fn find_one(&self, model_type: &str, id: &str) -> Result<Option<Model>, StoreError> {
        self.model_config(model_type)?;
        Ok(self.read()?.find(model_type, id))
    }

    async fn exists(&self, model_type: &str, id: &str) -> Result<bool, StoreError> {
        self.model_config(model_type)?;
        Ok(self.read()?.find(model_type, id).is_some())
    }

    async fn find_related(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        ids: Option<&[String]>,
    ) -> Result<Vec<Model>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .related_ids(parent, relation)
            .into_iter()
            .filter(|id| ids.is_none_or(|wanted| wanted.contains(id)))
            .filter_map(|id| tables.find(&relation.target_type, &id))
            .collect())
    }

    async fn is_related(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        id: &str,
    ) -> Result<bool, StoreError> {
        let tables = self.read()?;
        Ok(tables.related_ids(parent, relation).iter().any(|r| r == id))
    }

    async fn find_junction(
        &self,
        entity_type: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Model>, StoreError> {
        self.model_config(entity_type)?;
        let tables = self.read()?;
        let found = tables.rows.get(entity_type).and_then(|rows| {
            rows.iter().find(|(_, row)| {
                filter.iter().all(|(column, value)| {
                    row.get(column).and_then(key_string) == key_string(value)
                })
            })
        });
        Ok(found.and_then(|(id, _)| tables.find(entity_type, id)))
    }

    async fn save(&self, mut model: Model) -> Result<SaveOutcome, StoreError> {
        let mut tables = self.write()?;
        model.errors.clear();
        self.validate(&mut model, &tables)?;
        if model.has_errors() {
            return Ok(SaveOutcome::Invalid(model));
        }

        let id = match &model.id {
            Some(id) => id.clone(),
            None => tables.next_id(&model.model_type),
        };
        tables
            .rows
            .entry(model.model_type.clone())
            .or_default()
            .insert(id.clone(), model.attributes.clone());
        tables.writes += 1;

        model.id = Some(id);
        Ok(SaveOutcome::Saved(model))
    }

    async fn link(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        target: &Model,
        extra_columns: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let (Some(parent_id), Some(target_id)) = (parent.id.as_deref(), target.id.as_deref()) else {
            return Err(StoreError::Backend(format!(
                "cannot link unsaved {} to {}",
                target.model_type, parent.model_type
            )));
        };
        let Some((column, key)) = relation.link_columns.first() else {
            return Err(StoreError::Backend(format!(
                "relation '{}' declares no link columns",
                relation.name
            )));
        };

        let mut tables = self.write()?;
        match &relation.via {
            None => {
                let value = parent.key_of(key).unwrap_or(Value::Null);
                let row = tables
                    .rows
                    .get_mut(&relation.target_type)
                    .and_then(|rows| rows.get_mut(target_id))
                    .ok_or_else(|| {
                        StoreError::Backend(format!("{} '{}' does not exist", target.model_type, target_id))
                    })?;
                row.insert(column.clone(), value);
            }
            Some(via) => {
                if tables.related_ids(parent, relation).iter().any(|id| id == target_id) {
                    return Err(StoreError::Conflict {
                        message: format!(
                            "{} '{}' is already linked to {} '{}'",
                            target.model_type, target_id, parent.model_type, parent_id
                        ),
                    });
                }
                let mut row = extra_columns.clone();
                row.insert(via.parent_column().to_string(), key_value(parent_id));
                row.insert(column.clone(), target.key_of(key).unwrap_or(Value::Null));

                match via {
                    JoinShape::Table { table, .. } => {
                        tables.junctions.entry(table.clone()).or_default().push(row);
                    }
                    JoinShape::Entity { entity_type, .. } => {
                        let id = tables.next_id(entity_type);
                        tables.rows.entry(entity_type.clone()).or_default().insert(id, row);
                    }
                }
            }
        }
        tables.writes += 1;
        Ok(())
    }

    async fn unlink(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        target: &Model,
        delete: bool,
    ) -> Result<(), StoreError> {
        let (Some(parent_id), Some(target_id)) = (parent.id.as_deref(), target.id.as_deref()) else {
            return Ok(());
        };
        let Some((column, key)) = relation.link_columns.first() else {
            return Ok(());
        };

        let mut tables = self.write()?;
        match &relation.via {
            None => {
                if let Some(rows) = tables.rows.get_mut(&relation.target_type) {
                    if delete {
                        rows.shift_remove(target_id);
                    } else if let Some(row) = rows.get_mut(target_id) {
                        row.insert(column.clone(), Value::Null);
                    }
                }
            }
            Some(via) => {
                let target_key = target.key_of(key).as_ref().and_then(key_string);
                if let Some(target_key) = target_key {
                    tables.remove_join_rows(via, column, parent_id, &target_key);
                }
            }
        }
        tables.writes += 1;
        Ok(())
    }

    async fn unlink_all(
        &self,
        parent: &Model,
        relation: &RelationDescriptor,
        delete: bool,
    ) -> Result<(), StoreError> {
        let targets = self.find_related(parent, relation, None).await?;
        for target in &targets {
            self.unlink(parent, relation, target, delete).await?;
        }
        Ok(())
    }

    fn safe_attributes(&self, model_type: &str) -> Vec<String> {
        self.schema
            .get(model_type)
            .map(|model| model.attributes.clone())
            .unwrap_or_default()
    }
}
