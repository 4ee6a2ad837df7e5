//! Relation metadata consumed by the routing and link layers
//!
//! A [`RelationDescriptor`] describes the shape of one declared relation of a
//! parent model. Descriptors are owned by the persistence side and are read
//! once, when the route factory is built.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How many targets a relation holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    /// has-one
    Single,
    /// has-many or many-to-many
    #[default]
    Many,
}

/// Join mechanism of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinShape {
    /// A bare join table holding the two keys plus optional extra columns
    Table {
        table: String,
        parent_column: String,
    },
    /// A join entity: a persisted model type with its own attributes
    Entity {
        entity_type: String,
        parent_column: String,
    },
}

impl JoinShape {
    /// Column of the join row that holds the parent's primary key
    pub fn parent_column(&self) -> &str {
        match self {
            JoinShape::Table { parent_column, .. } => parent_column,
            JoinShape::Entity { parent_column, .. } => parent_column,
        }
    }
}

/// Shape metadata for one relation of a parent model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Parent model type (e.g. "Post")
    pub parent_type: String,

    /// Relation name as declared on the parent (e.g. "comments")
    pub name: String,

    /// Related model type (e.g. "Comment")
    pub target_type: String,

    pub multiplicity: Multiplicity,

    /// Join mechanism, only meaningful when `multiplicity` is `Many`
    pub via: Option<JoinShape>,

    /// Relation-side column -> key it references
    ///
    /// Direct relations map the foreign key on the target to the parent key
    /// (`post_id -> id`). Join relations map the join column to the target
    /// primary key (`tag_id -> id`).
    pub link_columns: IndexMap<String, String>,
}

impl RelationDescriptor {
    /// Check the descriptor's own invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.multiplicity == Multiplicity::Single && self.via.is_some() {
            return Err(format!(
                "relation '{}.{}' is single-valued and cannot declare a join",
                self.parent_type, self.name
            ));
        }
        if self.link_columns.is_empty() {
            return Err(format!(
                "relation '{}.{}' declares no link columns",
                self.parent_type, self.name
            ));
        }
        if self.via.is_some() {
            if let Some((column, key)) = self.link_columns.iter().find(|(_, key)| *key != "id") {
                return Err(format!(
                    "relation '{}.{}' links join column '{}' to '{}', join rows must reference the target id",
                    self.parent_type, self.name, column, key
                ));
            }
        }
        Ok(())
    }

    /// Many-to-many through a join table or join entity
    pub fn is_many_to_many(&self) -> bool {
        self.multiplicity == Multiplicity::Many && self.via.is_some()
    }

    /// The join entity type, when the relation goes through one
    pub fn join_entity(&self) -> Option<&str> {
        match (&self.multiplicity, &self.via) {
            (Multiplicity::Many, Some(JoinShape::Entity { entity_type, .. })) => Some(entity_type),
            _ => None,
        }
    }

    /// The first relation-side column: the target foreign key for direct
    /// relations, the target column of the join row otherwise
    pub fn link_column(&self) -> Option<&str> {
        self.link_columns.keys().next().map(String::as_str)
    }

    /// Unlinking deletes join rows for many-to-many, nulls foreign keys otherwise
    pub fn unlink_deletes(&self) -> bool {
        self.is_many_to_many()
    }
}

/// Lookup of relation metadata by parent type and relation name
pub trait RelationCatalog: Send + Sync {
    fn relation(&self, parent_type: &str, name: &str) -> Option<RelationDescriptor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> RelationDescriptor {
        RelationDescriptor {
            parent_type: "Post".to_string(),
            name: "tags".to_string(),
            target_type: "Tag".to_string(),
            multiplicity: Multiplicity::Many,
            via: Some(JoinShape::Table {
                table: "post_tag".to_string(),
                parent_column: "post_id".to_string(),
            }),
            link_columns: IndexMap::from([("tag_id".to_string(), "id".to_string())]),
        }
    }

    #[test]
    fn test_join_table_shape() {
        let rel = tags();
        assert!(rel.validate().is_ok());
        assert!(rel.is_many_to_many());
        assert!(rel.unlink_deletes());
        assert_eq!(rel.join_entity(), None);
        assert_eq!(rel.link_column(), Some("tag_id"));
        assert_eq!(rel.via.as_ref().unwrap().parent_column(), "post_id");
    }

    #[test]
    fn test_join_entity_shape() {
        let mut rel = tags();
        rel.via = Some(JoinShape::Entity {
            entity_type: "PostTag".to_string(),
            parent_column: "post_id".to_string(),
        });
        assert_eq!(rel.join_entity(), Some("PostTag"));
        assert_eq!(rel.via.as_ref().unwrap().parent_column(), "post_id");
    }

    #[test]
    fn test_join_link_must_reference_target_id() {
        let mut rel = tags();
        rel.link_columns = IndexMap::from([("tag_slug".to_string(), "slug".to_string())]);
        let err = rel.validate().unwrap_err();
        assert!(err.contains("tag_slug"));

        rel.via = None;
        rel.link_columns = IndexMap::from([("post_slug".to_string(), "slug".to_string())]);
        assert!(rel.validate().is_ok());
    }

    #[test]
    fn test_single_relation_with_join_is_invalid() {
        let mut rel = tags();
        rel.multiplicity = Multiplicity::Single;
        let err = rel.validate().unwrap_err();
        assert!(err.contains("single-valued"));
    }

    #[test]
    fn test_direct_relation_nulls_on_unlink() {
        let mut rel = tags();
        rel.via = None;
        rel.link_columns = IndexMap::from([("post_id".to_string(), "id".to_string())]);
        assert!(!rel.is_many_to_many());
        assert!(!rel.unlink_deletes());
        assert_eq!(rel.link_column(), Some("post_id"));
    }
}
