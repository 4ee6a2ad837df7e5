//! Link state engine
//!
//! Decides what a link, unlink or create request changes, given the current
//! relation state, and applies it through the store. Requests that would
//! change nothing are reported as [`LinkResult::Unchanged`] without any
//! write.

use crate::core::error::{EntityError, LinkError, NestedResult, StorageError};
use crate::core::model::{Model, SaveOutcome, key_value};
use crate::core::relation::JoinShape;
use crate::links::context::RelationContext;
use serde_json::{Map, Value};

/// Partition of requested ids against the current relation state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkPlan {
    pub already_linked: Vec<String>,
    pub to_link: Vec<String>,
    /// Extra junction columns, empty unless the relation is many-to-many
    pub junction_payload: Map<String, Value>,
}

impl LinkPlan {
    /// Nothing to link and nothing to update
    pub fn is_noop(&self) -> bool {
        self.to_link.is_empty() && self.junction_payload.is_empty()
    }
}

/// Outcome of a link, unlink or unlink-all request
#[derive(Debug, Clone, PartialEq)]
pub enum LinkResult {
    /// No state change was needed
    Unchanged,
    /// The relation state changed
    Changed,
    /// A junction row failed validation
    Rejected(Model),
}

/// Outcome of creating a related target
#[derive(Debug, Clone, PartialEq)]
pub enum CreateResult {
    /// Target saved and linked
    Created(Model),
    /// Target or junction row failed validation
    Rejected(Model),
}

/// Applies link state changes for one relation of one parent
pub struct LinkStateEngine<'a> {
    ctx: RelationContext<'a>,
}

impl<'a> LinkStateEngine<'a> {
    pub fn new(ctx: RelationContext<'a>) -> Self {
        Self { ctx }
    }

    /// Split `ids` into already linked and to-be-linked targets
    ///
    /// Every id that is not yet related must exist in the target's global
    /// collection.
    pub async fn plan(
        &self,
        parent: &Model,
        ids: &[String],
        payload: &Map<String, Value>,
    ) -> NestedResult<LinkPlan> {
        let relation = self.ctx.relation;
        let mut plan = LinkPlan::default();

        for id in ids {
            if self.ctx.store.is_related(parent, relation, id).await? {
                plan.already_linked.push(id.clone());
            } else if self.ctx.store.exists(&relation.target_type, id).await? {
                plan.to_link.push(id.clone());
            } else {
                return Err(EntityError::NotFound {
                    entity_type: relation.target_type.clone(),
                    id: id.clone(),
                }
                .into());
            }
        }

        if relation.is_many_to_many() {
            plan.junction_payload = payload.clone();
        }
        Ok(plan)
    }

    /// Link `ids` to `parent`
    ///
    /// On join entities a payload also updates the rows of ids that are
    /// linked already.
    pub async fn link(
        &self,
        parent: &Model,
        ids: &[String],
        payload: &Map<String, Value>,
    ) -> NestedResult<LinkResult> {
        let relation = self.ctx.relation;
        let plan = self.plan(parent, ids, payload).await?;

        if plan.is_noop() {
            return Ok(LinkResult::Unchanged);
        }

        let Some(entity_type) = relation.join_entity() else {
            if plan.to_link.is_empty() {
                return Err(LinkError::JunctionUpdateUnsupported {
                    relation: relation.name.clone(),
                }
                .into());
            }
            for id in &plan.to_link {
                let target = self.find_target(id).await?;
                self.ctx.authorize(Some(&target))?;
                self.ctx
                    .store
                    .link(parent, relation, &target, &plan.junction_payload)
                    .await?;
            }
            tracing::debug!(relation = %relation.name, linked = plan.to_link.len(), "Linked targets");
            return Ok(LinkResult::Changed);
        };

        // Join entity: new rows for unlinked ids, payload updates for linked ones
        for id in ids {
            let row = if plan.to_link.contains(id) {
                self.new_junction_row(entity_type, parent, id, &plan.junction_payload)
            } else if plan.junction_payload.is_empty() {
                continue;
            } else {
                let filter = self.junction_keys(parent, id);
                let mut row = self
                    .ctx
                    .store
                    .find_junction(entity_type, &filter)
                    .await?
                    .ok_or_else(|| LinkError::JunctionMissing {
                        entity_type: entity_type.to_string(),
                        target_id: id.clone(),
                    })?;
                let safe = self.ctx.store.safe_attributes(entity_type);
                row.load(&plan.junction_payload, &safe);
                row
            };

            self.ctx.authorize(Some(&row))?;
            if let Some(rejected) = self.persist(row).await? {
                return Ok(LinkResult::Rejected(rejected));
            }
        }

        tracing::debug!(
            relation = %relation.name,
            linked = plan.to_link.len(),
            updated = plan.already_linked.len(),
            "Linked targets through join entity"
        );
        Ok(LinkResult::Changed)
    }

    /// Sever `ids` from `parent`
    ///
    /// Nothing is written unless every id is currently linked.
    pub async fn unlink(&self, parent: &Model, ids: &[String]) -> NestedResult<LinkResult> {
        let relation = self.ctx.relation;

        for id in ids {
            if !self.ctx.store.is_related(parent, relation, id).await? {
                return Err(LinkError::NotLinked {
                    target_type: relation.target_type.clone(),
                    target_id: id.clone(),
                    parent_type: parent.model_type.clone(),
                    parent_id: self.ctx.route.parent_id.clone(),
                }
                .into());
            }
        }

        for id in ids {
            let target = self.find_target(id).await?;
            self.ctx.authorize(Some(&target))?;
            self.ctx
                .store
                .unlink(parent, relation, &target, relation.unlink_deletes())
                .await?;
        }

        tracing::debug!(relation = %relation.name, unlinked = ids.len(), "Unlinked targets");
        Ok(LinkResult::Changed)
    }

    /// Sever every target of `parent`
    pub async fn unlink_all(&self, parent: &Model) -> NestedResult<LinkResult> {
        let relation = self.ctx.relation;
        self.ctx
            .store
            .unlink_all(parent, relation, relation.unlink_deletes())
            .await?;
        Ok(LinkResult::Changed)
    }

    /// Create a new target from `body` and relate it to `parent`
    ///
    /// With `via_wrapper`, the junction payload is read from that body key.
    /// Without it, body keys that are not safe attributes of the target are
    /// taken as junction payload for many-to-many relations.
    pub async fn create(
        &self,
        parent: &Model,
        body: &Map<String, Value>,
        via_wrapper: Option<&str>,
    ) -> NestedResult<CreateResult> {
        let relation = self.ctx.relation;
        let store = self.ctx.store;
        let target_safe = store.safe_attributes(&relation.target_type);

        let mut body = body.clone();
        let junction_payload = match via_wrapper {
            Some(wrapper) => match body.remove(wrapper) {
                Some(Value::Object(payload)) => payload,
                _ => Map::new(),
            },
            None if relation.is_many_to_many() => body
                .iter()
                .filter(|(key, _)| !target_safe.contains(*key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => Map::new(),
        };

        let mut target = Model::new(&relation.target_type);
        target.load(&body, &target_safe);

        if relation.via.is_none() {
            for (column, parent_key) in &relation.link_columns {
                target.set(column.clone(), parent.key_of(parent_key).unwrap_or(Value::Null));
            }
        }

        let target = match store.save(target).await? {
            SaveOutcome::Saved(model) => model,
            SaveOutcome::Invalid(model) => return Ok(CreateResult::Rejected(reject(model)?)),
        };
        let Some(target_id) = target.id.clone() else {
            return Err(StorageError::SaveFailed {
                model_type: relation.target_type.clone(),
            }
            .into());
        };

        match &relation.via {
            Some(JoinShape::Entity { entity_type, .. }) => {
                let row = self.new_junction_row(entity_type, parent, &target_id, &junction_payload);
                if let Some(rejected) = self.persist(row).await? {
                    return Ok(CreateResult::Rejected(rejected));
                }
            }
            Some(JoinShape::Table { .. }) => {
                store.link(parent, relation, &target, &junction_payload).await?;
            }
            None => {}
        }

        tracing::debug!(
            relation = %relation.name,
            id = %target_id,
            "Created related target"
        );
        Ok(CreateResult::Created(target))
    }

    async fn find_target(&self, id: &str) -> NestedResult<Model> {
        let target_type = &self.ctx.relation.target_type;
        self.ctx
            .store
            .find_one(target_type, id)
            .await?
            .ok_or_else(|| {
                EntityError::NotFound {
                    entity_type: target_type.clone(),
                    id: id.to_string(),
                }
                .into()
            })
    }

    /// Join-row key columns for `parent` and target `id`
    fn junction_keys(&self, parent: &Model, id: &str) -> Map<String, Value> {
        let mut keys = Map::new();
        if let Some(via) = &self.ctx.relation.via {
            keys.insert(
                via.parent_column().to_string(),
                parent.key_of("id").unwrap_or(Value::Null),
            );
        }
        if let Some(column) = self.ctx.relation.link_column() {
            keys.insert(column.to_string(), key_value(id));
        }
        keys
    }

    fn new_junction_row(
        &self,
        entity_type: &str,
        parent: &Model,
        id: &str,
        payload: &Map<String, Value>,
    ) -> Model {
        let mut row = Model::new(entity_type);
        let safe = self.ctx.store.safe_attributes(entity_type);
        row.load(payload, &safe);
        for (column, value) in self.junction_keys(parent, id) {
            row.set(column, value);
        }
        row
    }

    /// Save a model, returning it back when validation rejected it
    async fn persist(&self, model: Model) -> NestedResult<Option<Model>> {
        match self.ctx.store.save(model).await? {
            SaveOutcome::Saved(_) => Ok(None),
            SaveOutcome::Invalid(model) => reject(model).map(Some),
        }
    }
}

/// A rejected save must carry field errors, otherwise it is a server error
fn reject(model: Model) -> NestedResult<Model> {
    if model.has_errors() {
        Ok(model)
    } else {
        Err(StorageError::SaveFailed {
            model_type: model.model_type,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NestedConfig;
    use crate::core::action::NestedAction;
    use crate::core::auth::AllowAll;
    use crate::core::error::NestedError;
    use crate::core::relation::{RelationCatalog, RelationDescriptor};
    use crate::core::service::{RelationalStore, StoreError};
    use crate::links::context::RouteContext;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    /// Refuses every save without field errors and never finds a join row
    struct BrokenStore {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl RelationalStore for BrokenStore {
        async fn find_one(&self, model_type: &str, id: &str) -> Result<Option<Model>, StoreError> {
            self.inner.find_one(model_type, id).await
        }

        async fn exists(&self, model_type: &str, id: &str) -> Result<bool, StoreError> {
            self.inner.exists(model_type, id).await
        }

        async fn find_related(
            &self,
            parent: &Model,
            relation: &RelationDescriptor,
            ids: Option<&[String]>,
        ) -> Result<Vec<Model>, StoreError> {
            self.inner.find_related(parent, relation, ids).await
        }

        async fn is_related(
            &self,
            parent: &Model,
            relation: &RelationDescriptor,
            id: &str,
        ) -> Result<bool, StoreError> {
            self.inner.is_related(parent, relation, id).await
        }

        async fn find_junction(
            &self,
            _entity_type: &str,
            _filter: &Map<String, Value>,
        ) -> Result<Option<Model>, StoreError> {
            Ok(None)
        }

        async fn save(&self, model: Model) -> Result<SaveOutcome, StoreError> {
            Ok(SaveOutcome::Invalid(model))
        }

        async fn link(
            &self,
            parent: &Model,
            relation: &RelationDescriptor,
            target: &Model,
            extra_columns: &Map<String, Value>,
        ) -> Result<(), StoreError> {
            self.inner.link(parent, relation, target, extra_columns).await
        }

        async fn unlink(
            &self,
            parent: &Model,
            relation: &RelationDescriptor,
            target: &Model,
            delete: bool,
        ) -> Result<(), StoreError> {
            self.inner.unlink(parent, relation, target, delete).await
        }

        async fn unlink_all(
            &self,
            parent: &Model,
            relation: &RelationDescriptor,
            delete: bool,
        ) -> Result<(), StoreError> {
            self.inner.unlink_all(parent, relation, delete).await
        }

        fn safe_attributes(&self, model_type: &str) -> Vec<String> {
            self.inner.safe_attributes(model_type)
        }
    }

    /// Blog models with a mandatory author role
    fn strict_config() -> NestedConfig {
        let mut config = NestedConfig::default_config();
        if let Some(author) = config.models.iter_mut().find(|m| m.name == "PostAuthor") {
            author.required.push("role".to_string());
        }
        config
    }

    fn seeded(config: &NestedConfig) -> InMemoryStore {
        let store = InMemoryStore::new(config);
        store.seed("Post", json!({ "title": "First" })).unwrap();
        for name in ["rust", "web", "db"] {
            store.seed("Tag", json!({ "name": name })).unwrap();
        }
        store
            .seed_junction("post_tag", json!({ "post_id": 1, "tag_id": 1 }))
            .unwrap();
        store.seed("User", json!({ "name": "Ann" })).unwrap();
        store.seed("User", json!({ "name": "Bob" })).unwrap();
        store
            .seed("PostAuthor", json!({ "post_id": 1, "user_id": 1, "role": "author" }))
            .unwrap();
        store
    }

    fn route(relation: &str) -> RouteContext {
        RouteContext {
            parent_type: "Post".to_string(),
            relation_name: relation.to_string(),
            link_attribute: "post_id".to_string(),
            parent_id: "1".to_string(),
        }
    }

    fn context<'a>(
        store: &'a dyn RelationalStore,
        action: NestedAction,
        route: &'a RouteContext,
        relation: &'a RelationDescriptor,
    ) -> RelationContext<'a> {
        RelationContext {
            store,
            access: &AllowAll,
            action,
            route,
            relation,
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|id| id.to_string()).collect()
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_plan_partitions_ids() {
        let config = NestedConfig::default_config();
        let store = seeded(&config);
        let parent = store.find_one("Post", "1").await.unwrap().unwrap();

        let tags = config.relation("Post", "tags").unwrap();
        let tags_route = route("tags");
        let engine = LinkStateEngine::new(context(&store, NestedAction::Link, &tags_route, &tags));
        let plan = engine
            .plan(&parent, &ids(&["1", "2"]), &payload(json!({ "weight": 2 })))
            .await
            .unwrap();
        assert_eq!(plan.already_linked, vec!["1"]);
        assert_eq!(plan.to_link, vec!["2"]);
        assert_eq!(plan.junction_payload.get("weight"), Some(&json!(2)));

        let cover = config.relation("Post", "cover").unwrap();
        let cover_route = route("cover");
        store.seed("Image", json!({ "url": "a.png" })).unwrap();
        let engine = LinkStateEngine::new(context(&store, NestedAction::Link, &cover_route, &cover));
        let plan = engine
            .plan(&parent, &ids(&["1"]), &payload(json!({ "weight": 2 })))
            .await
            .unwrap();
        assert!(plan.junction_payload.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_fails_before_any_write() {
        let config = NestedConfig::default_config();
        let store = seeded(&config);
        let parent = store.find_one("Post", "1").await.unwrap().unwrap();
        let writes = store.write_count().unwrap();

        for name in ["tags", "authors"] {
            let relation = config.relation("Post", name).unwrap();
            let route = route(name);
            let engine = LinkStateEngine::new(context(&store, NestedAction::Link, &route, &relation));

            let err = engine
                .link(&parent, &ids(&["2", "99", "3"]), &Map::new())
                .await
                .unwrap_err();
            assert!(
                matches!(err, NestedError::Entity(EntityError::NotFound { ref id, .. }) if id == "99"),
                "{}: {:?}",
                name,
                err
            );
            assert_eq!(err.status_code().as_u16(), 404);
        }

        assert_eq!(store.write_count().unwrap(), writes);
        assert_eq!(store.junction_rows("post_tag").unwrap().len(), 1);
        assert_eq!(store.rows("PostAuthor").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_join_row_is_returned_with_errors() {
        let config = strict_config();
        let store = seeded(&config);
        let parent = store.find_one("Post", "1").await.unwrap().unwrap();
        let authors = config.relation("Post", "authors").unwrap();
        let route = route("authors");
        let engine = LinkStateEngine::new(context(&store, NestedAction::Link, &route, &authors));

        let result = engine.link(&parent, &ids(&["2"]), &Map::new()).await.unwrap();
        match result {
            LinkResult::Rejected(row) => {
                assert_eq!(row.model_type, "PostAuthor");
                assert_eq!(row.errors[0].field, "role");
                assert_eq!(row.get("user_id"), Some(&json!(2)));
                assert!(row.id.is_none());
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
        assert_eq!(store.rows("PostAuthor").unwrap().len(), 1);
        assert_eq!(store.write_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_refused_without_errors_is_a_server_error() {
        let config = NestedConfig::default_config();
        let store = BrokenStore {
            inner: seeded(&config),
        };
        let parent = store.find_one("Post", "1").await.unwrap().unwrap();
        let authors = config.relation("Post", "authors").unwrap();
        let route = route("authors");
        let engine = LinkStateEngine::new(context(&store, NestedAction::Link, &route, &authors));

        let err = engine.link(&parent, &ids(&["2"]), &Map::new()).await.unwrap_err();
        assert!(matches!(
            err,
            NestedError::Storage(StorageError::SaveFailed { ref model_type }) if model_type == "PostAuthor"
        ));
        assert_eq!(err.status_code().as_u16(), 500);
        assert!(reject(Model::new("Tag")).is_err());
    }

    #[tokio::test]
    async fn test_missing_join_row_of_linked_target() {
        let config = NestedConfig::default_config();
        let store = BrokenStore {
            inner: seeded(&config),
        };
        let parent = store.find_one("Post", "1").await.unwrap().unwrap();
        let authors = config.relation("Post", "authors").unwrap();
        let route = route("authors");
        let engine = LinkStateEngine::new(context(&store, NestedAction::Link, &route, &authors));

        let err = engine
            .link(&parent, &ids(&["1"]), &payload(json!({ "role": "editor" })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NestedError::Link(LinkError::JunctionMissing { ref target_id, .. }) if target_id == "1"
        ));
        assert_eq!(err.status_code().as_u16(), 500);
    }

    #[tokio::test]
    async fn test_create_keeps_target_when_join_row_is_rejected() {
        let config = strict_config();
        let store = seeded(&config);
        let parent = store.find_one("Post", "1").await.unwrap().unwrap();
        let authors = config.relation("Post", "authors").unwrap();
        let route = route("authors");
        let engine = LinkStateEngine::new(context(&store, NestedAction::Create, &route, &authors));

        let result = engine
            .create(&parent, &payload(json!({ "name": "Cy" })), None)
            .await
            .unwrap();
        match result {
            CreateResult::Rejected(row) => {
                assert_eq!(row.model_type, "PostAuthor");
                assert_eq!(row.errors[0].field, "role");
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }

        let users = store.rows("User").unwrap();
        assert_eq!(users.len(), 3);
        assert_eq!(users[2].get("name"), Some(&json!("Cy")));
        assert_eq!(store.rows("PostAuthor").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_payload_on_linked_join_table_row() {
        let config = NestedConfig::default_config();
        let store = seeded(&config);
        let parent = store.find_one("Post", "1").await.unwrap().unwrap();
        let tags = config.relation("Post", "tags").unwrap();
        let route = route("tags");
        let engine = LinkStateEngine::new(context(&store, NestedAction::Link, &route, &tags));

        let result = engine.link(&parent, &ids(&["1"]), &Map::new()).await.unwrap();
        assert_eq!(result, LinkResult::Unchanged);

        let err = engine
            .link(&parent, &ids(&["1"]), &payload(json!({ "weight": 3 })))
            .await
            .unwrap_err();
        assert!(matches!(err, NestedError::Link(LinkError::JunctionUpdateUnsupported { .. })));
        assert_eq!(store.write_count().unwrap(), 0);
    }
}
