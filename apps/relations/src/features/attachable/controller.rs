use async_trait::async_trait;
use relation_types::StatusResponse;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use super::error::AttachError;
use super::validation::item_set;
use crate::config::DEFAULT_PER_PAGE;
use crate::features::models::relation::{parse_keys, RelationError, SimplePage};
use crate::features::models::repo::RelationStore;
use crate::features::models::schema::{Model, ModelDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Attach,
    Detach,
    Sync,
}

impl Mutation {
    pub fn as_str(self) -> &'static str {
        match self {
            Mutation::Attach => "attach",
            Mutation::Detach => "detach",
            Mutation::Sync => "sync",
        }
    }
}

/// Many-to-many shortcuts for a resource controller. Implementors supply the
/// owner model and the store; the locator and item hooks can be overridden
/// per operation.
#[async_trait]
pub trait Attachable: Send + Sync {
    fn model(&self) -> Arc<ModelDef>;

    fn store(&self) -> Arc<dyn RelationStore>;

    fn per_page(&self) -> u64 {
        DEFAULT_PER_PAGE
    }

    /// Also used by `attached`.
    fn attach_model(&self) -> Arc<ModelDef> {
        self.model()
    }

    fn detach_model(&self) -> Arc<ModelDef> {
        self.model()
    }

    fn sync_model(&self) -> Arc<ModelDef> {
        self.model()
    }

    fn prepare_attach_items(&self, items: Vec<Value>, _owner: &Model, _relation: &str) -> Vec<Value> {
        items
    }

    fn prepare_detach_items(&self, items: Vec<Value>, _owner: &Model, _relation: &str) -> Vec<Value> {
        items
    }

    fn prepare_sync_items(&self, items: Vec<Value>, _owner: &Model, _relation: &str) -> Vec<Value> {
        items
    }

    /// One page of the records related to owner `id`.
    async fn attached(&self, id: &str, relation: &str, page: u64) -> Result<SimplePage, AttachError> {
        let store = self.store();
        let def = self.attach_model();
        let owner = locate(&def, store.as_ref(), id).await?;
        let accessor = def.resolve_relation(relation);

        owner
            .simple_paginate(&accessor, store, page, self.per_page())
            .await
            .map_err(|err| match err {
                RelationError::Undefined { .. } => AttachError::NotFound,
                other => {
                    error!(error = %other, owner = owner.id, relation = %accessor, "failed to list related items");
                    AttachError::Internal
                }
            })
    }

    async fn attach(
        &self,
        id: &str,
        relation: &str,
        body: &Value,
        param_key: Option<&str>,
    ) -> Result<StatusResponse, AttachError> {
        mutate(self, Mutation::Attach, id, relation, body, param_key).await
    }

    async fn detach(
        &self,
        id: &str,
        relation: &str,
        body: &Value,
        param_key: Option<&str>,
    ) -> Result<StatusResponse, AttachError> {
        mutate(self, Mutation::Detach, id, relation, body, param_key).await
    }

    async fn sync(
        &self,
        id: &str,
        relation: &str,
        body: &Value,
        param_key: Option<&str>,
    ) -> Result<StatusResponse, AttachError> {
        mutate(self, Mutation::Sync, id, relation, body, param_key).await
    }
}

async fn locate(def: &Arc<ModelDef>, store: &dyn RelationStore, id: &str) -> Result<Model, AttachError> {
    match Model::find(def, store, id).await {
        Ok(Some(owner)) => Ok(owner),
        Ok(None) => Err(AttachError::NotFound),
        Err(err) => {
            error!(error = %err, model = %def.name, id, "failed to look up owner");
            Err(AttachError::Internal)
        }
    }
}

async fn mutate<C: Attachable + ?Sized>(
    controller: &C,
    op: Mutation,
    id: &str,
    relation: &str,
    body: &Value,
    param_key: Option<&str>,
) -> Result<StatusResponse, AttachError> {
    let param_key = param_key.filter(|key| !key.is_empty()).unwrap_or(relation);
    let items = item_set(body, param_key)?;

    let store = controller.store();
    let def = match op {
        Mutation::Attach => controller.attach_model(),
        Mutation::Detach => controller.detach_model(),
        Mutation::Sync => controller.sync_model(),
    };
    let owner = locate(&def, store.as_ref(), id).await?;
    let accessor = def.resolve_relation(relation);

    let items = match op {
        Mutation::Attach => controller.prepare_attach_items(items, &owner, &accessor),
        Mutation::Detach => controller.prepare_detach_items(items, &owner, &accessor),
        Mutation::Sync => controller.prepare_sync_items(items, &owner, &accessor),
    };

    let outcome = apply(op, &owner, &accessor, &items, store).await;
    let label = if outcome.is_ok() { "ok" } else { "error" };
    metrics::increment_counter!("relation_operations_total", "op" => op.as_str(), "outcome" => label);

    match outcome {
        Ok(()) => Ok(StatusResponse::default()),
        Err(err) => {
            error!(
                error = %err,
                op = op.as_str(),
                model = %def.name,
                owner = owner.id,
                relation = %accessor,
                "relation operation failed"
            );
            if err.is_operational() {
                Err(AttachError::RelationFailed {
                    param_key: param_key.to_string(),
                })
            } else {
                Err(AttachError::Internal)
            }
        }
    }
}

async fn apply(
    op: Mutation,
    owner: &Model,
    accessor: &str,
    items: &[Value],
    store: Arc<dyn RelationStore>,
) -> Result<(), RelationError> {
    let keys = parse_keys(items)?;
    let rel = owner.belongs_to_many(accessor, store)?;
    match op {
        Mutation::Attach => {
            let changes = rel.sync_without_detaching(keys).await?;
            info!(owner = owner.id, relation = accessor, attached = changes.attached.len(), "items attached");
        }
        Mutation::Detach => {
            let removed = rel.detach(keys).await?;
            info!(owner = owner.id, relation = accessor, removed, "items detached");
        }
        Mutation::Sync => {
            // The response stays a bare status; the diff is only logged.
            let changes = rel.sync(keys).await?;
            info!(
                owner = owner.id,
                relation = accessor,
                added = ?changes.attached,
                removed = ?changes.detached,
                "items synced"
            );
        }
    }
    Ok(())
}

/// Attachable controller for one configured resource.
#[derive(Clone)]
pub struct ResourceController {
    model: Arc<ModelDef>,
    store: Arc<dyn RelationStore>,
    per_page: u64,
}

impl ResourceController {
    pub fn new(model: Arc<ModelDef>, store: Arc<dyn RelationStore>, per_page: u64) -> Self {
        Self {
            model,
            store,
            per_page,
        }
    }
}

#[async_trait]
impl Attachable for ResourceController {
    fn model(&self) -> Arc<ModelDef> {
        Arc::clone(&self.model)
    }

    fn store(&self) -> Arc<dyn RelationStore> {
        Arc::clone(&self.store)
    }

    fn per_page(&self) -> u64 {
        self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelsFile;
    use crate::features::models::memory::MemoryRelationStore;
    use crate::features::models::schema::ModelRegistry;
    use serde_json::json;

    const MODELS: &str = r#"
models:
  users:
    table: users
    relations:
      roles:
        kind: belongs_to_many
        related: roles
        pivot: role_user
        foreign_pivot_key: user_id
        related_pivot_key: role_id
      teamMembers:
        kind: belongs_to_many
        related: users
        pivot: team_user
        foreign_pivot_key: lead_id
        related_pivot_key: member_id
      posts:
        kind: has_many
        related: posts
        foreign_key: user_id
  roles:
    table: roles
  posts:
    table: posts
"#;

    // Roles A..E are ids 1..5.
    fn fixture() -> (ModelRegistry, Arc<MemoryRelationStore>) {
        let file = ModelsFile::parse(MODELS).unwrap();
        let registry = ModelRegistry::from_config(&file.models).unwrap();
        let store = Arc::new(MemoryRelationStore::new());
        for id in 1..=3 {
            store.seed_row("users", json!({"id": id}));
        }
        for (id, name) in [(1, "A"), (2, "B"), (3, "C"), (4, "D"), (5, "E")] {
            store.seed_row("roles", json!({"id": id, "name": name}));
        }
        (registry, store)
    }

    fn controller() -> (ResourceController, Arc<MemoryRelationStore>) {
        let (registry, store) = fixture();
        let users = registry.get("users").unwrap();
        (ResourceController::new(users, store.clone(), 15), store)
    }

    async fn members(ctl: &ResourceController, owner: &str) -> Vec<String> {
        let page = ctl.attached(owner, "roles", 1).await.unwrap();
        page.items
            .iter()
            .map(|row| row["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn attach_detach_sync_scenario() {
        let (ctl, _) = controller();
        ctl.attach("1", "roles", &json!({"roles": [1, 2]}), None).await.unwrap();
        assert_eq!(members(&ctl, "1").await, ["A", "B"]);

        let resp = ctl.attach("1", "roles", &json!({"roles": [3]}), None).await.unwrap();
        assert_eq!(resp, StatusResponse::default());
        assert_eq!(members(&ctl, "1").await, ["A", "B", "C"]);

        ctl.detach("1", "roles", &json!({"roles": [1]}), None).await.unwrap();
        assert_eq!(members(&ctl, "1").await, ["B", "C"]);

        ctl.sync("1", "roles", &json!({"roles": [3, 4]}), None).await.unwrap();
        assert_eq!(members(&ctl, "1").await, ["C", "D"]);
    }

    #[tokio::test]
    async fn repeat_attach_lists_each_item_once() {
        let (ctl, _) = controller();
        for _ in 0..3 {
            ctl.attach("1", "roles", &json!({"roles": [2, 2, "5"]}), None).await.unwrap();
        }
        assert_eq!(members(&ctl, "1").await, ["B", "E"]);
    }

    #[tokio::test]
    async fn detaching_a_non_member_is_a_no_op() {
        let (ctl, _) = controller();
        ctl.attach("1", "roles", &json!({"roles": [1]}), None).await.unwrap();
        ctl.detach("1", "roles", &json!({"roles": [4]}), None).await.unwrap();
        assert_eq!(members(&ctl, "1").await, ["A"]);
    }

    #[tokio::test]
    async fn hyphenated_relation_resolves_to_camel_case_accessor() {
        let (ctl, store) = controller();
        ctl.attach("1", "team-members", &json!({"team-members": [2, 3]}), None)
            .await
            .unwrap();
        let pivot = match ctl.model().relation("teamMembers").unwrap() {
            crate::features::models::schema::Relation::BelongsToMany { pivot, .. } => pivot.clone(),
            other => panic!("unexpected relation {other:?}"),
        };
        assert_eq!(store.related_keys(&pivot, 1).await.unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn param_key_overrides_body_key() {
        let (ctl, _) = controller();
        let err = ctl
            .attach("1", "roles", &json!({"roles": [1]}), Some("role_ids"))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachError::Validation { ref errors, .. } if errors.contains_key("role_ids")));

        ctl.attach("1", "roles", &json!({"role_ids": [1]}), Some("role_ids"))
            .await
            .unwrap();
        assert_eq!(members(&ctl, "1").await, ["A"]);
    }

    #[tokio::test]
    async fn missing_owner_is_not_found_for_every_operation() {
        let (ctl, _) = controller();
        let body = json!({"roles": [1]});
        assert!(matches!(ctl.attached("42", "roles", 1).await, Err(AttachError::NotFound)));
        assert!(matches!(ctl.attach("42", "roles", &body, None).await, Err(AttachError::NotFound)));
        assert!(matches!(ctl.detach("42", "roles", &body, None).await, Err(AttachError::NotFound)));
        assert!(matches!(ctl.sync("42", "roles", &body, None).await, Err(AttachError::NotFound)));
    }

    #[tokio::test]
    async fn validation_runs_before_owner_lookup() {
        let (ctl, _) = controller();
        for body in [json!({}), json!({"roles": "not-an-array-or-missing"})] {
            for result in [
                ctl.attach("42", "roles", &body, None).await,
                ctl.detach("1", "roles", &body, None).await,
                ctl.sync("1", "roles", &body, None).await,
            ] {
                assert!(matches!(result, Err(AttachError::Validation { .. })));
            }
        }
    }

    #[tokio::test]
    async fn unknown_items_fail_with_hint() {
        let (ctl, _) = controller();
        let err = ctl
            .attach("1", "roles", &json!({"roles": [1, 99]}), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Something went wrong. Are you sure the roles exists?");
        assert!(members(&ctl, "1").await.is_empty());

        let err = ctl
            .sync("1", "roles", &json!({"roles": ["abc"]}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachError::RelationFailed { .. }));
    }

    #[tokio::test]
    async fn non_many_to_many_accessor_fails_with_hint() {
        let (ctl, _) = controller();
        let err = ctl
            .attach("1", "posts", &json!({"posts": [1]}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachError::RelationFailed { ref param_key } if param_key == "posts"));

        let err = ctl.attach("1", "groups", &json!({"groups": [1]}), None).await.unwrap_err();
        assert!(matches!(err, AttachError::RelationFailed { .. }));
    }

    #[tokio::test]
    async fn listing_an_unknown_relation_is_not_found() {
        let (ctl, _) = controller();
        assert!(matches!(ctl.attached("1", "groups", 1).await, Err(AttachError::NotFound)));
    }

    #[tokio::test]
    async fn listing_a_has_many_relation_returns_children() {
        let (ctl, store) = controller();
        store.seed_row("posts", json!({"id": 7, "user_id": 1, "title": "hello"}));
        store.seed_row("posts", json!({"id": 8, "user_id": 2, "title": "other"}));

        let page = ctl.attached("1", "posts", 1).await.unwrap();
        assert_eq!(page.items, vec![json!({"id": 7, "user_id": 1, "title": "hello"})]);
        assert!(!page.has_more);
        assert!(ctl.attached("3", "posts", 1).await.unwrap().items.is_empty());
    }

    struct EvenOnly {
        inner: ResourceController,
    }

    #[async_trait]
    impl Attachable for EvenOnly {
        fn model(&self) -> Arc<ModelDef> {
            self.inner.model()
        }

        fn store(&self) -> Arc<dyn RelationStore> {
            self.inner.store()
        }

        fn prepare_sync_items(&self, items: Vec<Value>, owner: &Model, relation: &str) -> Vec<Value> {
            assert_eq!(owner.id, 1);
            assert_eq!(relation, "roles");
            items
                .into_iter()
                .filter(|item| item.as_i64().is_some_and(|id| id % 2 == 0))
                .collect()
        }
    }

    #[tokio::test]
    async fn prepare_hook_filters_items() {
        let (inner, _) = controller();
        let ctl = EvenOnly { inner: inner.clone() };
        ctl.sync("1", "roles", &json!({"roles": [1, 2, 3, 4]}), None)
            .await
            .unwrap();
        assert_eq!(members(&inner, "1").await, ["B", "D"]);
    }
}
