use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::relation::{BelongsToMany, HasMany, RelationError, SimplePage};
use super::repo::{ChildSpec, PivotSpec, RelationStore, StoreError};
use crate::config::{ModelConfig, RelationConfig};
use crate::core::naming::{camel_case, is_sql_identifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    BelongsToMany { related: String, pivot: PivotSpec },
    HasMany { related: String, children: ChildSpec },
}

impl Relation {
    pub fn kind(&self) -> &'static str {
        match self {
            Relation::BelongsToMany { .. } => "belongs_to_many",
            Relation::HasMany { .. } => "has_many",
        }
    }

    pub fn related(&self) -> &str {
        match self {
            Relation::BelongsToMany { related, .. } | Relation::HasMany { related, .. } => related,
        }
    }
}

/// A model type: its table and the explicit table of relation accessors it
/// exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDef {
    pub name: String,
    pub table: String,
    pub key: String,
    pub relations: BTreeMap<String, Relation>,
}

impl ModelDef {
    pub fn has_relation(&self, accessor: &str) -> bool {
        self.relations.contains_key(accessor)
    }

    /// A literal accessor wins; otherwise `foo-bar` / `foo_bar` become
    /// `fooBar`. The result is not checked to exist.
    pub fn resolve_relation(&self, relation: &str) -> String {
        if self.has_relation(relation) {
            relation.to_string()
        } else {
            camel_case(&relation.replace('-', "_"))
        }
    }

    pub fn relation(&self, accessor: &str) -> Result<&Relation, RelationError> {
        self.relations
            .get(accessor)
            .ok_or_else(|| RelationError::Undefined {
                model: self.name.clone(),
                relation: accessor.to_string(),
            })
    }
}

/// A located owner record.
#[derive(Debug, Clone)]
pub struct Model {
    pub def: Arc<ModelDef>,
    pub id: i64,
}

impl Model {
    /// Looks a record up by its path id. Ids that are not integers can never
    /// match a row and are reported as absent.
    pub async fn find(
        def: &Arc<ModelDef>,
        store: &dyn RelationStore,
        id: &str,
    ) -> Result<Option<Model>, StoreError> {
        let Ok(id) = id.trim().parse::<i64>() else {
            return Ok(None);
        };
        let row = store.find(&def.table, &def.key, id).await?;
        Ok(row.map(|_| Model {
            def: Arc::clone(def),
            id,
        }))
    }

    /// Returns the many-to-many handle for `accessor`. Accessors that exist
    /// but are not many-to-many are rejected here.
    pub fn belongs_to_many(
        &self,
        accessor: &str,
        store: Arc<dyn RelationStore>,
    ) -> Result<BelongsToMany, RelationError> {
        match self.def.relation(accessor)? {
            Relation::BelongsToMany { pivot, .. } => {
                Ok(BelongsToMany::new(pivot.clone(), self.id, store))
            }
            other => Err(RelationError::Unsupported {
                model: self.def.name.clone(),
                relation: accessor.to_string(),
                kind: other.kind(),
            }),
        }
    }

    /// One page of whatever `accessor` relates this record to.
    pub async fn simple_paginate(
        &self,
        accessor: &str,
        store: Arc<dyn RelationStore>,
        page: u64,
        per_page: u64,
    ) -> Result<SimplePage, RelationError> {
        match self.def.relation(accessor)? {
            Relation::BelongsToMany { pivot, .. } => {
                BelongsToMany::new(pivot.clone(), self.id, store)
                    .simple_paginate(page, per_page)
                    .await
            }
            Relation::HasMany { children, .. } => {
                HasMany::new(children.clone(), self.id, store)
                    .simple_paginate(page, per_page)
                    .await
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("model '{model}' relation '{relation}' refers to unknown model '{related}'")]
    UnknownRelated {
        model: String,
        relation: String,
        related: String,
    },
    #[error("model '{model}' uses invalid identifier '{ident}'")]
    InvalidIdentifier { model: String, ident: String },
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<ModelDef>>,
}

impl ModelRegistry {
    pub fn from_config(config: &BTreeMap<String, ModelConfig>) -> Result<Self, SchemaError> {
        let mut models = BTreeMap::new();
        for (name, model) in config {
            check_ident(name, &model.table)?;
            check_ident(name, &model.key)?;

            let mut relations = BTreeMap::new();
            for (accessor, relation) in &model.relations {
                let related = relation.related();
                let target = config.get(related).ok_or_else(|| SchemaError::UnknownRelated {
                    model: name.clone(),
                    relation: accessor.clone(),
                    related: related.to_string(),
                })?;
                let resolved = match relation {
                    RelationConfig::BelongsToMany {
                        related,
                        pivot,
                        foreign_pivot_key,
                        related_pivot_key,
                    } => {
                        for ident in [pivot, foreign_pivot_key, related_pivot_key] {
                            check_ident(name, ident)?;
                        }
                        Relation::BelongsToMany {
                            related: related.clone(),
                            pivot: PivotSpec {
                                table: pivot.clone(),
                                foreign_pivot_key: foreign_pivot_key.clone(),
                                related_pivot_key: related_pivot_key.clone(),
                                related_table: target.table.clone(),
                                related_key: target.key.clone(),
                            },
                        }
                    }
                    RelationConfig::HasMany {
                        related,
                        foreign_key,
                    } => {
                        check_ident(name, foreign_key)?;
                        Relation::HasMany {
                            related: related.clone(),
                            children: ChildSpec {
                                table: target.table.clone(),
                                foreign_key: foreign_key.clone(),
                                key: target.key.clone(),
                            },
                        }
                    }
                };
                relations.insert(accessor.clone(), resolved);
            }

            models.insert(
                name.clone(),
                Arc::new(ModelDef {
                    name: name.clone(),
                    table: model.table.clone(),
                    key: model.key.clone(),
                    relations,
                }),
            );
        }
        Ok(Self { models })
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.models.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelDef>> {
        self.models.values()
    }
}

fn check_ident(model: &str, ident: &str) -> Result<(), SchemaError> {
    if is_sql_identifier(ident) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier {
            model: model.to_string(),
            ident: ident.to_string(),
        })
    }
}
