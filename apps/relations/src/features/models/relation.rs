use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use super::repo::{ChildSpec, PivotSpec, RelationStore, StoreError};

#[derive(Debug, Error)]
pub enum RelationError {
    #[error("call to undefined relationship '{relation}' on model '{model}'")]
    Undefined { model: String, relation: String },
    #[error("relationship '{relation}' on model '{model}' is {kind}, not many-to-many")]
    Unsupported {
        model: String,
        relation: String,
        kind: &'static str,
    },
    #[error("'{0}' is not a valid related key")]
    InvalidKey(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RelationError {
    /// True when the request itself is at fault (unknown relation, bad or
    /// dangling ids). Callers answer those with a hint instead of a bare 500.
    pub fn is_operational(&self) -> bool {
        match self {
            RelationError::Store(err) => err.is_constraint(),
            _ => true,
        }
    }
}

/// Outcome of a sync, as ids added to and removed from the relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncChanges {
    pub attached: Vec<i64>,
    pub detached: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimplePage {
    pub items: Vec<Value>,
    pub current_page: u64,
    pub per_page: u64,
    pub has_more: bool,
}

/// Accepts integers and integer strings; anything else fails the whole set.
pub fn parse_keys(items: &[Value]) -> Result<Vec<i64>, RelationError> {
    items
        .iter()
        .map(|item| {
            let key = match item {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            key.ok_or_else(|| RelationError::InvalidKey(item.to_string()))
        })
        .collect()
}

/// Clamps the page request and reads one row past it; the extra row only
/// tells whether a next page exists.
async fn fetch_page<F, Fut>(page: u64, per_page: u64, fetch: F) -> Result<SimplePage, RelationError>
where
    F: FnOnce(u64, u64) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<Value>, StoreError>>,
{
    let page = page.max(1);
    let per_page = per_page.max(1);
    let offset = (page - 1).saturating_mul(per_page);
    let mut items = fetch(offset, per_page + 1).await?;
    let has_more = items.len() as u64 > per_page;
    items.truncate(per_page as usize);
    Ok(SimplePage {
        items,
        current_page: page,
        per_page,
        has_more,
    })
}

fn dedup(keys: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|key| seen.insert(*key)).collect()
}

/// Handle on one owner's many-to-many membership.
pub struct BelongsToMany {
    pivot: PivotSpec,
    owner: i64,
    store: Arc<dyn RelationStore>,
}

impl BelongsToMany {
    pub fn new(pivot: PivotSpec, owner: i64, store: Arc<dyn RelationStore>) -> Self {
        Self {
            pivot,
            owner,
            store,
        }
    }

    pub async fn keys(&self) -> Result<Vec<i64>, RelationError> {
        Ok(self.store.related_keys(&self.pivot, self.owner).await?)
    }

    /// Adds `keys` and leaves existing members alone.
    pub async fn sync_without_detaching(
        &self,
        keys: Vec<i64>,
    ) -> Result<SyncChanges, RelationError> {
        self.sync_with(keys, false).await
    }

    /// Makes membership exactly `keys`.
    pub async fn sync(&self, keys: Vec<i64>) -> Result<SyncChanges, RelationError> {
        self.sync_with(keys, true).await
    }

    async fn sync_with(&self, keys: Vec<i64>, detaching: bool) -> Result<SyncChanges, RelationError> {
        let current: HashSet<i64> = self.keys().await?.into_iter().collect();
        let desired = dedup(keys);
        let wanted: HashSet<i64> = desired.iter().copied().collect();

        // Inserting first means a dangling id fails before anything is removed.
        let fresh: Vec<i64> = desired
            .into_iter()
            .filter(|key| !current.contains(key))
            .collect();
        if !fresh.is_empty() {
            self.store
                .insert_pivot(&self.pivot, self.owner, &fresh)
                .await?;
        }

        let mut changes = SyncChanges {
            attached: fresh,
            detached: Vec::new(),
        };
        if detaching {
            let mut stale: Vec<i64> = current.difference(&wanted).copied().collect();
            stale.sort_unstable();
            if !stale.is_empty() {
                self.store
                    .delete_pivot(&self.pivot, self.owner, &stale)
                    .await?;
            }
            changes.detached = stale;
        }
        Ok(changes)
    }

    /// Removes `keys`; keys that are not members are ignored. Returns the
    /// number of membership rows removed.
    pub async fn detach(&self, keys: Vec<i64>) -> Result<u64, RelationError> {
        let keys = dedup(keys);
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self
            .store
            .delete_pivot(&self.pivot, self.owner, &keys)
            .await?)
    }

    /// Fetches one page without counting the total.
    pub async fn simple_paginate(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<SimplePage, RelationError> {
        fetch_page(page, per_page, |offset, limit| {
            self.store.related_page(&self.pivot, self.owner, offset, limit)
        })
        .await
    }
}

/// Handle on one owner's children in a one-to-many relation. Read only.
pub struct HasMany {
    child: ChildSpec,
    owner: i64,
    store: Arc<dyn RelationStore>,
}

impl HasMany {
    pub fn new(child: ChildSpec, owner: i64, store: Arc<dyn RelationStore>) -> Self {
        Self {
            child,
            owner,
            store,
        }
    }

    pub async fn simple_paginate(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<SimplePage, RelationError> {
        fetch_page(page, per_page, |offset, limit| {
            self.store.child_page(&self.child, self.owner, offset, limit)
        })
        .await
    }
}
